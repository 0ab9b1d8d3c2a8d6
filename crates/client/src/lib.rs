//! A pooled HTTP requester built on the `courier-http` exchange engine.
//!
//! This crate is the client half of the engine: a bounded keep-alive
//! connection pool keyed by [`Destination`], a [`Connector`] seam for
//! establishing transports, and the [`Requester`] facade that executes one
//! full request/response exchange per call.
//!
//! # Features
//!
//! - Per-route and total connection caps with timed waits when saturated
//! - Keep-alive reuse in most-recently-used order, with configurable
//!   staleness handling via [`IdlePolicy`]
//! - Capacity reserved before connecting, so slow dials never overshoot caps
//! - Connection identity surfaced through response extensions as
//!   [`ConnectionId`]
//!
//! # Example
//!
//! Executing requests against an in-process exchange runner:
//!
//! ```
//! use std::io;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use courier_client::{Connector, Destination, Requester};
//! use courier_http::connection::HttpConnection;
//! use courier_http::handler::{HandlerRegistry, entity_handler};
//! use courier_http::transport::local;
//! use http::{Request, Response, StatusCode};
//! use http_body_util::Full;
//!
//! struct LocalConnector(Arc<HandlerRegistry>);
//!
//! #[async_trait]
//! impl Connector for LocalConnector {
//!     type Transport = local::LocalClientTransport;
//!
//!     async fn connect(&self, _destination: &Destination) -> io::Result<Self::Transport> {
//!         let (client, server) = local::pair();
//!         tokio::spawn(HttpConnection::new(server).process(Arc::clone(&self.0)));
//!         Ok(client)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = HandlerRegistry::new();
//!     registry.register("*", entity_handler(|_head, entity| async move {
//!         Ok(Response::builder().status(StatusCode::OK).body(Full::new(entity))?)
//!     }));
//!
//!     let requester = Requester::new(LocalConnector(Arc::new(registry)));
//!     let destination = Destination::http("localhost", 8080);
//!
//!     let request = Request::builder()
//!         .method("POST")
//!         .uri("/stuff")
//!         .body(Full::new(Bytes::from_static(b"some stuff")))
//!         .unwrap();
//!     let response = requester.execute(&destination, request, Duration::from_secs(5)).await.unwrap();
//!     assert_eq!(response.status(), StatusCode::OK);
//!     assert_eq!(response.body(), &Bytes::from_static(b"some stuff"));
//! }
//! ```

mod connector;
mod error;
mod pool;
mod requester;
mod route;

pub use connector::Connector;
pub use error::ClientError;
pub use pool::{ConnectionId, ConnectionPool, IdlePolicy, PoolConfig, PoolStats, PooledConnection};
pub use requester::{Requester, RequesterBuilder};
pub use route::Destination;
