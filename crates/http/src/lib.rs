//! An asynchronous HTTP message-exchange engine
//!
//! This crate implements the server half of an exchange engine on top of
//! tokio: incoming requests are matched to handlers through a pattern
//! registry, processed through an explicit consumer/producer split, and
//! answered over a pluggable transport. The byte-level wire codec is not part
//! of the engine: transports deliver parsed request/response envelopes (see
//! [`transport`]).
//!
//! # Features
//!
//! - URI pattern routing (`*`, `/exact`, `/prefix*`) with a built-in
//!   `501 Not Implemented` fallback for unmatched routes
//! - Two-phase exchange handlers: body consumption is decoupled from
//!   response production, so large bodies never block dispatch
//! - Streaming request and response bodies
//! - Keep-alive connections with per-exchange persistence classification
//! - Cooperative cancellation of aborted exchanges
//! - Clean error handling around the response commit point
//!
//! # Example
//!
//! Serving an echo handler over an in-process connection:
//!
//! ```
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use http::{Request, Response, StatusCode};
//! use http_body_util::Full;
//! use courier_http::connection::HttpConnection;
//! use courier_http::handler::{HandlerRegistry, entity_handler};
//! use courier_http::protocol::{PayloadItem, PayloadSize, RequestHead};
//! use courier_http::transport::{ClientTransport, local};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = HandlerRegistry::new();
//!     registry.register("*", entity_handler(|_head, entity| async move {
//!         Ok(Response::builder().status(StatusCode::OK).body(Full::new(entity))?)
//!     }));
//!
//!     let (mut client, server) = local::pair();
//!     tokio::spawn(HttpConnection::new(server).process(Arc::new(registry)));
//!
//!     let head: RequestHead = Request::builder().method("POST").uri("/stuff").body(()).unwrap().into();
//!     client.write_head(head, PayloadSize::Chunked).await.unwrap();
//!     client.write_payload(PayloadItem::Chunk(Bytes::from_static(b"some stuff"))).await.unwrap();
//!     client.write_payload(PayloadItem::Eof).await.unwrap();
//!
//!     let response = client.read_head().await.unwrap().expect("response head");
//!     assert_eq!(response.status(), StatusCode::OK);
//!     assert_eq!(client.read_payload().await.unwrap().into_bytes(), Some(Bytes::from_static(b"some stuff")));
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: envelope types, error taxonomy and keep-alive rules
//! - [`transport`]: the seam to byte-level codec/I/O collaborators
//! - [`handler`]: the exchange handler contract and the pattern registry
//! - [`exchange`]: the submit-once response state of one exchange
//! - [`connection`]: the exchange runner driving one connection
//! - [`server`]: the TCP accept loop
//!
//! Connection pooling and the requester facade live in the companion
//! `courier-client` crate.

pub mod connection;
pub mod exchange;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod transport;

mod utils;
