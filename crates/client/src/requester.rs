//! The pooled requester facade.
//!
//! [`Requester`] ties the pool, the connector and the exchange protocol
//! together: `execute` leases a connection, drives one full request/response
//! exchange over it, and returns the connection to the pool afterwards.
//! Persistence follows the keep-alive classification of both the request and
//! the response, so a `Connection: close` on either side retires the
//! connection instead of parking it.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use courier_http::protocol::{BoxError, ExchangeError, PayloadItem, PayloadSize, RequestHead, wants_keep_alive};
use courier_http::transport::ClientTransport;
use http::{Request, Response};
use http_body::Body;
use http_body_util::BodyExt;
use tracing::{debug, warn};

use crate::connector::Connector;
use crate::error::ClientError;
use crate::pool::{ConnectionId, ConnectionPool, IdlePolicy, PoolConfig, PoolStats};
use crate::route::Destination;

pub struct RequesterBuilder<C> {
    connector: C,
    config: PoolConfig,
    so_timeout: Duration,
}

impl<C> fmt::Debug for RequesterBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequesterBuilder")
            .field("config", &self.config)
            .field("so_timeout", &self.so_timeout)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> RequesterBuilder<C> {
    fn new(connector: C) -> Self {
        Self { connector, config: PoolConfig::default(), so_timeout: Duration::from_secs(30) }
    }

    /// Caps connections across all destinations.
    pub fn max_total(mut self, max_total: usize) -> Self {
        self.config.max_total = max_total;
        self
    }

    /// Caps connections per destination.
    pub fn max_per_route(mut self, max_per_route: usize) -> Self {
        self.config.max_per_route = max_per_route;
        self
    }

    pub fn idle_policy(mut self, idle_policy: IdlePolicy) -> Self {
        self.config.idle_policy = idle_policy;
        self
    }

    /// Bounds how long each read of response data may take.
    pub fn so_timeout(mut self, so_timeout: Duration) -> Self {
        self.so_timeout = so_timeout;
        self
    }

    pub fn build(self) -> Requester<C> {
        Requester { pool: ConnectionPool::new(self.config), connector: self.connector, so_timeout: self.so_timeout }
    }
}

/// Executes exchanges against remote destinations over pooled connections.
///
/// The requester is `Send + Sync` and meant to be shared: concurrent
/// `execute` calls simply lease different connections, blocking when the
/// pool's caps are hit.
pub struct Requester<C: Connector> {
    pool: ConnectionPool<C::Transport>,
    connector: C,
    so_timeout: Duration,
}

impl<C: Connector> Requester<C> {
    pub fn builder(connector: C) -> RequesterBuilder<C> {
        RequesterBuilder::new(connector)
    }

    /// A requester with default pool limits and a 30 second socket timeout.
    pub fn new(connector: C) -> Self {
        Self::builder(connector).build()
    }

    /// Executes one exchange: leases a connection (waiting up to `timeout`
    /// when the pool is saturated), sends the request, and aggregates the
    /// response body.
    ///
    /// The returned response carries the [`ConnectionId`] of the connection
    /// it travelled over in its extensions. On success the connection goes
    /// back to the pool, parked for reuse when both sides signalled
    /// keep-alive; on any exchange failure it is discarded, so an error never
    /// leaves a half-read connection in the idle queue.
    pub async fn execute<B>(
        &self,
        destination: &Destination,
        request: Request<B>,
        timeout: Duration,
    ) -> Result<Response<Bytes>, ClientError>
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: Into<BoxError>,
    {
        let mut connection = self.pool.lease(destination, timeout, &self.connector).await?;
        debug!(%destination, connection = %connection.id(), reused = connection.is_reused(), "leased connection");

        match self.drive(connection.transport_mut(), request).await {
            Ok((mut response, persistent)) => {
                response.extensions_mut().insert(connection.id());
                debug!(connection = %connection.id(), persistent, "exchange complete");
                self.pool.release(connection, persistent);
                Ok(response)
            }
            Err(e) => {
                warn!(cause = %e, connection = %connection.id(), "exchange failed, discarding connection");
                self.pool.release(connection, false);
                Err(e)
            }
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn route_stats(&self, destination: &Destination) -> PoolStats {
        self.pool.route_stats(destination)
    }

    /// Sends the request and reads the full response, reporting whether the
    /// connection may be reused afterwards.
    async fn drive<B>(
        &self,
        transport: &mut C::Transport,
        request: Request<B>,
    ) -> Result<(Response<Bytes>, bool), ClientError>
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: Into<BoxError>,
    {
        let request_persistent = wants_keep_alive(request.version(), request.headers());
        let (parts, mut body) = request.into_parts();

        transport.write_head(RequestHead::from(parts), PayloadSize::from(body.size_hint())).await?;
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| ClientError::from(ExchangeError::handler_failure(e)))?;
            if let Ok(chunk) = frame.into_data() {
                transport.write_payload(PayloadItem::Chunk(chunk)).await?;
            }
        }
        transport.write_payload(PayloadItem::Eof).await?;
        transport.flush().await?;

        let head = match self.timed(transport.read_head()).await? {
            Some(head) => head,
            None => return Err(ClientError::Disconnected),
        };

        let mut entity = BytesMut::new();
        loop {
            match self.timed(transport.read_payload()).await? {
                PayloadItem::Chunk(chunk) => entity.extend_from_slice(&chunk),
                PayloadItem::Eof => break,
            }
        }

        let persistent = request_persistent && wants_keep_alive(head.version(), head.headers());
        let (parts, ()) = head.into_parts();
        Ok((Response::from_parts(parts, entity.freeze()), persistent))
    }

    async fn timed<F, O>(&self, operation: F) -> Result<O, ClientError>
    where
        F: Future<Output = Result<O, ExchangeError>>,
    {
        match tokio::time::timeout(self.so_timeout, operation).await {
            Ok(result) => result.map_err(ClientError::from),
            Err(_) => Err(ClientError::Timeout { elapsed: self.so_timeout }),
        }
    }
}

impl<C: Connector> fmt::Debug for Requester<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requester").field("pool", &self.pool).field("so_timeout", &self.so_timeout).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use courier_http::connection::HttpConnection;
    use courier_http::handler::{HandlerRegistry, entity_handler};
    use courier_http::protocol::ResponseHead;
    use courier_http::transport::local;
    use http::header::CONNECTION;
    use http::StatusCode;
    use http_body_util::Full;

    /// Connects by spawning an in-process exchange runner per connection.
    struct LocalConnector {
        registry: Arc<HandlerRegistry>,
        connects: Arc<AtomicUsize>,
    }

    impl LocalConnector {
        fn new(registry: Arc<HandlerRegistry>) -> (Self, Arc<AtomicUsize>) {
            let connects = Arc::new(AtomicUsize::new(0));
            (Self { registry, connects: Arc::clone(&connects) }, connects)
        }
    }

    #[async_trait]
    impl Connector for LocalConnector {
        type Transport = local::LocalClientTransport;

        async fn connect(&self, _destination: &Destination) -> io::Result<Self::Transport> {
            self.connects.fetch_add(1, Ordering::Relaxed);
            let (client, server) = local::pair();
            tokio::spawn(HttpConnection::new(server).process(Arc::clone(&self.registry)));
            Ok(client)
        }
    }

    fn echo_registry() -> Arc<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "*",
            entity_handler(|_head, entity| async move {
                Ok(Response::builder().status(StatusCode::OK).body(Full::new(entity))?)
            }),
        );
        registry.register(
            "/no-keep-alive*",
            entity_handler(|_head, entity| async move {
                Ok(Response::builder().status(StatusCode::OK).header(CONNECTION, "close").body(Full::new(entity))?)
            }),
        );
        Arc::new(registry)
    }

    fn post(uri: &str, entity: &'static [u8]) -> Request<Full<Bytes>> {
        Request::builder().method("POST").uri(uri).body(Full::new(Bytes::from_static(entity))).unwrap()
    }

    async fn exchange(
        requester: &Requester<LocalConnector>,
        destination: &Destination,
        uri: &str,
    ) -> (StatusCode, Bytes, ConnectionId) {
        let response = requester.execute(destination, post(uri, b"some stuff"), Duration::from_secs(5)).await.unwrap();
        let id = *response.extensions().get::<ConnectionId>().expect("connection id");
        let (parts, entity) = response.into_parts();
        (parts.status, entity, id)
    }

    #[tokio::test]
    async fn sequential_exchanges_reuse_one_connection() {
        let (connector, connects) = LocalConnector::new(echo_registry());
        let requester = Requester::builder(connector).max_total(2).max_per_route(2).build();
        let destination = Destination::http("localhost", 8080);

        let mut previous = None;
        for _ in 0..3 {
            let (status, entity, id) = exchange(&requester, &destination, "/stuff").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(entity, Bytes::from_static(b"some stuff"));
            if let Some(previous) = previous {
                assert_eq!(id, previous);
            }
            previous = Some(id);

            // the connection is back in the pool between exchanges
            assert_eq!(requester.pool_stats(), PoolStats { leased: 0, idle: 1 });
        }
        assert_eq!(connects.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn connection_close_response_retires_the_connection() {
        let (connector, connects) = LocalConnector::new(echo_registry());
        let requester = Requester::builder(connector).max_total(2).max_per_route(2).build();
        let destination = Destination::http("localhost", 8080);

        let (_, _, first) = exchange(&requester, &destination, "/stuff").await;

        // same pooled connection serves the close-marked route
        let (status, entity, second) = exchange(&requester, &destination, "/no-keep-alive/stuff").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(entity, Bytes::from_static(b"some stuff"));
        assert_eq!(second, first);
        assert_eq!(requester.pool_stats(), PoolStats { leased: 0, idle: 0 });

        // the next exchange needs a fresh connection
        let (_, _, third) = exchange(&requester, &destination, "/stuff").await;
        assert_ne!(third, first);
        assert_eq!(connects.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn unmatched_route_yields_the_fallback_response() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "/stuff*",
            entity_handler(|_head, entity| async move {
                Ok(Response::builder().status(StatusCode::OK).body(Full::new(entity))?)
            }),
        );
        let (connector, _) = LocalConnector::new(Arc::new(registry));
        let requester = Requester::new(connector);
        let destination = Destination::http("localhost", 8080);

        let (status, entity, _) = exchange(&requester, &destination, "/other").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(entity, Bytes::from_static(b"Service not implemented"));

        // the fallback response is still persistent
        assert_eq!(requester.pool_stats(), PoolStats { leased: 0, idle: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn slow_response_hits_the_socket_timeout() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "*",
            entity_handler(|_head, entity| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Response::builder().status(StatusCode::OK).body(Full::new(entity))?)
            }),
        );
        let (connector, _) = LocalConnector::new(Arc::new(registry));
        let requester = Requester::builder(connector).so_timeout(Duration::from_secs(1)).build();
        let destination = Destination::http("localhost", 8080);

        let result = requester.execute(&destination, post("/stuff", b"some stuff"), Duration::from_secs(5)).await;
        match result {
            Err(ClientError::Timeout { elapsed }) => assert_eq!(elapsed, Duration::from_secs(1)),
            other => panic!("expected Timeout, got {other:?}"),
        }

        // the timed-out connection is discarded, not parked
        assert_eq!(requester.pool_stats(), PoolStats { leased: 0, idle: 0 });
    }

    struct SilentTransport;

    #[async_trait]
    impl ClientTransport for SilentTransport {
        async fn write_head(&mut self, _head: RequestHead, _payload_size: PayloadSize) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn write_payload(&mut self, _item: PayloadItem) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn flush(&mut self) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn read_head(&mut self) -> Result<Option<ResponseHead>, ExchangeError> {
            Ok(None)
        }
        async fn read_payload(&mut self) -> Result<PayloadItem, ExchangeError> {
            Ok(PayloadItem::Eof)
        }
        async fn close(&mut self) -> Result<(), ExchangeError> {
            Ok(())
        }
    }

    struct SilentConnector;

    #[async_trait]
    impl Connector for SilentConnector {
        type Transport = SilentTransport;

        async fn connect(&self, _destination: &Destination) -> io::Result<SilentTransport> {
            Ok(SilentTransport)
        }
    }

    #[tokio::test]
    async fn close_before_response_reports_disconnected() {
        let requester = Requester::new(SilentConnector);
        let destination = Destination::http("localhost", 8080);

        let result = requester.execute(&destination, post("/stuff", b"some stuff"), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ClientError::Disconnected)));
        assert_eq!(requester.pool_stats(), PoolStats { leased: 0, idle: 0 });
    }
}
