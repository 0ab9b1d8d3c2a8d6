//! The exchange handler contract.
//!
//! A handler is invoked in two strict phases with an explicit handoff:
//!
//! 1. [`ExchangeHandler::begin`] receives the request head (no body yet) and
//!    returns a [`BodyConsumer`] that will see the body chunk by chunk.
//! 2. Once end-of-body is observed, the consumer's materialized value is fed
//!    to [`ExchangeHandler::handle`], which shapes the response on the
//!    [`Exchange`] and submits the body producer.
//!
//! The split decouples request-body consumption from response production:
//! the runner streams chunks into the consumer as they arrive, so a large
//! body never has to be buffered to dispatch a request.
//!
//! Handlers are generic over their materialized `Value`; the registry stores
//! them behind the object-safe [`ErasedExchangeHandler`] adapter.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::Response;
use http_body::Body;
use tokio_util::sync::CancellationToken;

use crate::exchange::Exchange;
use crate::protocol::{BoxError, ExchangeError, RequestHead};

mod not_implemented;
pub use not_implemented::{DiscardingConsumer, NotImplementedHandler};

mod registry;
pub use registry::HandlerRegistry;

/// Receives a request body chunk by chunk and materializes a request value.
///
/// Consumers must work incrementally: each `consume` call hands over one
/// chunk, and a consumer is free to process and drop it (it is never required
/// to hold the whole body).
#[async_trait]
pub trait BodyConsumer: Send {
    /// The materialized request value handed to the `handle` phase.
    type Value: Send + 'static;

    /// Feeds one body chunk to the consumer.
    async fn consume(&mut self, chunk: Bytes) -> Result<(), ExchangeError>;

    /// Called once at end-of-body; yields the materialized request value.
    async fn finish(&mut self) -> Result<Self::Value, ExchangeError>;
}

/// The polymorphic unit of work a registry entry invokes.
#[async_trait]
pub trait ExchangeHandler: Send + Sync + 'static {
    /// The materialized request value produced by the consumer.
    type Value: Send + 'static;
    /// The body consumer returned by `begin`.
    type Consumer: BodyConsumer<Value = Self::Value> + 'static;

    /// Starts an exchange: given the request metadata, returns the consumer
    /// that will receive the body.
    fn begin(&self, head: &RequestHead) -> Self::Consumer;

    /// Produces the response for the materialized request value.
    ///
    /// Must call [`Exchange::submit`] exactly once. May return a cancellation
    /// token; the runner cancels it exactly once if the exchange is aborted
    /// before the response is fully written (a no-op afterwards).
    async fn handle(&self, value: Self::Value, exchange: &mut Exchange) -> Result<Option<CancellationToken>, BoxError>;
}

/// Object-safe form of [`ExchangeHandler`], as stored by the registry.
pub trait ErasedExchangeHandler: Send + Sync {
    /// Starts an exchange, returning the driver that will consume the body
    /// and then run the handler's `handle` phase.
    fn begin(&self, head: &RequestHead) -> Box<dyn ErasedExchange>;
}

/// Driver for one in-flight exchange of an erased handler: the consume phase
/// followed by the handoff into `handle`.
#[async_trait]
pub trait ErasedExchange: Send {
    /// Feeds one body chunk to the underlying consumer.
    async fn consume(&mut self, chunk: Bytes) -> Result<(), ExchangeError>;

    /// Signals end-of-body: materializes the request value and runs the
    /// handler's `handle` phase against the exchange.
    async fn finish(&mut self, exchange: &mut Exchange) -> Result<Option<CancellationToken>, ExchangeError>;
}

/// Erases a typed handler for storage in the registry.
pub(crate) fn erase<H: ExchangeHandler>(handler: H) -> Arc<dyn ErasedExchangeHandler> {
    Arc::new(ErasedEntry { handler: Arc::new(handler) })
}

struct ErasedEntry<H> {
    handler: Arc<H>,
}

impl<H: ExchangeHandler> ErasedExchangeHandler for ErasedEntry<H> {
    fn begin(&self, head: &RequestHead) -> Box<dyn ErasedExchange> {
        let consumer = self.handler.begin(head);
        Box::new(RunningExchange { handler: Arc::clone(&self.handler), consumer })
    }
}

struct RunningExchange<H: ExchangeHandler> {
    handler: Arc<H>,
    consumer: H::Consumer,
}

#[async_trait]
impl<H: ExchangeHandler> ErasedExchange for RunningExchange<H> {
    async fn consume(&mut self, chunk: Bytes) -> Result<(), ExchangeError> {
        self.consumer.consume(chunk).await
    }

    async fn finish(&mut self, exchange: &mut Exchange) -> Result<Option<CancellationToken>, ExchangeError> {
        let value = self.consumer.finish().await?;
        self.handler.handle(value, exchange).await.map_err(|e| match e.downcast::<ExchangeError>() {
            Ok(exchange_error) => *exchange_error,
            Err(other) => ExchangeError::handler_failure(other),
        })
    }
}

/// Adapts an async function over the aggregated request entity into an
/// [`ExchangeHandler`].
///
/// The consumer buffers the body into `Bytes`; the function receives the
/// request head and the entity and returns a full response, which is copied
/// onto the exchange and submitted. Handlers that need true streaming
/// consumption implement [`ExchangeHandler`] directly.
pub fn entity_handler<F, Fut, B>(f: F) -> EntityHandler<F>
where
    F: Fn(RequestHead, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<B>, BoxError>> + Send,
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    EntityHandler { f }
}

/// See [`entity_handler`].
pub struct EntityHandler<F> {
    f: F,
}

impl<F> std::fmt::Debug for EntityHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut, B> ExchangeHandler for EntityHandler<F>
where
    F: Fn(RequestHead, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<B>, BoxError>> + Send,
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    type Value = (RequestHead, Bytes);
    type Consumer = EntityConsumer;

    fn begin(&self, head: &RequestHead) -> Self::Consumer {
        EntityConsumer { head: Some(head.clone()), buffer: BytesMut::new() }
    }

    async fn handle(&self, value: Self::Value, exchange: &mut Exchange) -> Result<Option<CancellationToken>, BoxError> {
        let (head, entity) = value;
        let response = (self.f)(head, entity).await?;
        let (parts, body) = response.into_parts();
        *exchange.response_mut() = Response::from_parts(parts, ());
        exchange.submit(body)?;
        Ok(None)
    }
}

/// Aggregating consumer used by [`EntityHandler`].
#[derive(Debug)]
pub struct EntityConsumer {
    head: Option<RequestHead>,
    buffer: BytesMut,
}

#[async_trait]
impl BodyConsumer for EntityConsumer {
    type Value = (RequestHead, Bytes);

    async fn consume(&mut self, chunk: Bytes) -> Result<(), ExchangeError> {
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> Result<Self::Value, ExchangeError> {
        let head = self.head.take().ok_or_else(|| ExchangeError::handler_failure("entity consumer finished twice"))?;
        Ok((head, std::mem::take(&mut self.buffer).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use http_body_util::{BodyExt, Full};

    async fn run(handler: &dyn ErasedExchangeHandler, head: RequestHead, chunks: &[&'static [u8]]) -> (Exchange, Option<CancellationToken>) {
        let mut driver = handler.begin(&head);
        for chunk in chunks {
            driver.consume(Bytes::from_static(chunk)).await.unwrap();
        }
        let mut exchange = Exchange::new();
        let token = driver.finish(&mut exchange).await.unwrap();
        (exchange, token)
    }

    fn head(path: &str) -> RequestHead {
        http::Request::builder().uri(path).body(()).unwrap().into()
    }

    #[tokio::test]
    async fn entity_handler_aggregates_chunks() {
        let handler = erase(entity_handler(|head, entity| async move {
            assert_eq!(head.path(), "/echo");
            Ok(Response::builder().status(StatusCode::OK).body(Full::new(entity))?)
        }));

        let (exchange, token) = run(handler.as_ref(), head("/echo"), &[b"some ", b"stuff"]).await;
        assert!(token.is_none());
        assert_eq!(exchange.response().status(), StatusCode::OK);

        let (_head, body) = exchange.into_parts();
        let collected = body.expect("body submitted").collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"some stuff"));
    }

    #[tokio::test]
    async fn double_submit_surfaces_as_protocol_violation() {
        struct DoubleSubmitHandler;

        #[async_trait]
        impl ExchangeHandler for DoubleSubmitHandler {
            type Value = ();
            type Consumer = DiscardingConsumer;

            fn begin(&self, _head: &RequestHead) -> Self::Consumer {
                DiscardingConsumer::new()
            }

            async fn handle(&self, _value: (), exchange: &mut Exchange) -> Result<Option<CancellationToken>, BoxError> {
                exchange.submit(crate::protocol::body::full("one"))?;
                exchange.submit(crate::protocol::body::full("two"))?;
                Ok(None)
            }
        }

        let handler = erase(DoubleSubmitHandler);
        let mut driver = handler.begin(&head("/"));
        let mut exchange = Exchange::new();
        let err = driver.finish(&mut exchange).await.expect_err("double submit must fail");
        assert!(matches!(err, ExchangeError::DoubleSubmit));
    }
}
