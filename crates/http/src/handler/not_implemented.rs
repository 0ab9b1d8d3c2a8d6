//! The built-in fallback handler for unmatched routes.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Response, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::exchange::Exchange;
use crate::handler::{BodyConsumer, ExchangeHandler};
use crate::protocol::{BoxError, ExchangeError, RequestHead, body};

/// Answers every request with `501 Not Implemented` and a plain-text body.
///
/// This is the handler the registry resolves to when no registered pattern
/// matches and no universal handler exists. It discards the request body
/// without buffering it and never fails.
#[derive(Debug, Default)]
pub struct NotImplementedHandler;

#[async_trait]
impl ExchangeHandler for NotImplementedHandler {
    type Value = ();
    type Consumer = DiscardingConsumer;

    fn begin(&self, _head: &RequestHead) -> Self::Consumer {
        DiscardingConsumer::new()
    }

    async fn handle(&self, _value: (), exchange: &mut Exchange) -> Result<Option<CancellationToken>, BoxError> {
        let head = Response::builder()
            .status(StatusCode::NOT_IMPLEMENTED)
            .header(CONTENT_TYPE, mime::TEXT_PLAIN.as_ref())
            .body(())
            .unwrap();
        *exchange.response_mut() = head;
        exchange.submit(body::full(Bytes::from_static(b"Service not implemented")))?;
        Ok(None)
    }
}

/// A body consumer that drops every chunk: memory stays bounded no matter how
/// large the request body is.
#[derive(Debug, Default)]
pub struct DiscardingConsumer;

impl DiscardingConsumer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BodyConsumer for DiscardingConsumer {
    type Value = ();

    async fn consume(&mut self, _chunk: Bytes) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), ExchangeError> {
        Ok(())
    }
}
