//! Per-connection exchange processing.
//!
//! [`HttpConnection`] owns one server-side transport and drives exchanges on
//! it to completion: read a request head, resolve the handler, stream the
//! body into the handler's consumer, hand off into the produce phase, and
//! stream the submitted response back out. The connection loops for as long
//! as both sides keep the connection persistent.
//!
//! Error policy follows the commit point: before the response head is
//! written, errors are converted into the closest error response (400 for
//! malformed input, 500 for handler and contract failures); afterwards no
//! recovery is possible and the connection is torn down.

use std::sync::Arc;
use std::time::Duration;

use http::Response;
use http_body::Body;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exchange::Exchange;
use crate::handler::HandlerRegistry;
use crate::protocol::{ExchangeError, PayloadItem, PayloadSize, RequestHead, ResponseBody, ResponseHead, wants_keep_alive};
use crate::transport::ServerTransport;

/// Drives all exchanges of one accepted connection.
#[derive(Debug)]
pub struct HttpConnection<T> {
    transport: T,
    read_timeout: Option<Duration>,
    force_close: bool,
}

impl<T> HttpConnection<T>
where
    T: ServerTransport,
{
    pub fn new(transport: T) -> Self {
        Self { transport, read_timeout: None, force_close: false }
    }

    /// Bounds the wait for the next request head on an idle persistent
    /// connection. Elapsing the timeout closes the connection cleanly.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    /// Forces every exchange non-persistent regardless of message headers.
    pub fn with_force_close(mut self, force_close: bool) -> Self {
        self.force_close = force_close;
        self
    }

    /// Processes exchanges until the peer closes, a fatal error occurs, or an
    /// exchange ends non-persistent.
    pub async fn process(mut self, registry: Arc<HandlerRegistry>) -> Result<(), ExchangeError> {
        loop {
            let head = match self.next_head().await {
                Ok(Some(head)) => head,
                Ok(None) => {
                    debug!("no more requests, closing connection");
                    break;
                }
                Err(e) => {
                    error!(cause = %e, "failed reading the next request head");
                    self.send_error_response(&e).await;
                    let _ = self.transport.close().await;
                    return Err(e);
                }
            };

            match self.run_exchange(registry.as_ref(), head).await {
                Ok(true) => {}
                Ok(false) => {
                    info!("exchange was not persistent, closing connection");
                    break;
                }
                Err(e) => {
                    let _ = self.transport.close().await;
                    return Err(e);
                }
            }
        }

        self.transport.close().await
    }

    async fn next_head(&mut self) -> Result<Option<RequestHead>, ExchangeError> {
        match self.read_timeout {
            Some(read_timeout) => match tokio::time::timeout(read_timeout, self.transport.read_head()).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    info!("idle connection timed out waiting for the next request");
                    Ok(None)
                }
            },
            None => self.transport.read_head().await,
        }
    }

    /// Runs one exchange. `Ok(persistent)` reports whether the connection may
    /// be reused; `Err` means the connection state is no longer trustworthy.
    async fn run_exchange(&mut self, registry: &HandlerRegistry, head: RequestHead) -> Result<bool, ExchangeError> {
        let request_persistent = head.is_persistent();
        let handler = registry.resolve(head.path());

        let mut exchange = Exchange::new();
        let mut driver = handler.begin(&head);

        // consume phase: stream the body into the consumer chunk by chunk;
        // on a consumer failure keep draining so the connection stays usable
        let mut consume_error = None;
        loop {
            let item = match self.transport.read_payload().await {
                Ok(item) => item,
                Err(e) => {
                    // framing is lost, answer if possible and give up on the connection
                    error!(cause = %e, "failed reading request payload");
                    self.send_error_response(&e).await;
                    return Err(e);
                }
            };
            match item {
                PayloadItem::Chunk(chunk) => {
                    if consume_error.is_none() {
                        if let Err(e) = driver.consume(chunk).await {
                            warn!(cause = %e, "body consumer failed, draining remaining payload");
                            consume_error = Some(e);
                        }
                    }
                }
                PayloadItem::Eof => break,
            }
        }

        // produce phase
        let produced = match consume_error {
            Some(e) => Err(e),
            None => driver.finish(&mut exchange).await,
        };

        match produced {
            Ok(canceller) if exchange.is_submitted() => {
                let (response, body) = exchange.into_parts();
                match self.send_response(response, body, request_persistent).await {
                    Ok(persistent) => Ok(persistent),
                    Err(e) => {
                        error!(cause = %e, "failed streaming the response, aborting exchange");
                        cancel_once(canceller);
                        Err(e)
                    }
                }
            }
            Ok(canceller) => {
                let e = ExchangeError::SubmitMissing;
                error!(cause = %e, "handler broke the submit contract");
                cancel_once(canceller);
                self.send_error_response(&e).await;
                Err(e)
            }
            Err(e) if e.is_protocol_violation() => {
                error!(cause = %e, "handler broke the submit contract");
                self.send_error_response(&e).await;
                Err(e)
            }
            Err(e) => {
                // recoverable: the body was fully drained and nothing has
                // been written yet, so answer and keep the connection
                warn!(cause = %e, status = %e.status_hint(), "exchange failed before commit, sending error response");
                self.send_error_response(&e).await;
                Ok(request_persistent && !self.force_close)
            }
        }
    }

    async fn send_response(&mut self, response: ResponseHead, body: Option<ResponseBody>, request_persistent: bool) -> Result<bool, ExchangeError> {
        let payload_size = match &body {
            Some(body) => PayloadSize::from(body.size_hint()),
            None => PayloadSize::Empty,
        };
        let response_persistent = wants_keep_alive(response.version(), response.headers());
        let persistent = request_persistent && response_persistent && !self.force_close;

        self.transport.write_head(response, payload_size).await?;

        if let Some(mut body) = body {
            while let Some(frame) = body.frame().await {
                match frame {
                    Ok(frame) => {
                        // trailers are not part of this engine's contract
                        if let Ok(chunk) = frame.into_data() {
                            self.transport.write_payload(PayloadItem::Chunk(chunk)).await?;
                        }
                    }
                    // the head is committed: a failing producer is fatal
                    Err(e) => return Err(ExchangeError::handler_failure(e)),
                }
            }
        }

        self.transport.write_payload(PayloadItem::Eof).await?;
        self.transport.flush().await?;
        Ok(persistent)
    }

    /// Best effort: the caller already has the original error to report, so
    /// failures to deliver the error response are only logged.
    async fn send_error_response(&mut self, e: &ExchangeError) {
        if !e.can_respond() {
            return;
        }
        let response = Response::builder().status(e.status_hint()).body(()).unwrap();
        let result = async {
            self.transport.write_head(response, PayloadSize::Empty).await?;
            self.transport.write_payload(PayloadItem::Eof).await?;
            self.transport.flush().await
        }
        .await;
        if let Err(send_error) = result {
            warn!(cause = %send_error, "failed to send error response");
        }
    }
}

fn cancel_once(canceller: Option<CancellationToken>) {
    if let Some(token) = canceller {
        debug!("cancelling aborted exchange");
        token.cancel();
    }
}
