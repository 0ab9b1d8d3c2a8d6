//! In-process transport pair.
//!
//! [`pair`] returns two connected transport halves backed by message
//! channels, so a client and an exchange runner can talk without sockets or a
//! byte-level codec. This is how handlers and the pooled requester are
//! exercised in tests, and it also serves in-process request dispatch.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::protocol::{ExchangeError, Message, PayloadItem, PayloadSize, RequestHead, ResponseHead};
use crate::transport::{ClientTransport, ServerTransport};

type RequestFrame = Message<(RequestHead, PayloadSize)>;
type ResponseFrame = Message<(ResponseHead, PayloadSize)>;

/// Creates a connected client/server transport pair.
///
/// The channels are unbounded: a closed peer never blocks the other side, and
/// frames written before a close remain readable, which mirrors how a socket
/// drains buffered data after the remote end shuts down.
pub fn pair() -> (LocalClientTransport, LocalServerTransport) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    (
        LocalClientTransport { tx: Some(request_tx), rx: response_rx },
        LocalServerTransport { tx: Some(response_tx), rx: request_rx },
    )
}

/// Client half of an in-process connection.
#[derive(Debug)]
pub struct LocalClientTransport {
    tx: Option<mpsc::UnboundedSender<RequestFrame>>,
    rx: mpsc::UnboundedReceiver<ResponseFrame>,
}

/// Server half of an in-process connection.
#[derive(Debug)]
pub struct LocalServerTransport {
    tx: Option<mpsc::UnboundedSender<ResponseFrame>>,
    rx: mpsc::UnboundedReceiver<RequestFrame>,
}

fn peer_gone() -> ExchangeError {
    ExchangeError::Io { source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer transport closed") }
}

fn send_frame<T>(tx: &Option<mpsc::UnboundedSender<Message<T>>>, frame: Message<T>) -> Result<(), ExchangeError> {
    match tx {
        Some(tx) => tx.send(frame).map_err(|_| peer_gone()),
        None => Err(peer_gone()),
    }
}

#[async_trait]
impl ClientTransport for LocalClientTransport {
    async fn write_head(&mut self, head: RequestHead, payload_size: PayloadSize) -> Result<(), ExchangeError> {
        send_frame(&self.tx, Message::Header((head, payload_size)))
    }

    async fn write_payload(&mut self, item: PayloadItem) -> Result<(), ExchangeError> {
        send_frame(&self.tx, Message::Payload(item))
    }

    async fn flush(&mut self) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn read_head(&mut self) -> Result<Option<ResponseHead>, ExchangeError> {
        match self.rx.recv().await {
            Some(Message::Header((head, _payload_size))) => Ok(Some(head)),
            Some(Message::Payload(_)) => Err(ExchangeError::malformed("expected a response head, received payload data")),
            None => Ok(None),
        }
    }

    async fn read_payload(&mut self) -> Result<PayloadItem, ExchangeError> {
        match self.rx.recv().await {
            Some(Message::Payload(item)) => Ok(item),
            Some(Message::Header(_)) => Err(ExchangeError::malformed("expected payload data, received a response head")),
            None => Err(ExchangeError::malformed("connection closed inside a response payload")),
        }
    }

    fn is_open(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}

#[async_trait]
impl ServerTransport for LocalServerTransport {
    async fn read_head(&mut self) -> Result<Option<RequestHead>, ExchangeError> {
        match self.rx.recv().await {
            Some(Message::Header((head, _payload_size))) => Ok(Some(head)),
            Some(Message::Payload(_)) => Err(ExchangeError::malformed("expected a request head, received payload data")),
            None => Ok(None),
        }
    }

    async fn read_payload(&mut self) -> Result<PayloadItem, ExchangeError> {
        match self.rx.recv().await {
            Some(Message::Payload(item)) => Ok(item),
            Some(Message::Header(_)) => Err(ExchangeError::malformed("expected payload data, received a request head")),
            None => Err(ExchangeError::malformed("connection closed inside a request payload")),
        }
    }

    async fn write_head(&mut self, head: ResponseHead, payload_size: PayloadSize) -> Result<(), ExchangeError> {
        send_frame(&self.tx, Message::Header((head, payload_size)))
    }

    async fn write_payload(&mut self, item: PayloadItem) -> Result<(), ExchangeError> {
        send_frame(&self.tx, Message::Payload(item))
    }

    async fn flush(&mut self) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}
