use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use async_trait::async_trait;

use crate::protocol::{ExchangeError, Message, PayloadItem, PayloadSize, RequestHead, ResponseHead};
use crate::transport::{ClientTransport, ServerTransport};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Bridges a `tokio_util::codec` decoder/encoder pair onto the transport
/// traits.
///
/// The codec stays in charge of all byte-level concerns; this wrapper only
/// enforces the head/payload ordering of the seam and the flush discipline:
/// heads and intermediate chunks are fed into the write buffer, the final
/// `Eof` marker is followed by an explicit flush, and a head with an empty
/// payload is flushed immediately.
pub struct FramedTransport<R, W, D, E> {
    framed_read: FramedRead<R, D>,
    framed_write: FramedWrite<W, E>,
}

impl<R, W, D, E> std::fmt::Debug for FramedTransport<R, W, D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedTransport").finish_non_exhaustive()
    }
}

impl<R, W, D, E> FramedTransport<R, W, D, E>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, decoder: D, encoder: E) -> Self
    where
        D: Decoder,
    {
        Self {
            framed_read: FramedRead::with_capacity(reader, decoder, READ_BUFFER_SIZE),
            framed_write: FramedWrite::new(writer, encoder),
        }
    }
}

#[async_trait]
impl<R, W, D, E> ServerTransport for FramedTransport<R, W, D, E>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    D: Decoder<Item = Message<(RequestHead, PayloadSize)>, Error = ExchangeError> + Send,
    E: Encoder<Message<(ResponseHead, PayloadSize)>, Error = ExchangeError> + Send,
{
    async fn read_head(&mut self) -> Result<Option<RequestHead>, ExchangeError> {
        match self.framed_read.next().await {
            Some(Ok(Message::Header((head, _payload_size)))) => Ok(Some(head)),
            Some(Ok(Message::Payload(_))) => Err(ExchangeError::malformed("expected a request head, decoded payload data")),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn read_payload(&mut self) -> Result<PayloadItem, ExchangeError> {
        match self.framed_read.next().await {
            Some(Ok(Message::Payload(item))) => Ok(item),
            Some(Ok(Message::Header(_))) => Err(ExchangeError::malformed("expected payload data, decoded a request head")),
            Some(Err(e)) => Err(e),
            None => Err(ExchangeError::malformed("connection closed inside a request payload")),
        }
    }

    async fn write_head(&mut self, head: ResponseHead, payload_size: PayloadSize) -> Result<(), ExchangeError> {
        let message = Message::Header((head, payload_size));
        if payload_size.is_empty() {
            // head-only responses still need to reach the wire
            self.framed_write.send(message).await
        } else {
            self.framed_write.feed(message).await
        }
    }

    async fn write_payload(&mut self, item: PayloadItem) -> Result<(), ExchangeError> {
        self.framed_write.feed(Message::Payload(item)).await
    }

    async fn flush(&mut self) -> Result<(), ExchangeError> {
        self.framed_write.flush().await
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        self.framed_write.flush().await?;
        self.framed_write.get_mut().shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl<R, W, D, E> ClientTransport for FramedTransport<R, W, D, E>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    D: Decoder<Item = Message<(ResponseHead, PayloadSize)>, Error = ExchangeError> + Send,
    E: Encoder<Message<(RequestHead, PayloadSize)>, Error = ExchangeError> + Send,
{
    async fn write_head(&mut self, head: RequestHead, payload_size: PayloadSize) -> Result<(), ExchangeError> {
        self.framed_write.feed(Message::Header((head, payload_size))).await
    }

    async fn write_payload(&mut self, item: PayloadItem) -> Result<(), ExchangeError> {
        self.framed_write.feed(Message::Payload(item)).await
    }

    async fn flush(&mut self) -> Result<(), ExchangeError> {
        self.framed_write.flush().await
    }

    async fn read_head(&mut self) -> Result<Option<ResponseHead>, ExchangeError> {
        match self.framed_read.next().await {
            Some(Ok(Message::Header((head, _payload_size)))) => Ok(Some(head)),
            Some(Ok(Message::Payload(_))) => Err(ExchangeError::malformed("expected a response head, decoded payload data")),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn read_payload(&mut self) -> Result<PayloadItem, ExchangeError> {
        match self.framed_read.next().await {
            Some(Ok(Message::Payload(item))) => Ok(item),
            Some(Ok(Message::Header(_))) => Err(ExchangeError::malformed("expected payload data, decoded a response head")),
            Some(Err(e)) => Err(e),
            None => Err(ExchangeError::malformed("connection closed inside a response payload")),
        }
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        self.framed_write.flush().await?;
        self.framed_write.get_mut().shutdown().await?;
        Ok(())
    }
}
