//! The transport seam between the engine and its byte-level collaborators.
//!
//! Framing, header parsing, chunked transfer and socket I/O are not this
//! engine's business: a transport delivers parsed message heads and payload
//! chunks, and accepts the same shapes for the other direction. The traits
//! here specify exactly the interface the exchange runner and the requester
//! need from such a collaborator.
//!
//! Contract shared by both directions: every head is followed by a payload
//! sequence terminated by [`PayloadItem::Eof`], even for bodyless messages.
//!
//! Two implementations ship with the crate:
//!
//! - [`FramedTransport`] bridges any `tokio_util::codec` decoder/encoder pair
//!   onto these traits, for transports backed by real sockets
//! - [`local`] provides an in-process transport pair, used to serve exchanges
//!   without sockets (and throughout the test suites)

use async_trait::async_trait;

use crate::protocol::{ExchangeError, PayloadItem, PayloadSize, RequestHead, ResponseHead};

mod framed;
pub use framed::FramedTransport;

pub mod local;

/// Server side of the transport seam: reads request envelopes, writes
/// response envelopes.
#[async_trait]
pub trait ServerTransport: Send {
    /// Reads the next request head, or `None` once the peer has closed the
    /// connection cleanly.
    async fn read_head(&mut self) -> Result<Option<RequestHead>, ExchangeError>;

    /// Reads the next item of the current request's payload sequence.
    async fn read_payload(&mut self) -> Result<PayloadItem, ExchangeError>;

    /// Writes a response head. `payload_size` tells the codec how the payload
    /// that follows will be framed.
    async fn write_head(&mut self, head: ResponseHead, payload_size: PayloadSize) -> Result<(), ExchangeError>;

    /// Writes one item of the response payload sequence.
    async fn write_payload(&mut self, item: PayloadItem) -> Result<(), ExchangeError>;

    /// Flushes buffered output to the peer.
    async fn flush(&mut self) -> Result<(), ExchangeError>;

    /// Shuts the transport down. Further reads observe end of stream.
    async fn close(&mut self) -> Result<(), ExchangeError>;
}

/// Client side of the transport seam: writes request envelopes, reads
/// response envelopes.
#[async_trait]
pub trait ClientTransport: Send {
    /// Writes a request head. `payload_size` tells the codec how the payload
    /// that follows will be framed.
    async fn write_head(&mut self, head: RequestHead, payload_size: PayloadSize) -> Result<(), ExchangeError>;

    /// Writes one item of the request payload sequence.
    async fn write_payload(&mut self, item: PayloadItem) -> Result<(), ExchangeError>;

    /// Flushes buffered output to the peer.
    async fn flush(&mut self) -> Result<(), ExchangeError>;

    /// Reads the response head, or `None` if the server closed the connection
    /// without responding.
    async fn read_head(&mut self) -> Result<Option<ResponseHead>, ExchangeError>;

    /// Reads the next item of the response's payload sequence.
    async fn read_payload(&mut self) -> Result<PayloadItem, ExchangeError>;

    /// Cheap liveness probe used by pool staleness checks. Implementations
    /// that cannot tell report `true`.
    fn is_open(&self) -> bool {
        true
    }

    /// Shuts the transport down.
    async fn close(&mut self) -> Result<(), ExchangeError>;
}
