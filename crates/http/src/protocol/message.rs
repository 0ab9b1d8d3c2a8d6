use bytes::Bytes;
use http_body::SizeHint;

/// An item traveling through the transport seam: either the parsed head of an
/// HTTP message or a piece of its payload.
///
/// The generic parameter `T` is the head type, typically paired with a
/// [`PayloadSize`] so the byte-level codec knows how to frame the payload
/// that follows.
#[derive(Debug)]
pub enum Message<T> {
    /// The parsed message head
    Header(T),
    /// A chunk of payload data or the end-of-payload marker
    Payload(PayloadItem),
}

/// One element of a message's payload stream.
///
/// Every head is followed by a payload sequence terminated by [`PayloadItem::Eof`],
/// even when the message carries no body. This keeps the exchange runner and the
/// requester free of empty-body special cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    /// A chunk of payload data
    Chunk(Bytes),
    /// Marks the end of the payload stream
    Eof,
}

/// Size information for an outgoing payload, as derived from the body
/// producer's size hint.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload of unknown length (codec picks a framing such as chunked encoding)
    Chunked,
    /// Empty payload (no body)
    Empty,
}

impl<T> Message<T> {
    /// Returns true if this message contains payload data
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    /// Returns true if this message contains head information
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }
}

impl PayloadItem {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Consumes the item and returns the contained bytes, if any
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

impl PayloadSize {
    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl From<SizeHint> for PayloadSize {
    fn from(size_hint: SizeHint) -> Self {
        match size_hint.exact() {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        }
    }
}

impl From<PayloadSize> for SizeHint {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Chunked => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}
