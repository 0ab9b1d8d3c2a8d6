//! Client-side error taxonomy.

use std::io;
use std::time::Duration;

use courier_http::protocol::ExchangeError;
use thiserror::Error;

use crate::route::Destination;

/// Everything that can go wrong while executing a request through the
/// requester.
///
/// Pool and connect failures identify their destination; exchange failures
/// carry the underlying [`ExchangeError`]. Any variant other than
/// [`ClientError::PoolExhausted`] means the connection involved has been
/// discarded rather than returned to the pool.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// No connection became available for the destination within the lease
    /// timeout.
    #[error("connection pool exhausted for {destination} after {elapsed:?}")]
    PoolExhausted { destination: Destination, elapsed: Duration },

    /// Establishing a new connection to the destination failed.
    #[error("failed to connect to {destination}: {source}")]
    Connect {
        destination: Destination,
        #[source]
        source: io::Error,
    },

    /// The server did not produce the awaited data within the socket timeout.
    #[error("no response data within {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The server closed the connection before sending a response head.
    #[error("server closed the connection before responding")]
    Disconnected,

    /// The exchange itself failed, on either side of the transport.
    #[error("exchange failed: {source}")]
    Exchange {
        #[from]
        source: ExchangeError,
    },
}

impl ClientError {
    pub fn connect(destination: Destination, source: io::Error) -> Self {
        Self::Connect { destination, source }
    }

    /// Whether retrying against a fresh connection could plausibly succeed.
    /// Protocol violations and handler failures are not retryable; transport
    /// hiccups and early disconnects are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Disconnected | Self::Timeout { .. } => true,
            Self::Exchange { source } => matches!(source, ExchangeError::Io { .. }),
            Self::PoolExhausted { .. } | Self::Connect { .. } => false,
        }
    }
}
