use std::io;

use http::StatusCode;
use thiserror::Error;

use crate::protocol::body::BoxError;

/// Errors raised while driving one request/response exchange.
///
/// Everything except [`ExchangeError::Io`] can still be answered with an
/// error response as long as the response head has not been written; once
/// committed, any of these is fatal to the connection.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("malformed request: {reason}")]
    MalformedRequest { reason: String },

    #[error("handler failure: {source}")]
    HandlerFailure { source: BoxError },

    #[error("protocol violation: response submitted more than once")]
    DoubleSubmit,

    #[error("protocol violation: handler completed without submitting a response")]
    SubmitMissing,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ExchangeError {
    pub fn malformed<S: ToString>(reason: S) -> Self {
        Self::MalformedRequest { reason: reason.to_string() }
    }

    pub fn handler_failure<E: Into<BoxError>>(source: E) -> Self {
        Self::HandlerFailure { source: source.into() }
    }

    /// True for submit-contract violations, which are always fatal to the
    /// current exchange.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::DoubleSubmit | Self::SubmitMissing)
    }

    /// Whether an error response can still be produced for this error.
    ///
    /// I/O errors mean the transport itself is gone, so there is nothing left
    /// to write a response to.
    pub fn can_respond(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }

    /// The status code an error response for this error should carry,
    /// assuming the response head has not been committed yet.
    pub fn status_hint(&self) -> StatusCode {
        match self {
            Self::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
