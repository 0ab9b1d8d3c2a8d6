//! Response body producers.
//!
//! A submitted response body is a boxed [`http_body::Body`] producing `Bytes`
//! frames. Handlers may submit any body implementation; the helpers here cover
//! the two common cases of a fully materialized body and no body at all.

use std::convert::Infallible;
use std::error::Error;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};

/// Boxed error type used at the handler boundary.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// The erased response body producer stored in an exchange after submission.
pub type ResponseBody = BoxBody<Bytes, BoxError>;

/// A body producer emitting the given data as a single frame.
pub fn full<D: Into<Bytes>>(data: D) -> ResponseBody {
    Full::new(data.into()).map_err(|never: Infallible| -> BoxError { match never {} }).boxed()
}

/// A body producer emitting no frames.
pub fn empty() -> ResponseBody {
    Empty::new().map_err(|never: Infallible| -> BoxError { match never {} }).boxed()
}
