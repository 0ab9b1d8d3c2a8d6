//! Response head handling.
//!
//! The engine uses the standard `http::Response` type with an empty body
//! placeholder to represent a response's status line and headers before a
//! body producer is attached through `Exchange::submit`.

use http::Response;

/// The head of an HTTP response: status line and headers, before a body
/// producer is attached.
pub type ResponseHead = Response<()>;
