//! Envelope types shared by the server and client sides of the engine.
//!
//! The engine never touches raw bytes: a transport (see [`crate::transport`])
//! delivers parsed heads and payload chunks and accepts the same shapes on
//! the way out. This module defines those shapes:
//!
//! - [`Message`], [`PayloadItem`], [`PayloadSize`]: the items a codec
//!   produces and consumes at the transport seam
//! - [`RequestHead`] / [`ResponseHead`]: message metadata without a body
//! - [`ResponseBody`]: the erased body producer submitted by handlers
//! - [`ExchangeError`]: the error taxonomy of a single exchange
//! - [`wants_keep_alive`]: the keep-alive classification both sides share

mod message;
pub use message::{Message, PayloadItem, PayloadSize};

mod request;
pub use request::RequestHead;

mod response;
pub use response::ResponseHead;

pub mod body;
pub use body::{BoxError, ResponseBody};

mod error;
pub use error::ExchangeError;

mod persistence;
pub use persistence::wants_keep_alive;
