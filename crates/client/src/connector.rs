//! The seam through which the pool establishes new connections.

use std::io;

use async_trait::async_trait;
use courier_http::transport::ClientTransport;

use crate::route::Destination;

/// Establishes a fresh client transport to a destination.
///
/// The pool calls this only after reserving capacity, so implementations
/// never need to worry about pool limits. A connector for real sockets would
/// dial the destination's authority and wrap the stream with its codec via
/// [`courier_http::transport::FramedTransport`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: ClientTransport + Send + 'static;

    async fn connect(&self, destination: &Destination) -> io::Result<Self::Transport>;
}
