//! TCP server listener.
//!
//! [`Server`] binds a listening socket, accepts connections, and spawns one
//! task per connection running [`HttpConnection::process`] against the
//! configured handler registry. The byte-level codec stays external: a
//! [`TransportFactory`] turns each accepted stream into a
//! [`ServerTransport`].

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::connection::HttpConnection;
use crate::handler::{ExchangeHandler, HandlerRegistry};
use crate::transport::ServerTransport;

/// Turns an accepted TCP stream into a server-side transport.
///
/// Implementations wrap the stream with their byte-level codec, typically via
/// [`crate::transport::FramedTransport`].
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: ServerTransport + Send + 'static;

    fn create(&self, stream: TcpStream) -> Self::Transport;
}

#[derive(Debug)]
pub struct ServerBuilder<F> {
    factory: F,
    registry: HandlerRegistry,
    address: Option<Vec<SocketAddr>>,
    read_timeout: Option<Duration>,
    force_close: bool,
}

impl<F: TransportFactory> ServerBuilder<F> {
    fn new(factory: F) -> Self {
        Self { factory, registry: HandlerRegistry::new(), address: None, read_timeout: None, force_close: false }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().unwrap().collect::<Vec<_>>());
        self
    }

    /// Registers a handler under a URI pattern (`*`, `/exact`, `/prefix*`).
    pub fn register<H: ExchangeHandler>(mut self, pattern: impl AsRef<str>, handler: H) -> Self {
        self.registry.register(pattern, handler);
        self
    }

    /// Bounds how long an idle persistent connection waits for its next
    /// request.
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    /// Closes every connection after a single exchange.
    pub fn force_close(mut self, force_close: bool) -> Self {
        self.force_close = force_close;
        self
    }

    pub fn build(self) -> Result<Server<F>, ServerBuildError> {
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?;
        Ok(Server {
            factory: self.factory,
            registry: Arc::new(self.registry),
            address,
            read_timeout: self.read_timeout,
            force_close: self.force_close,
        })
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("address must be set")]
    MissingAddress,
}

pub struct Server<F> {
    factory: F,
    registry: Arc<HandlerRegistry>,
    address: Vec<SocketAddr>,
    read_timeout: Option<Duration>,
    force_close: bool,
}

impl<F> std::fmt::Debug for Server<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("address", &self.address).finish_non_exhaustive()
    }
}

impl<F: TransportFactory> Server<F> {
    pub fn builder(factory: F) -> ServerBuilder<F> {
        ServerBuilder::new(factory)
    }

    pub async fn start(self) {
        info!("start listening at {:?}", self.address);
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return;
            }
        };

        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let registry = Arc::clone(&self.registry);
            let mut connection = HttpConnection::new(self.factory.create(tcp_stream)).with_force_close(self.force_close);
            if let Some(read_timeout) = self.read_timeout {
                connection = connection.with_read_timeout(read_timeout);
            }

            tokio::spawn(async move {
                match connection.process(registry).await {
                    Ok(()) => {
                        info!(peer = %remote_addr, "finished processing, connection shutdown");
                    }
                    Err(e) => {
                        error!(peer = %remote_addr, cause = %e, "exchange failed, connection shutdown");
                    }
                }
            });
        }
    }
}
