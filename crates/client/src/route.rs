//! Route identity for connection pooling.

use std::fmt;

/// The origin a pooled connection talks to.
///
/// Connections are interchangeable exactly when their destinations are equal,
/// so this is the pool's partition key. The scheme participates in equality: a
/// TLS route never shares connections with a plain one even on the same
/// host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    scheme: String,
    host: String,
    port: u16,
}

impl Destination {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self { scheme: scheme.into(), host: host.into(), port }
    }

    /// Shorthand for a plain `http` destination.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self::new("http", host, port)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The `host:port` form used for socket addresses and `Host` headers.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}
