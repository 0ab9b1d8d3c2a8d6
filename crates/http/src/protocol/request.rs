//! Request head handling.
//!
//! Wraps the standard `http::Request` type so the engine can pass a request's
//! metadata around before (and independently of) its body.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

use crate::protocol::wants_keep_alive;

/// The head of an HTTP request: method, target, version and headers, with no
/// body attached yet.
///
/// Handlers receive a `RequestHead` in their `begin` phase, before any body
/// data is available.
#[derive(Debug)]
pub struct RequestHead {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHead {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHead {
    /// Consumes the head and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this head, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request target's path component.
    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether this request asks for the connection to stay open once the
    /// exchange completes.
    ///
    /// `Connection: close` always wins; otherwise HTTP/1.0 requires an
    /// explicit `keep-alive` token while later versions default to persistent.
    pub fn is_persistent(&self) -> bool {
        wants_keep_alive(self.version(), self.headers())
    }
}

/// `http::Request` does not implement `Clone` (extensions may not be
/// cloneable), so the head is rebuilt field by field. Extensions are not
/// carried.
impl Clone for RequestHead {
    fn clone(&self) -> Self {
        let mut inner = Request::new(());
        *inner.method_mut() = self.inner.method().clone();
        *inner.uri_mut() = self.inner.uri().clone();
        *inner.version_mut() = self.inner.version();
        *inner.headers_mut() = self.inner.headers().clone();
        Self { inner }
    }
}

impl From<Parts> for RequestHead {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHead {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
