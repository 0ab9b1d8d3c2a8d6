//! One request/response cycle.
//!
//! An [`Exchange`] is handed to a handler's `handle` phase. The handler
//! shapes the response by mutating the head and must then call
//! [`Exchange::submit`] exactly once to attach the body producer. Submission
//! is terminal: a second call is a protocol violation, and a handler that
//! never submits is caught by the exchange runner.

use std::fmt;

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;

use crate::protocol::{BoxError, ExchangeError, ResponseBody, ResponseHead};
use crate::utils::ensure;

/// The server-side state of a single request/response cycle.
pub struct Exchange {
    response: ResponseHead,
    producer: Option<ResponseBody>,
}

impl Exchange {
    /// A fresh exchange with a `200 OK` response head and no body submitted.
    pub fn new() -> Self {
        Self { response: Response::new(()), producer: None }
    }

    /// The response head as shaped so far.
    pub fn response(&self) -> &ResponseHead {
        &self.response
    }

    /// Mutable access to the response head. Only meaningful before
    /// submission is streamed out.
    pub fn response_mut(&mut self) -> &mut ResponseHead {
        &mut self.response
    }

    /// Shorthand for setting the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        *self.response.status_mut() = status;
    }

    /// Attaches the response body producer. Terminal: at most one submission
    /// per exchange.
    pub fn submit<B>(&mut self, producer: B) -> Result<(), ExchangeError>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        ensure!(self.producer.is_none(), ExchangeError::DoubleSubmit);
        self.producer = Some(producer.map_err(Into::into).boxed());
        Ok(())
    }

    /// Whether a body producer has been submitted.
    pub fn is_submitted(&self) -> bool {
        self.producer.is_some()
    }

    /// Splits the exchange into the response head and the submitted producer.
    pub(crate) fn into_parts(self) -> (ResponseHead, Option<ResponseBody>) {
        (self.response, self.producer)
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("status", &self.response.status())
            .field("submitted", &self.is_submitted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::body;

    #[test]
    fn starts_as_200_without_submission() {
        let exchange = Exchange::new();
        assert_eq!(exchange.response().status(), StatusCode::OK);
        assert!(!exchange.is_submitted());
    }

    #[test]
    fn second_submit_is_a_protocol_violation() {
        let mut exchange = Exchange::new();
        exchange.submit(body::full("first")).unwrap();
        let err = exchange.submit(body::full("second")).expect_err("double submit must fail");
        assert!(matches!(err, ExchangeError::DoubleSubmit));
        // the first submission stays in place
        assert!(exchange.is_submitted());
    }
}
