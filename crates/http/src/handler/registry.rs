use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::handler::{ErasedExchangeHandler, ExchangeHandler, NotImplementedHandler, erase};

/// Maps URI patterns to handlers and resolves each request to exactly one
/// handler.
///
/// Pattern syntax: `*` (universal fallback), `/exact` paths, and `/prefix*`
/// wildcards. Resolution prefers an exact match, then the longest matching
/// prefix, then the universal handler; when nothing matches, the built-in
/// [`NotImplementedHandler`] answers. Resolution is total: the absence of a
/// match is a defined state, not an error.
pub struct HandlerRegistry {
    exact: HashMap<String, Arc<dyn ErasedExchangeHandler>>,
    prefixes: HashMap<String, Arc<dyn ErasedExchangeHandler>>,
    universal: Option<Arc<dyn ErasedExchangeHandler>>,
    fallback: Arc<dyn ErasedExchangeHandler>,
}

enum UriPattern {
    Universal,
    Prefix(String),
    Exact(String),
}

impl UriPattern {
    fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            Self::Universal
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            Self::Prefix(prefix.to_owned())
        } else {
            Self::Exact(pattern.to_owned())
        }
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { exact: HashMap::new(), prefixes: HashMap::new(), universal: None, fallback: erase(NotImplementedHandler) }
    }

    /// Registers a handler under a pattern. Registering the identical pattern
    /// again replaces the prior entry.
    pub fn register<H: ExchangeHandler>(&mut self, pattern: impl AsRef<str>, handler: H) {
        let handler = erase(handler);
        match UriPattern::parse(pattern.as_ref()) {
            UriPattern::Universal => self.universal = Some(handler),
            UriPattern::Prefix(prefix) => {
                self.prefixes.insert(prefix, handler);
            }
            UriPattern::Exact(path) => {
                self.exact.insert(path, handler);
            }
        }
    }

    /// Resolves a request path to its handler. Query strings are ignored,
    /// path matching is case sensitive.
    pub fn resolve(&self, path: &str) -> Arc<dyn ErasedExchangeHandler> {
        let path = path.split('?').next().unwrap_or(path);

        if let Some(handler) = self.exact.get(path) {
            return Arc::clone(handler);
        }

        let best_prefix = self
            .prefixes
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());
        if let Some((_, handler)) = best_prefix {
            return Arc::clone(handler);
        }

        match &self.universal {
            Some(handler) => Arc::clone(handler),
            None => Arc::clone(&self.fallback),
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("exact", &self.exact.keys().collect::<Vec<_>>())
            .field("prefixes", &self.prefixes.keys().collect::<Vec<_>>())
            .field("universal", &self.universal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Exchange;
    use crate::handler::{BodyConsumer, DiscardingConsumer, ExchangeHandler};
    use crate::protocol::{BoxError, RequestHead, body};
    use async_trait::async_trait;
    use http::StatusCode;
    use tokio_util::sync::CancellationToken;

    /// Answers with a fixed status so tests can tell which handler resolved.
    struct Tagged(u16);

    #[async_trait]
    impl ExchangeHandler for Tagged {
        type Value = ();
        type Consumer = DiscardingConsumer;

        fn begin(&self, _head: &RequestHead) -> Self::Consumer {
            DiscardingConsumer::new()
        }

        async fn handle(&self, _value: (), exchange: &mut Exchange) -> Result<Option<CancellationToken>, BoxError> {
            exchange.set_status(StatusCode::from_u16(self.0)?);
            exchange.submit(body::empty())?;
            Ok(None)
        }
    }

    async fn resolved_status(registry: &HandlerRegistry, path: &str) -> StatusCode {
        let head: RequestHead = http::Request::builder().uri(path).body(()).unwrap().into();
        let mut driver = registry.resolve(path).begin(&head);
        let mut exchange = Exchange::new();
        driver.finish(&mut exchange).await.unwrap();
        exchange.response().status()
    }

    #[tokio::test]
    async fn exact_match_beats_prefix_and_universal() {
        let mut registry = HandlerRegistry::new();
        registry.register("*", Tagged(200));
        registry.register("/stuff*", Tagged(201));
        registry.register("/stuff/exact", Tagged(202));

        assert_eq!(resolved_status(&registry, "/stuff/exact").await, StatusCode::from_u16(202).unwrap());
        assert_eq!(resolved_status(&registry, "/stuff/other").await, StatusCode::from_u16(201).unwrap());
        assert_eq!(resolved_status(&registry, "/elsewhere").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register("/a*", Tagged(201));
        registry.register("/a/b*", Tagged(202));

        assert_eq!(resolved_status(&registry, "/a/b/c").await, StatusCode::from_u16(202).unwrap());
        assert_eq!(resolved_status(&registry, "/a/x").await, StatusCode::from_u16(201).unwrap());
    }

    #[tokio::test]
    async fn identical_pattern_replaces_prior_entry() {
        let mut registry = HandlerRegistry::new();
        registry.register("/stuff", Tagged(201));
        registry.register("/stuff", Tagged(202));

        assert_eq!(resolved_status(&registry, "/stuff").await, StatusCode::from_u16(202).unwrap());
    }

    #[tokio::test]
    async fn query_strings_are_ignored() {
        let mut registry = HandlerRegistry::new();
        registry.register("/stuff", Tagged(201));

        assert_eq!(resolved_status(&registry, "/stuff?key=value").await, StatusCode::from_u16(201).unwrap());
    }

    #[tokio::test]
    async fn unmatched_path_falls_back_to_not_implemented() {
        let registry = HandlerRegistry::new();
        assert_eq!(resolved_status(&registry, "/anything").await, StatusCode::NOT_IMPLEMENTED);
    }
}
