//! Keep-alive classification.
//!
//! Both sides of an exchange decide connection persistence from the same
//! rule: an explicit `Connection: close` token forces closure regardless of
//! protocol version, HTTP/1.0 defaults to non-persistent unless the peer sent
//! `Connection: keep-alive`, and later versions default to persistent.

use http::header::CONNECTION;
use http::{HeaderMap, Version};

/// Classifies whether a message with the given version and headers keeps the
/// connection alive after the exchange.
pub fn wants_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    if connection_has_token(headers, "close") {
        return false;
    }
    if version == Version::HTTP_10 {
        return connection_has_token(headers, "keep-alive");
    }
    true
}

/// The `Connection` header is a comma separated token list and may appear
/// multiple times.
fn connection_has_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(value: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = value {
            headers.insert(CONNECTION, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn http11_defaults_to_persistent() {
        assert!(wants_keep_alive(Version::HTTP_11, &headers(None)));
    }

    #[test]
    fn connection_close_wins_over_version_default() {
        assert!(!wants_keep_alive(Version::HTTP_11, &headers(Some("close"))));
        assert!(!wants_keep_alive(Version::HTTP_10, &headers(Some("close"))));
    }

    #[test]
    fn http10_requires_explicit_keep_alive() {
        assert!(!wants_keep_alive(Version::HTTP_10, &headers(None)));
        assert!(wants_keep_alive(Version::HTTP_10, &headers(Some("keep-alive"))));
    }

    #[test]
    fn token_matching_is_case_insensitive_and_list_aware() {
        assert!(!wants_keep_alive(Version::HTTP_11, &headers(Some("Keep-Alive, Close"))));
    }
}
