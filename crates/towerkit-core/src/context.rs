//! Per-request context shared between the host and the middleware.
//!
//! The host server and router put [`ClientAddr`] and [`MatchedRoute`] into the
//! request (or response) extensions. Handlers and middleware record failures
//! into [`RequestErrors`] on the response so outer middleware can see them.

use crate::body::BoxError;
use http::header::HeaderMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Route pattern matched by the host router, e.g. `/users/{id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute(Arc<str>);

impl MatchedRoute {
    /// Create a matched route from its pattern
    pub fn new(pattern: impl Into<Arc<str>>) -> Self {
        Self(pattern.into())
    }

    /// The route pattern
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Peer address of the connection the request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// Errors recorded while handling a request.
///
/// Lives in the response extensions. The request logger forces the error
/// level when the list is not empty.
#[derive(Clone, Default)]
pub struct RequestErrors {
    errors: Vec<Arc<dyn std::error::Error + Send + Sync>>,
}

impl RequestErrors {
    /// Create an empty error list
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error
    pub fn push(&mut self, err: impl Into<BoxError>) {
        self.errors.push(Arc::from(err.into()));
    }

    /// Number of recorded errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether no error was recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate over the recorded errors
    pub fn iter(&self) -> impl Iterator<Item = &(dyn std::error::Error + Send + Sync + 'static)> {
        self.errors.iter().map(|err| err.as_ref())
    }

    /// Record an error on a response, creating the list if needed
    pub fn record<B>(response: &mut http::Response<B>, err: impl Into<BoxError>) {
        let extensions = response.extensions_mut();
        if let Some(errors) = extensions.get_mut::<RequestErrors>() {
            errors.push(err);
        } else {
            let mut errors = RequestErrors::new();
            errors.push(err);
            extensions.insert(errors);
        }
    }
}

impl fmt::Debug for RequestErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.errors.iter().map(|err| err.to_string()))
            .finish()
    }
}

impl fmt::Display for RequestErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "Error #{:02}: {}", i + 1, err)?;
        }
        Ok(())
    }
}

/// Best-effort client IP.
///
/// Takes the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// [`ClientAddr`] extension. Returns an empty string when none is known.
pub fn client_ip(headers: &HeaderMap, extensions: &http::Extensions) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    extensions
        .get::<ClientAddr>()
        .map(|addr| addr.0.ip().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers, &http::Extensions::new()), "10.0.0.1");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers, &http::Extensions::new()), "10.0.0.9");

        let mut extensions = http::Extensions::new();
        extensions.insert(ClientAddr("192.168.1.7:4242".parse().unwrap()));
        assert_eq!(client_ip(&HeaderMap::new(), &extensions), "192.168.1.7");
    }

    #[test]
    fn client_ip_unknown_is_empty() {
        assert_eq!(client_ip(&HeaderMap::new(), &http::Extensions::new()), "");
    }

    #[test]
    fn record_appends_to_response_errors() {
        let mut response = http::Response::new(());
        RequestErrors::record(&mut response, "first");
        RequestErrors::record(&mut response, "second");

        let errors = response.extensions().get::<RequestErrors>().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.to_string(), "Error #01: first; Error #02: second");
    }

    proptest! {
        #[test]
        fn prop_first_forwarded_entry_wins(a in any::<[u8; 4]>(), b in any::<[u8; 4]>()) {
            let first = Ipv4Addr::from(a).to_string();
            let second = Ipv4Addr::from(b).to_string();
            let mut headers = HeaderMap::new();
            headers.insert(
                "x-forwarded-for",
                HeaderValue::from_str(&format!("{} , {}", first, second)).unwrap(),
            );
            prop_assert_eq!(client_ip(&headers, &http::Extensions::new()), first);
        }
    }
}
