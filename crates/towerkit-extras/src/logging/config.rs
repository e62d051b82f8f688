//! Request logger configuration types

use crate::field::{CustomField, RequestInfo};
use http::{HeaderMap, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use towerkit_core::RequestErrors;
use tracing::Level;

/// Shared on/off switch for request/response body capture.
///
/// Clones share the same flag, so a handle kept outside the middleware can
/// turn capture on or off while the server runs. Reads and writes are
/// relaxed: a request in flight may see either value.
#[derive(Debug, Clone, Default)]
pub struct BodyCapture(Arc<AtomicBool>);

impl BodyCapture {
    /// Create a switch in the given state
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    /// Whether capture is on
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Turn capture on or off
    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

/// A finished request, as seen by the logging predicates
#[derive(Debug)]
pub struct Completed<'a> {
    /// Request snapshot taken on entry
    pub request: &'a RequestInfo,
    /// Final response status
    pub status: StatusCode,
    /// Final response headers
    pub headers: &'a HeaderMap,
    /// Errors recorded on the response, if any
    pub errors: Option<&'a RequestErrors>,
    /// Time since the request entered the middleware
    pub latency: Duration,
}

impl Completed<'_> {
    /// Whether any error was recorded for this request
    pub fn has_errors(&self) -> bool {
        self.errors.map(|e| !e.is_empty()).unwrap_or(false)
    }
}

/// Predicate over a completed request
pub type CompletedPredicate = Arc<dyn Fn(&Completed<'_>) -> bool + Send + Sync>;

/// Predicate over an incoming request head
pub type RequestPredicate = Arc<dyn Fn(&http::request::Parts) -> bool + Send + Sync>;

/// Picks the record level for a completed request
pub type LevelSelector = Arc<dyn Fn(&Completed<'_>) -> Level + Send + Sync>;

/// Request logger configuration.
///
/// Built once, then shared read-only by every request. Only the
/// [`BodyCapture`] switch may change afterwards.
#[derive(Clone)]
pub struct LoggerConfig {
    /// Extra fields, emitted as one JSON object under `fields`. Default: none.
    pub custom_fields: Vec<CustomField>,
    /// Returns true to drop the record. Default: never.
    pub skip_logging: CompletedPredicate,
    /// Returns true to leave the request body unread. Multipart bodies are
    /// always skipped. Default: never.
    pub skip_request_body: RequestPredicate,
    /// Returns true to leave the response body out of the record.
    /// Default: never.
    pub skip_response_body: CompletedPredicate,
    /// Record level. Default: [`default_level`]. Recorded errors always
    /// force `ERROR`.
    pub level: LevelSelector,
    /// Body capture switch. Default: off.
    pub body_capture: BodyCapture,
    /// Bodies of at least this many bytes are replaced by a marker.
    /// `0` means no limit. Default: `0`.
    pub body_limit: usize,
    /// Attach an equivalent `curl` command. Default: off.
    pub debug_curl: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            custom_fields: Vec::new(),
            skip_logging: Arc::new(|_: &Completed<'_>| false),
            skip_request_body: Arc::new(|_: &http::request::Parts| false),
            skip_response_body: Arc::new(|_: &Completed<'_>| false),
            level: Arc::new(|c: &Completed<'_>| default_level(c.status)),
            body_capture: BodyCapture::default(),
            body_limit: 0,
            debug_curl: false,
        }
    }
}

impl LoggerConfig {
    /// Set the custom fields
    pub fn custom_fields(mut self, fields: impl IntoIterator<Item = CustomField>) -> Self {
        self.custom_fields = fields.into_iter().collect();
        self
    }

    /// Set the skip-logging predicate
    pub fn skip_logging<F>(mut self, f: F) -> Self
    where
        F: Fn(&Completed<'_>) -> bool + Send + Sync + 'static,
    {
        self.skip_logging = Arc::new(f);
        self
    }

    /// Set the skip-request-body predicate
    pub fn skip_request_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&http::request::Parts) -> bool + Send + Sync + 'static,
    {
        self.skip_request_body = Arc::new(f);
        self
    }

    /// Set the skip-response-body predicate
    pub fn skip_response_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&Completed<'_>) -> bool + Send + Sync + 'static,
    {
        self.skip_response_body = Arc::new(f);
        self
    }

    /// Set the level selector
    pub fn level<F>(mut self, f: F) -> Self
    where
        F: Fn(&Completed<'_>) -> Level + Send + Sync + 'static,
    {
        self.level = Arc::new(f);
        self
    }

    /// Turn body capture on or off
    pub fn enable_body(self, enabled: bool) -> Self {
        self.body_capture.set(enabled);
        self
    }

    /// Use a capture switch controlled from outside
    pub fn external_body_capture(mut self, capture: BodyCapture) -> Self {
        self.body_capture = capture;
        self
    }

    /// Set the body size limit, `0` for none
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Attach a `curl` command to each record
    pub fn debug_curl(mut self, enabled: bool) -> Self {
        self.debug_curl = enabled;
        self
    }
}

/// Default level selector.
///
/// - `ERROR` for 500..=511
/// - `WARN` for 400..=451, except 401
/// - `INFO` otherwise
pub fn default_level(status: StatusCode) -> Level {
    let code = status.as_u16();
    if (500..=511).contains(&code) {
        Level::ERROR
    } else if (400..=451).contains(&code) && status != StatusCode::UNAUTHORIZED {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// Whether the request carries a multipart body with a boundary
pub(crate) fn is_multipart(headers: &HeaderMap) -> bool {
    let Some(mime) = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<mime::Mime>().ok())
    else {
        return false;
    };

    mime.type_() == mime::MULTIPART
        && (mime.subtype() == mime::FORM_DATA || mime.subtype().as_str() == "mixed")
        && mime.get_param(mime::BOUNDARY).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use proptest::prelude::*;

    #[test]
    fn default_level_matches_status_classes() {
        assert_eq!(default_level(StatusCode::OK), Level::INFO);
        assert_eq!(default_level(StatusCode::FOUND), Level::INFO);
        assert_eq!(default_level(StatusCode::BAD_REQUEST), Level::WARN);
        assert_eq!(default_level(StatusCode::UNAUTHORIZED), Level::INFO);
        assert_eq!(default_level(StatusCode::NOT_FOUND), Level::WARN);
        assert_eq!(default_level(StatusCode::INTERNAL_SERVER_ERROR), Level::ERROR);
        assert_eq!(
            default_level(StatusCode::NETWORK_AUTHENTICATION_REQUIRED),
            Level::ERROR
        );
    }

    proptest! {
        #[test]
        fn prop_server_errors_are_error_level(code in 500u16..=511u16) {
            let status = StatusCode::from_u16(code).unwrap();
            prop_assert_eq!(default_level(status), Level::ERROR);
        }

        #[test]
        fn prop_success_and_redirects_are_info(code in 100u16..400u16) {
            let status = StatusCode::from_u16(code).unwrap();
            prop_assert_eq!(default_level(status), Level::INFO);
        }
    }

    #[test]
    fn body_capture_clones_share_state() {
        let capture = BodyCapture::new(false);
        let config = LoggerConfig::default().external_body_capture(capture.clone());
        assert!(!config.body_capture.is_enabled());

        capture.set(true);
        assert!(config.body_capture.is_enabled());
    }

    #[test]
    fn multipart_requires_boundary() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=xyz"),
        );
        assert!(is_multipart(&headers));

        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/mixed; boundary=abc"),
        );
        assert!(is_multipart(&headers));

        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data"),
        );
        assert!(!is_multipart(&headers));

        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        assert!(!is_multipart(&headers));

        assert!(!is_multipart(&HeaderMap::new()));
    }
}
