//! Request snapshot and custom log fields.
//!
//! The logging and recovery middleware accept extra fields computed from a
//! [`RequestInfo`]. Fields are emitted together as one JSON object under the
//! `fields` key of the record.
//!
//! ```rust
//! use towerkit_extras::field;
//!
//! let fields = vec![
//!     field::string("app", "example"),
//!     field::from_fn(|req| field::Field::new("client", req.client_ip.clone())),
//! ];
//! # let _ = fields;
//! ```

use http::{HeaderMap, Method, Uri, Version};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;
use towerkit_core::{client_ip, MatchedRoute};

/// Request attributes captured before the request is handed downstream
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Request method
    pub method: Method,
    /// Request URI as received
    pub uri: Uri,
    /// HTTP version
    pub version: Version,
    /// Request headers
    pub headers: HeaderMap,
    /// Client IP, see [`towerkit_core::client_ip`]
    pub client_ip: String,
    /// Route pattern, when the host router set one on the request
    pub route: Option<MatchedRoute>,
}

impl RequestInfo {
    /// Snapshot a request head
    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self::snapshot(
            &parts.method,
            &parts.uri,
            parts.version,
            &parts.headers,
            &parts.extensions,
        )
    }

    /// Snapshot a request without consuming it
    pub fn from_request<B>(req: &http::Request<B>) -> Self {
        Self::snapshot(
            req.method(),
            req.uri(),
            req.version(),
            req.headers(),
            req.extensions(),
        )
    }

    fn snapshot(
        method: &Method,
        uri: &Uri,
        version: Version,
        headers: &HeaderMap,
        extensions: &http::Extensions,
    ) -> Self {
        Self {
            method: method.clone(),
            uri: uri.clone(),
            version,
            headers: headers.clone(),
            client_ip: client_ip(headers, extensions),
            route: extensions.get::<MatchedRoute>().cloned(),
        }
    }

    /// Request path
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, empty when absent
    pub fn query(&self) -> &str {
        self.uri.query().unwrap_or("")
    }

    /// `User-Agent` header, empty when absent
    pub fn user_agent(&self) -> &str {
        self.headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Wire-format dump of the request head, without the body
    pub fn dump(&self) -> String {
        let target = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let mut out = format!("{} {} {:?}\r\n", self.method, target, self.version);

        let host = self
            .headers
            .get(http::header::HOST)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .or_else(|| self.uri.authority().map(|a| a.to_string()));
        if let Some(host) = host {
            let _ = write!(out, "Host: {}\r\n", host);
        }

        for (name, value) in self.headers.iter() {
            if *name == http::header::HOST {
                continue;
            }
            let _ = write!(
                out,
                "{}: {}\r\n",
                name,
                String::from_utf8_lossy(value.as_bytes())
            );
        }
        out.push_str("\r\n");
        out
    }
}

/// A single custom log field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name
    pub key: Cow<'static, str>,
    /// Field value
    pub value: serde_json::Value,
}

impl Field {
    /// Create a field
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Computes a custom field for a request
pub type CustomField = Arc<dyn Fn(&RequestInfo) -> Field + Send + Sync>;

/// Field computed per request by `f`
pub fn from_fn<F>(f: F) -> CustomField
where
    F: Fn(&RequestInfo) -> Field + Send + Sync + 'static,
{
    Arc::new(f)
}

fn constant(field: Field) -> CustomField {
    Arc::new(move |_: &RequestInfo| field.clone())
}

/// Constant string field
pub fn string(key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> CustomField {
    constant(Field::new(key, value.into()))
}

/// Constant signed integer field
pub fn int64(key: impl Into<Cow<'static, str>>, value: i64) -> CustomField {
    constant(Field::new(key, value))
}

/// Constant unsigned integer field
pub fn uint64(key: impl Into<Cow<'static, str>>, value: u64) -> CustomField {
    constant(Field::new(key, value))
}

/// Constant float field. NaN and infinities are logged as `null`.
pub fn float64(key: impl Into<Cow<'static, str>>, value: f64) -> CustomField {
    constant(Field::new(key, value))
}

/// Constant field holding any serializable value.
///
/// The value is serialized once; values that fail to serialize are logged
/// as `null`.
pub fn any<T: Serialize>(key: impl Into<Cow<'static, str>>, value: T) -> CustomField {
    let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
    constant(Field::new(key, value))
}

/// Evaluate `fields` into one JSON object, `None` when there are none
pub(crate) fn collect_fields(
    fields: &[CustomField],
    info: &RequestInfo,
) -> Option<serde_json::Value> {
    if fields.is_empty() {
        return None;
    }
    let map = fields
        .iter()
        .map(|f| {
            let field = f(info);
            (field.key.into_owned(), field.value)
        })
        .collect::<serde_json::Map<_, _>>();
    Some(serde_json::Value::Object(map))
}
