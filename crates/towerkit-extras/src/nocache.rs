//! Cache-disabling headers
//!
//! Conditional request headers are removed before the inner service runs,
//! so it always answers in full. The response then always carries:
//!
//! ```text
//! Cache-Control: no-cache, no-store, must-revalidate
//! Pragma: no-cache
//! Expires: 0
//! ```
//!
//! and loses any `ETag` or `Last-Modified` header.

use futures_util::future::BoxFuture;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Request, Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Request headers that could turn the answer into a `304`
static CONDITIONAL_HEADERS: [HeaderName; 5] = [
    header::IF_MODIFIED_SINCE,
    header::IF_NONE_MATCH,
    header::IF_MATCH,
    header::IF_RANGE,
    header::IF_UNMODIFIED_SINCE,
];

const CACHE_CONTROL_VALUE: &str = "no-cache, no-store, must-revalidate";

/// Layer that forces cache-disabling headers. Has no configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCacheLayer;

impl NoCacheLayer {
    /// Create the layer
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NoCacheLayer {
    type Service = NoCache<S>;

    fn layer(&self, inner: S) -> Self::Service {
        NoCache { inner }
    }
}

/// Middleware that forces cache-disabling headers.
#[derive(Debug, Clone)]
pub struct NoCache<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for NoCache<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + 'static,
    S::Future: Send + 'static,
    ReqBody: 'static,
    ResBody: 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        for name in &CONDITIONAL_HEADERS {
            req.headers_mut().remove(name);
        }

        let future = self.inner.call(req);
        Box::pin(async move {
            let mut response = future.await?;
            apply(response.headers_mut());
            Ok(response)
        })
    }
}

fn apply(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_VALUE),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.remove(header::ETAG);
    headers.remove(header::LAST_MODIFIED);
}
