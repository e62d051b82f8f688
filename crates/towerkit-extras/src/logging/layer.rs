//! Request logger middleware layer

use super::config::{is_multipart, Completed, LoggerConfig};
use super::curl;
use crate::field::{collect_fields, RequestInfo};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Request, Response, StatusCode};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use towerkit_core::{body, event_at, Body, BoxError, MatchedRoute, RequestErrors};
use tracing::Level;

const SKIP_REQUEST_BODY: &str = "skip request body";
const SKIP_RESPONSE_BODY: &str = "skip response body";
const LARGER_REQUEST_BODY: &str = "larger request body";
const LARGER_RESPONSE_BODY: &str = "larger response body";

/// Layer that logs one structured record per request.
///
/// # Example
///
/// ```rust
/// use towerkit_extras::{field, LoggerConfig, LoggerLayer};
///
/// let layer = LoggerLayer::new(
///     LoggerConfig::default()
///         .custom_fields([field::string("app", "example")])
///         .skip_logging(|c| c.request.path() == "/healthz")
///         .enable_body(true)
///         .body_limit(4096),
/// );
/// # let _ = layer;
/// ```
#[derive(Clone)]
pub struct LoggerLayer {
    config: Arc<LoggerConfig>,
}

impl LoggerLayer {
    /// Create a logger layer with the given configuration
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for LoggerLayer {
    fn default() -> Self {
        Self::new(LoggerConfig::default())
    }
}

impl<S> Layer<S> for LoggerLayer {
    type Service = Logger<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logger {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Middleware that logs one structured record per request.
///
/// See [`LoggerLayer`].
#[derive(Clone)]
pub struct Logger<S> {
    inner: S,
    config: Arc<LoggerConfig>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Logger<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: http_body::Body<Data = Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // take the service that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();

        Box::pin(async move {
            let start = Instant::now();
            let capture = config.body_capture.is_enabled();
            let (parts, req_body) = req.into_parts();

            // some inner middleware rewrite the URI, keep what the client sent
            let info = RequestInfo::from_parts(&parts);
            let skip_request_body =
                is_multipart(&parts.headers) || (config.skip_request_body)(&parts);

            let mut captured = Captured::default();
            let req_body = if !skip_request_body && (capture || config.debug_curl) {
                match body::collect(req_body).await {
                    Ok(bytes) => {
                        captured.request = Some(bytes.clone());
                        body::full(bytes)
                    }
                    Err(err) => {
                        let mut response = read_failure(&err);
                        RequestErrors::record(&mut response, towerkit_core::Error::ReadBody(err));
                        return Ok(finish(&config, &info, start, capture, &captured, response));
                    }
                }
            } else {
                body::boxed(req_body)
            };

            let fut: BoxFuture<'static, Result<S::Response, S::Error>> =
                Box::pin(inner.call(Request::from_parts(parts, req_body)));
            let response = fut.await?;

            let response = if capture {
                let (parts, res_body) = response.into_parts();
                match body::collect(res_body).await {
                    Ok(bytes) => {
                        captured.response = Some(bytes.clone());
                        Response::from_parts(parts, body::full(bytes))
                    }
                    Err(err) => {
                        let mut response = read_failure(&err);
                        RequestErrors::record(
                            &mut response,
                            towerkit_core::Error::BufferBody(err),
                        );
                        response
                    }
                }
            } else {
                response.map(body::boxed)
            };

            Ok(finish(&config, &info, start, capture, &captured, response))
        })
    }
}

/// Bodies buffered on the way through
#[derive(Default)]
struct Captured {
    request: Option<Bytes>,
    response: Option<Bytes>,
}

fn read_failure(err: &BoxError) -> Response<Body> {
    let mut response = Response::new(body::full(err.to_string()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Body text for the record, or `marker` when it reaches the limit
fn limited(bytes: &[u8], limit: usize, marker: &str) -> String {
    if limit > 0 && bytes.len() >= limit {
        marker.to_string()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Emit the access record for a finished request and hand the response back
fn finish(
    config: &LoggerConfig,
    info: &RequestInfo,
    start: Instant,
    capture: bool,
    captured: &Captured,
    response: Response<Body>,
) -> Response<Body> {
    let route = response
        .extensions()
        .get::<MatchedRoute>()
        .or(info.route.as_ref())
        .map(MatchedRoute::as_str)
        .unwrap_or("");

    let completed = Completed {
        request: info,
        status: response.status(),
        headers: response.headers(),
        errors: response.extensions().get::<RequestErrors>(),
        latency: start.elapsed(),
    };

    if (config.skip_logging)(&completed) {
        return response;
    }

    let level = if completed.has_errors() {
        Level::ERROR
    } else {
        (config.level)(&completed)
    };

    let bodies = capture.then(|| {
        let request = match &captured.request {
            Some(bytes) => limited(bytes, config.body_limit, LARGER_REQUEST_BODY),
            None => SKIP_REQUEST_BODY.to_string(),
        };
        let response = match &captured.response {
            Some(_) if (config.skip_response_body)(&completed) => SKIP_RESPONSE_BODY.to_string(),
            Some(bytes) => limited(bytes, config.body_limit, LARGER_RESPONSE_BODY),
            None => SKIP_RESPONSE_BODY.to_string(),
        };
        (request, response)
    });

    let curl = captured
        .request
        .as_deref()
        .filter(|_| config.debug_curl)
        .map(|bytes| curl::command(info, Some(bytes)));

    let fields = collect_fields(&config.custom_fields, info);

    event_at!(
        level,
        status = completed.status.as_u16(),
        method = %info.method,
        path = %info.path(),
        route = route,
        query = %info.query(),
        ip = %info.client_ip,
        user_agent = %info.user_agent(),
        latency = ?completed.latency,
        request_body = bodies.as_ref().map(|(req, _)| req.as_str()),
        response_body = bodies.as_ref().map(|(_, res)| res.as_str()),
        fields = fields.as_ref().map(tracing::field::display),
        curl = curl.as_deref(),
        errors = completed.errors.filter(|e| !e.is_empty()).map(tracing::field::display),
        "logging"
    );

    response
}
