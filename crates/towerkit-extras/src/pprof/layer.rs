//! Profiling endpoint router

use super::profiler::{ProcessProfiler, ProfileKind, Profiler};
use super::vars;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::{self, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use std::fmt::Write as _;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use towerkit_core::{body, Body, BoxError, Error};

/// Default prefix of the profiling endpoints
pub const DEFAULT_PREFIX: &str = "/debug/pprof";

/// Path of the debug variables endpoint
pub const VARS_PATH: &str = "/debug/vars";

const DEFAULT_PROFILE_SECONDS: u64 = 30;
const DEFAULT_TRACE_SECONDS: u64 = 1;

/// Layer that answers the profiling endpoints and forwards everything else.
///
/// ```rust
/// use towerkit_extras::PprofLayer;
///
/// let layer = PprofLayer::new().prefix("/internal/pprof");
/// # let _ = layer;
/// ```
#[derive(Clone)]
pub struct PprofLayer {
    prefix: Arc<str>,
    profiler: Arc<dyn Profiler>,
}

impl Default for PprofLayer {
    fn default() -> Self {
        Self {
            prefix: Arc::from(DEFAULT_PREFIX),
            profiler: Arc::new(ProcessProfiler),
        }
    }
}

impl PprofLayer {
    /// Serve under `/debug/pprof` with the [`ProcessProfiler`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve under another prefix. `/debug/vars` does not move.
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Arc::from(prefix.trim_end_matches('/'));
        self
    }

    /// Use another profile backend
    pub fn profiler(mut self, profiler: impl Profiler + 'static) -> Self {
        self.profiler = Arc::new(profiler);
        self
    }
}

impl<S> Layer<S> for PprofLayer {
    type Service = Pprof<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Pprof {
            inner,
            prefix: self.prefix.clone(),
            profiler: self.profiler.clone(),
        }
    }
}

/// Middleware serving the profiling endpoints.
///
/// See [`PprofLayer`].
#[derive(Clone)]
pub struct Pprof<S> {
    inner: S,
    prefix: Arc<str>,
    profiler: Arc<dyn Profiler>,
}

/// What a profiling path resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Index,
    Cmdline,
    Profile,
    Symbol,
    Trace,
    Named(ProfileKind),
    Vars,
}

impl Endpoint {
    fn resolve(prefix: &str, path: &str) -> Option<Self> {
        if path == VARS_PATH {
            return Some(Endpoint::Vars);
        }
        let rest = path.strip_prefix(prefix)?;
        let name = match rest {
            "" | "/" => return Some(Endpoint::Index),
            _ => rest.strip_prefix('/')?,
        };
        match name {
            "cmdline" => Some(Endpoint::Cmdline),
            "profile" => Some(Endpoint::Profile),
            "symbol" => Some(Endpoint::Symbol),
            "trace" => Some(Endpoint::Trace),
            _ => ProfileKind::from_name(name).map(Endpoint::Named),
        }
    }

    fn allows(self, method: &Method) -> bool {
        match self {
            Endpoint::Symbol => method == Method::GET || method == Method::POST,
            _ => method == Method::GET,
        }
    }

    fn allow_header(self) -> &'static str {
        match self {
            Endpoint::Symbol => "GET, POST",
            _ => "GET",
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Pprof<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
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
        let Some(endpoint) = Endpoint::resolve(&self.prefix, req.uri().path()) else {
            let future = self.inner.call(req);
            return Box::pin(async move { Ok(future.await?.map(body::boxed)) });
        };

        if !endpoint.allows(req.method()) {
            let mut response = text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
            response.headers_mut().insert(
                header::ALLOW,
                HeaderValue::from_static(endpoint.allow_header()),
            );
            return Box::pin(async move { Ok(response) });
        }

        let profiler = self.profiler.clone();
        let prefix = self.prefix.clone();
        let seconds = query_param(req.uri().query(), "seconds");

        Box::pin(async move {
            let response = match endpoint {
                Endpoint::Index => html(index(&prefix)),
                Endpoint::Cmdline => text(
                    StatusCode::OK,
                    std::env::args().collect::<Vec<_>>().join("\0"),
                ),
                Endpoint::Symbol => text(StatusCode::OK, "num_symbols: 0\n"),
                Endpoint::Profile => {
                    let duration =
                        Duration::from_secs(seconds.unwrap_or(DEFAULT_PROFILE_SECONDS));
                    binary(profiler.cpu_profile(duration).await)
                }
                Endpoint::Trace => {
                    let duration = Duration::from_secs(seconds.unwrap_or(DEFAULT_TRACE_SECONDS));
                    binary(profiler.trace(duration).await)
                }
                Endpoint::Named(kind) => match profiler.lookup(kind).await {
                    Ok(profile) => text(StatusCode::OK, profile),
                    Err(err) => failure(err),
                },
                Endpoint::Vars => json(&vars::snapshot()),
            };
            Ok(response)
        })
    }
}

fn query_param(query: Option<&str>, name: &str) -> Option<u64> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| value.parse().ok())
}

fn index(prefix: &str) -> String {
    let mut out = format!(
        "<html>\n<head>\n<title>{prefix}/</title>\n</head>\n<body>\n{prefix}/<br>\n<br>\nTypes of profiles available:\n<table>\n",
        prefix = prefix
    );
    for kind in ProfileKind::ALL {
        let _ = writeln!(
            out,
            "<tr><td><a href=\"{prefix}/{name}?debug=1\">{name}</a></td><td>{desc}</td></tr>",
            prefix = prefix,
            name = kind.name(),
            desc = kind.description()
        );
    }
    let _ = writeln!(
        out,
        "<tr><td><a href=\"{prefix}/cmdline\">cmdline</a></td><td>The command line invocation of the current program</td></tr>",
        prefix = prefix
    );
    let _ = writeln!(
        out,
        "<tr><td><a href=\"{prefix}/profile\">profile</a></td><td>CPU profile</td></tr>",
        prefix = prefix
    );
    let _ = writeln!(
        out,
        "<tr><td><a href=\"{prefix}/trace?seconds=5\">trace</a></td><td>A trace of execution of the current program</td></tr>",
        prefix = prefix
    );
    out.push_str("</table>\n</body>\n</html>\n");
    out
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    bytes: impl Into<Bytes>,
) -> Response<Body> {
    let mut response = Response::new(body::full(bytes));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

fn text(status: StatusCode, content: impl Into<Bytes>) -> Response<Body> {
    respond(status, "text/plain; charset=utf-8", content)
}

fn html(content: String) -> Response<Body> {
    respond(StatusCode::OK, "text/html; charset=utf-8", content)
}

fn json(value: &serde_json::Map<String, serde_json::Value>) -> Response<Body> {
    match serde_json::to_vec_pretty(value) {
        Ok(bytes) => respond(StatusCode::OK, "application/json; charset=utf-8", bytes),
        Err(err) => failure(Error::Codec(err)),
    }
}

fn binary(result: towerkit_core::Result<Bytes>) -> Response<Body> {
    match result {
        Ok(bytes) => respond(StatusCode::OK, "application/octet-stream", bytes),
        Err(err) => failure(err),
    }
}

fn failure(err: Error) -> Response<Body> {
    let status = match err {
        Error::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::debug!(error = %err, "profile request failed");
    text(status, format!("{}\n", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    async fn app(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
        Ok(Response::new(body::full("app")))
    }

    async fn send(
        layer: PprofLayer,
        method: Method,
        uri: &str,
    ) -> (StatusCode, http::HeaderMap, String) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(body::empty())
            .unwrap();
        let res = layer.layer(service_fn(app)).oneshot(req).await.unwrap();
        let (parts, body) = res.into_parts();
        let bytes = body::collect(body).await.unwrap();
        (parts.status, parts.headers, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[test]
    fn resolves_known_paths_only() {
        let resolve = |path| Endpoint::resolve(DEFAULT_PREFIX, path);
        assert_eq!(resolve("/debug/pprof"), Some(Endpoint::Index));
        assert_eq!(resolve("/debug/pprof/"), Some(Endpoint::Index));
        assert_eq!(resolve("/debug/pprof/cmdline"), Some(Endpoint::Cmdline));
        assert_eq!(resolve("/debug/pprof/heap"), Some(Endpoint::Named(ProfileKind::Heap)));
        assert_eq!(
            resolve("/debug/pprof/threadcreate"),
            Some(Endpoint::Named(ProfileKind::ThreadCreate))
        );
        assert_eq!(resolve("/debug/vars"), Some(Endpoint::Vars));
        assert_eq!(resolve("/debug/pprofx"), None);
        assert_eq!(resolve("/debug/pprof/nope"), None);
        assert_eq!(resolve("/users"), None);
    }

    #[test]
    fn reads_numeric_query_params() {
        assert_eq!(query_param(Some("debug=1&seconds=5"), "seconds"), Some(5));
        assert_eq!(query_param(Some("seconds=abc"), "seconds"), None);
        assert_eq!(query_param(None, "seconds"), None);
    }

    #[tokio::test]
    async fn other_paths_reach_the_app() {
        let (status, _, body) = send(PprofLayer::new(), Method::GET, "/users").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "app");
    }

    #[tokio::test]
    async fn index_lists_profiles() {
        let (status, headers, body) = send(PprofLayer::new(), Method::GET, "/debug/pprof/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
        for kind in ProfileKind::ALL {
            assert!(body.contains(&format!("/debug/pprof/{}?debug=1", kind.name())));
        }
    }

    #[tokio::test]
    async fn cmdline_and_symbol() {
        let (_, _, cmdline) = send(PprofLayer::new(), Method::GET, "/debug/pprof/cmdline").await;
        assert_eq!(cmdline, std::env::args().collect::<Vec<_>>().join("\0"));

        let (status, _, symbol) =
            send(PprofLayer::new(), Method::POST, "/debug/pprof/symbol").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(symbol, "num_symbols: 0\n");
    }

    #[tokio::test]
    async fn wrong_method_gets_405_with_allow() {
        let (status, headers, _) = send(PprofLayer::new(), Method::POST, "/debug/pprof/heap").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers[header::ALLOW], "GET");

        let (status, headers, _) =
            send(PprofLayer::new(), Method::DELETE, "/debug/pprof/symbol").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers[header::ALLOW], "GET, POST");
    }

    #[tokio::test]
    async fn unsupported_profiles_answer_501() {
        let (status, _, body) =
            send(PprofLayer::new(), Method::GET, "/debug/pprof/profile?seconds=1").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body, "profile not supported: profile\n");

        let (status, _, _) = send(PprofLayer::new(), Method::GET, "/debug/pprof/mutex").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn vars_is_json_with_builtins() {
        let (status, headers, body) = send(PprofLayer::new(), Method::GET, "/debug/vars").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json; charset=utf-8");
        let vars: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(vars["cmdline"].is_array());
        assert!(vars["memstats"].is_object());
    }

    struct FixedProfiler;

    #[async_trait]
    impl Profiler for FixedProfiler {
        async fn lookup(&self, kind: ProfileKind) -> towerkit_core::Result<String> {
            Ok(format!("fixed {}\n", kind.name()))
        }

        async fn cpu_profile(&self, duration: Duration) -> towerkit_core::Result<Bytes> {
            Ok(Bytes::from(format!("cpu {}s", duration.as_secs())))
        }
    }

    #[tokio::test]
    async fn custom_prefix_and_profiler() {
        let layer = || PprofLayer::new().prefix("/internal/pprof/").profiler(FixedProfiler);

        let (status, _, body) = send(layer(), Method::GET, "/internal/pprof/block").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "fixed block\n");

        let (_, headers, body) = send(layer(), Method::GET, "/internal/pprof/profile").await;
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(body, "cpu 30s");

        let (_, _, body) = send(layer(), Method::GET, "/debug/pprof/heap").await;
        assert_eq!(body, "app");
    }
}
