//! Convert handler panics into logged responses.
//!
//! Panics raised while the inner service builds its future, or while the
//! future is polled, are caught at this boundary. A panic caused by the
//! client going away (broken pipe, connection reset) is logged and answered
//! with an empty response carrying `Connection: close`. Any other panic is
//! logged with a dump of the request head and answered with an empty `500`.
//!
//! ```rust
//! use towerkit_extras::{field, RecoveryLayer};
//!
//! let layer = RecoveryLayer::new()
//!     .stack(true)
//!     .custom_fields([field::string("service", "checkout")]);
//! # let _ = layer;
//! ```

use crate::field::{collect_fields, CustomField, RequestInfo};
use futures_util::future::{BoxFuture, FutureExt};
use http::{header, HeaderValue, Request, Response, StatusCode};
use std::any::Any;
use std::backtrace::Backtrace;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use towerkit_core::{BoxError, Error, RequestErrors};

/// Panic recovery configuration
#[derive(Clone, Default)]
pub struct RecoveryConfig {
    /// Attach a backtrace to the panic record. Default: off.
    pub stack: bool,
    /// Extra fields for the panic record. Default: none.
    pub custom_fields: Vec<CustomField>,
}

/// Layer that catches panics from the inner service.
#[derive(Clone, Default)]
pub struct RecoveryLayer {
    config: Arc<RecoveryConfig>,
}

impl RecoveryLayer {
    /// Create a recovery layer with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recovery layer from a configuration
    pub fn with_config(config: RecoveryConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Attach a backtrace to panic records
    pub fn stack(mut self, enabled: bool) -> Self {
        Arc::make_mut(&mut self.config).stack = enabled;
        self
    }

    /// Set the extra fields for panic records
    pub fn custom_fields(mut self, fields: impl IntoIterator<Item = CustomField>) -> Self {
        Arc::make_mut(&mut self.config).custom_fields = fields.into_iter().collect();
        self
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = Recovery<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Recovery {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Middleware that catches panics from the inner service.
///
/// See [`RecoveryLayer`].
#[derive(Clone)]
pub struct Recovery<S> {
    inner: S,
    config: Arc<RecoveryConfig>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Recovery<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + 'static,
    S::Future: Send + 'static,
    ReqBody: 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let info = RequestInfo::from_request(&req);
        let config = self.config.clone();

        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| self.inner.call(req))) {
            Ok(future) => future,
            Err(payload) => {
                let response = recover(&config, &info, payload);
                return Box::pin(async move { Ok(response) });
            }
        };

        Box::pin(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Ok(recover(&config, &info, payload)),
            }
        })
    }
}

fn recover<B: Default>(
    config: &RecoveryConfig,
    info: &RequestInfo,
    payload: Box<dyn Any + Send>,
) -> Response<B> {
    let message = panic_message(payload.as_ref());
    let request = info.dump();

    if is_broken_pipe(payload.as_ref()) {
        tracing::error!(error = %message, request = %request, "{}", info.path());

        // nothing can be written to a dead connection, leave the status alone
        let mut response = Response::new(B::default());
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        RequestErrors::record(&mut response, Error::BrokenPipe(message));
        return response;
    }

    let fields = collect_fields(&config.custom_fields, info);
    let stack = config
        .stack
        .then(|| Backtrace::force_capture().to_string());

    tracing::error!(
        error = %message,
        request = %request,
        fields = fields.as_ref().map(tracing::field::display),
        stack = stack.as_deref(),
        "recovery from panic"
    );

    let mut response = Response::new(B::default());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    RequestErrors::record(&mut response, Error::Panic(message));
    response
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(err) = payload.downcast_ref::<io::Error>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<BoxError>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<Error>() {
        err.to_string()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Whether the panic comes from a connection the client already closed
fn is_broken_pipe(payload: &(dyn Any + Send)) -> bool {
    if let Some(err) = payload.downcast_ref::<io::Error>() {
        return chain_is_broken(err);
    }
    if let Some(err) = payload.downcast_ref::<BoxError>() {
        return chain_is_broken(err.as_ref());
    }
    if let Some(err) = payload.downcast_ref::<Error>() {
        return matches!(err, Error::BrokenPipe(_)) || chain_is_broken(err);
    }
    message_is_broken(&panic_message(payload))
}

fn chain_is_broken(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
            ) {
                return true;
            }
        }
        if message_is_broken(&err.to_string()) {
            return true;
        }
        current = err.source();
    }
    false
}

fn message_is_broken(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("broken pipe") || message.contains("connection reset by peer")
}
