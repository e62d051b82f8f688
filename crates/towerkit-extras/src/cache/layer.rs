//! Response cache middleware layer

use super::key::request_uri_key;
use super::store::Store;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::{HeaderName, HeaderValue};
use http::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use towerkit_core::{body, Body, BoxError, Error, RequestErrors, Result};

/// Computes the cache key of a request, `None` to bypass the cache
pub type KeyFn = Arc<dyn Fn(&http::request::Parts) -> Option<String> + Send + Sync>;

/// Cache configuration
#[derive(Clone)]
pub struct CacheConfig {
    /// Lifetime of stored responses
    pub ttl: Duration,
    /// Key function. Default: [`request_uri_key`](super::request_uri_key).
    pub key_fn: KeyFn,
}

impl CacheConfig {
    /// Configuration with the default key function
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            key_fn: Arc::new(request_uri_key),
        }
    }
}

/// A stored response: status, headers in order, and body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Status code
    pub status: u16,
    /// Header names and raw values, in response order
    pub headers: Vec<(String, Vec<u8>)>,
    /// Body bytes
    pub body: Vec<u8>,
}

impl CachedResponse {
    /// Capture a response head and its buffered body
    pub fn from_parts(parts: &http::response::Parts, body: &[u8]) -> Self {
        Self {
            status: parts.status.as_u16(),
            headers: parts
                .headers
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
                .collect(),
            body: body.to_vec(),
        }
    }

    /// Encode for storage
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode stored bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Rebuild the response
    pub fn into_response(self) -> Result<Response<Body>> {
        let mut response = Response::new(body::full(self.body));
        *response.status_mut() = StatusCode::from_u16(self.status).map_err(Error::store)?;
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(Error::store)?;
            let value = HeaderValue::from_bytes(&value).map_err(Error::store)?;
            headers.append(name, value);
        }
        Ok(response)
    }
}

/// Layer that replays stored responses.
///
/// See the [module docs](super) for an example.
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn Store>,
    config: CacheConfig,
}

impl CacheLayer {
    /// Cache into `store` for `ttl`, keyed by the default key function
    pub fn new(store: impl Store + 'static, ttl: Duration) -> Self {
        Self {
            store: Arc::new(store),
            config: CacheConfig::new(ttl),
        }
    }

    /// Set the TTL
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Set the key function
    pub fn key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&http::request::Parts) -> Option<String> + Send + Sync + 'static,
    {
        self.config.key_fn = Arc::new(f);
        self
    }
}

impl<S> Layer<S> for CacheLayer {
    type Service = Cache<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Cache {
            inner,
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

/// Middleware that replays stored responses.
///
/// See [`CacheLayer`].
#[derive(Clone)]
pub struct Cache<S> {
    inner: S,
    store: Arc<dyn Store>,
    config: CacheConfig,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Cache<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
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
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let store = self.store.clone();
        let ttl = self.config.ttl;

        let (parts, req_body) = req.into_parts();
        let key = (self.config.key_fn)(&parts);
        let req = Request::from_parts(parts, req_body);

        let Some(key) = key else {
            return Box::pin(async move { Ok(inner.call(req).await?.map(body::boxed)) });
        };

        Box::pin(async move {
            if let Some(response) = lookup(store.as_ref(), &key).await {
                tracing::debug!(key = %key, "cache hit");
                return Ok(response);
            }

            let response = inner.call(req).await?;
            if !response.status().is_success() {
                return Ok(response.map(body::boxed));
            }

            let (parts, res_body) = response.into_parts();
            let bytes = match body::collect(res_body).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "failed to buffer response for cache");
                    let mut response =
                        Response::new(body::full("Error buffering response for cache"));
                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    RequestErrors::record(&mut response, Error::BufferBody(err));
                    return Ok(response);
                }
            };

            let stored = CachedResponse::from_parts(&parts, &bytes).encode();
            match stored {
                Ok(encoded) => {
                    if let Err(err) = store.set(&key, encoded, ttl).await {
                        tracing::warn!(key = %key, error = %err, "cache store write failed");
                    }
                }
                Err(err) => tracing::warn!(key = %key, error = %err, "cache encode failed"),
            }

            Ok(Response::from_parts(parts, body::full(bytes)))
        })
    }
}

/// Replay the response stored under `key`. Failures count as a miss.
async fn lookup(store: &dyn Store, key: &str) -> Option<Response<Body>> {
    let bytes = match store.get(key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(err) => {
            tracing::warn!(key = %key, error = %err, "cache store read failed");
            return None;
        }
    };

    match CachedResponse::decode(&bytes).and_then(CachedResponse::into_response) {
        Ok(response) => Some(response),
        Err(err) => {
            tracing::warn!(key = %key, error = %err, "discarding undecodable cache entry");
            None
        }
    }
}
