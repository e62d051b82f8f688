//! Body type shared by the middleware that rewrite bodies.
//!
//! Middleware that only forward requests keep the caller's body type. The
//! ones that buffer or replay a body (logging, caching, profiling) hand out a
//! [`Body`], a boxed `http_body::Body` over [`Bytes`].

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

/// Boxed error used for body and store failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased HTTP body
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// Box any `http_body::Body` over [`Bytes`] into a [`Body`]
pub fn boxed<B>(body: B) -> Body
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// A body holding the given bytes
pub fn full(bytes: impl Into<Bytes>) -> Body {
    boxed(Full::new(bytes.into()))
}

/// An empty body
pub fn empty() -> Body {
    boxed(Empty::<Bytes>::new())
}

/// Read a body to the end
pub async fn collect<B>(body: B) -> Result<Bytes, BoxError>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    body.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(Into::into)
}
