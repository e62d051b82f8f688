//! Error types for towerkit

use crate::body::BoxError;
use thiserror::Error;

/// Result type alias for towerkit operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the towerkit middleware
#[derive(Debug, Error)]
pub enum Error {
    /// The request body could not be read
    #[error("failed to read request body: {0}")]
    ReadBody(#[source] BoxError),

    /// The response body could not be buffered
    #[error("failed to buffer response body: {0}")]
    BufferBody(#[source] BoxError),

    /// A cache store operation failed
    #[error("cache store error: {0}")]
    Store(#[source] BoxError),

    /// A cached response could not be encoded or decoded
    #[error("cached response codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The client connection went away while the handler was running
    #[error("broken connection: {0}")]
    BrokenPipe(String),

    /// The handler panicked
    #[error("handler panicked: {0}")]
    Panic(String),

    /// A debug variable with this name is already published
    #[error("reuse of exported var name: {0}")]
    DuplicateVar(String),

    /// The requested profile is not available on this platform or backend
    #[error("profile not supported: {0}")]
    Unsupported(&'static str),

    /// I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap any error raised by a cache store
    pub fn store(err: impl Into<BoxError>) -> Self {
        Self::Store(err.into())
    }
}
