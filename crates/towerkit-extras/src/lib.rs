//! # towerkit-extras
//!
//! Middleware for `tower` based HTTP services, each opt-in via a Cargo
//! feature flag:
//!
//! - `logging` - one structured `tracing` record per request, with optional
//!   request/response body capture
//! - `recovery` - turns handler panics into logged 500 responses
//! - `cache` - replays stored responses for a computed key within a TTL
//! - `nocache` - forces cache-disabling response headers
//! - `pprof` - serves the `/debug/pprof` and `/debug/vars` endpoints
//! - `diesel` - a diesel instrumentation that logs queries, with slow-query
//!   detection
//!
//! ## Example
//!
//! ```rust,no_run
//! use towerkit_extras::{LoggerConfig, LoggerLayer, NoCacheLayer, RecoveryLayer};
//! use tower::ServiceBuilder;
//!
//! let stack = ServiceBuilder::new()
//!     .layer(LoggerLayer::new(LoggerConfig::default().enable_body(true)))
//!     .layer(RecoveryLayer::new().stack(true))
//!     .layer(NoCacheLayer::new());
//! # let _ = stack;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Request/response logging middleware
#[cfg(feature = "logging")]
pub mod logging;

// Panic recovery middleware
#[cfg(feature = "recovery")]
pub mod recovery;

// Response caching
#[cfg(feature = "cache")]
pub mod cache;

// Cache-disabling headers
#[cfg(feature = "nocache")]
pub mod nocache;

// Profiling endpoints
#[cfg(feature = "pprof")]
pub mod pprof;

// Diesel query logging
#[cfg(feature = "diesel")]
pub mod orm;

pub mod field;

#[cfg(test)]
mod test_support;

pub use field::{CustomField, Field, RequestInfo};

#[cfg(feature = "logging")]
pub use logging::{BodyCapture, Completed, LoggerConfig, LoggerLayer};

#[cfg(feature = "recovery")]
pub use recovery::{RecoveryConfig, RecoveryLayer};

#[cfg(feature = "cache")]
pub use cache::{
    generate_key_with_prefix, CacheConfig, CacheLayer, CachedResponse, MemoryStore, Store,
    PAGE_CACHE_PREFIX,
};

#[cfg(feature = "nocache")]
pub use nocache::NoCacheLayer;

#[cfg(feature = "pprof")]
pub use pprof::{PprofLayer, ProcessProfiler, ProfileKind, Profiler};

#[cfg(feature = "diesel")]
pub use orm::{LogLevel, QueryLogger, QueryLoggerConfig};

pub use towerkit_core::{Body, BoxError, Error, Result};
