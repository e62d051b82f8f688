//! Structured request logging.
//!
//! [`LoggerLayer`] emits one `tracing` event per request once the response
//! is ready. The record carries `status`, `method`, `path`, `route`,
//! `query`, `ip`, `user_agent` and `latency`, plus the captured bodies when
//! [`BodyCapture`] is on.
//!
//! The level defaults to [`default_level`]. Errors recorded on the response
//! through [`towerkit_core::RequestErrors`] always log at `ERROR`.

mod config;
mod curl;
mod layer;

pub use config::{
    default_level, BodyCapture, Completed, CompletedPredicate, LevelSelector, LoggerConfig,
    RequestPredicate,
};
pub use layer::{Logger, LoggerLayer};
