//! # towerkit-core
//!
//! Shared building blocks for the towerkit middleware collection.
//!
//! The middleware in `towerkit-extras` plugs into any `tower` based HTTP stack
//! (hyper, axum, ...). This crate holds what they have in common:
//!
//! - [`Body`] and helpers to box, buffer and build bodies
//! - request context types the host fills in ([`MatchedRoute`], [`ClientAddr`])
//!   and the [`RequestErrors`] list handlers record errors into
//! - the crate-wide [`Error`] type
//! - [`event_at!`] to emit a `tracing` event at a level chosen at runtime
//! - [`telemetry::init`] to install a default subscriber

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod body;
pub mod context;
mod error;
mod level;
pub mod telemetry;

pub use body::{Body, BoxError};
pub use context::{client_ip, ClientAddr, MatchedRoute, RequestErrors};
pub use error::{Error, Result};
pub use tracing::Level;

#[doc(hidden)]
pub use tracing as __tracing;
