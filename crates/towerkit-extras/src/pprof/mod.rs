//! Profiling endpoints.
//!
//! [`PprofLayer`] answers these paths and forwards every other request:
//!
//! | Path | Methods | Content |
//! |------|---------|---------|
//! | `{prefix}/` | GET | HTML index |
//! | `{prefix}/cmdline` | GET | process arguments, NUL separated |
//! | `{prefix}/profile?seconds=N` | GET | CPU profile |
//! | `{prefix}/symbol` | GET, POST | symbol lookup |
//! | `{prefix}/trace?seconds=N` | GET | execution trace |
//! | `{prefix}/{allocs,block,goroutine,heap,mutex,threadcreate}` | GET | named profiles |
//! | `/debug/vars` | GET | JSON of the [`vars`] registry |
//!
//! The prefix defaults to `/debug/pprof`. Profile data comes from a
//! [`Profiler`]; profiles it cannot produce answer `501`.

mod layer;
mod profiler;
pub mod vars;

pub use layer::{Pprof, PprofLayer, DEFAULT_PREFIX, VARS_PATH};
pub use profiler::{ProcessProfiler, ProfileKind, Profiler};
