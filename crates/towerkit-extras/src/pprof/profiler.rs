//! Profile data sources

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Write as _;
use std::time::Duration;
use towerkit_core::{Error, Result};

/// Named profiles served under the profiling prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    /// Memory allocations
    Allocs,
    /// Stack traces that led to blocking
    Block,
    /// Live tasks
    Goroutine,
    /// Live heap memory
    Heap,
    /// Holders of contended locks
    Mutex,
    /// OS thread creation
    ThreadCreate,
}

impl ProfileKind {
    /// Every named profile, in index order
    pub const ALL: [ProfileKind; 6] = [
        ProfileKind::Allocs,
        ProfileKind::Block,
        ProfileKind::Goroutine,
        ProfileKind::Heap,
        ProfileKind::Mutex,
        ProfileKind::ThreadCreate,
    ];

    /// Path segment of the profile
    pub fn name(self) -> &'static str {
        match self {
            ProfileKind::Allocs => "allocs",
            ProfileKind::Block => "block",
            ProfileKind::Goroutine => "goroutine",
            ProfileKind::Heap => "heap",
            ProfileKind::Mutex => "mutex",
            ProfileKind::ThreadCreate => "threadcreate",
        }
    }

    /// Profile for a path segment
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub(crate) fn description(self) -> &'static str {
        match self {
            ProfileKind::Allocs => "A sampling of all past memory allocations",
            ProfileKind::Block => "Stack traces that led to blocking on synchronization primitives",
            ProfileKind::Goroutine => "Stack traces of all current tasks",
            ProfileKind::Heap => "A sampling of memory allocations of live objects",
            ProfileKind::Mutex => "Stack traces of holders of contended mutexes",
            ProfileKind::ThreadCreate => "Stack traces that led to the creation of new OS threads",
        }
    }
}

/// Backend producing profile data for the profiling endpoints.
///
/// Every method may answer [`Error::Unsupported`], which the endpoints turn
/// into `501 Not Implemented`.
#[async_trait]
pub trait Profiler: Send + Sync {
    /// Text rendering of a named profile
    async fn lookup(&self, kind: ProfileKind) -> Result<String>;

    /// CPU profile sampled for `duration`
    async fn cpu_profile(&self, _duration: Duration) -> Result<Bytes> {
        Err(Error::Unsupported("profile"))
    }

    /// Execution trace recorded for `duration`
    async fn trace(&self, _duration: Duration) -> Result<Bytes> {
        Err(Error::Unsupported("trace"))
    }
}

/// Profiler reading what the process and the tokio runtime expose.
///
/// Memory and thread figures come from `/proc/self/status` and are only
/// available on Linux. Blocking, mutex, CPU and trace profiles need a
/// sampling profiler and are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessProfiler;

#[async_trait]
impl Profiler for ProcessProfiler {
    async fn lookup(&self, kind: ProfileKind) -> Result<String> {
        match kind {
            ProfileKind::Goroutine => task_profile(),
            ProfileKind::ThreadCreate => {
                let threads = proc_status()?
                    .into_iter()
                    .find(|(key, _)| key == "Threads")
                    .map(|(_, value)| value)
                    .unwrap_or_default();
                Ok(format!("threadcreate profile: total {}\n", threads))
            }
            ProfileKind::Heap | ProfileKind::Allocs => {
                let mut out = format!("{} profile:\n", kind.name());
                for (key, value) in memory_status()? {
                    let _ = writeln!(out, "# {} = {}", key, value);
                }
                Ok(out)
            }
            ProfileKind::Block => Err(Error::Unsupported("block")),
            ProfileKind::Mutex => Err(Error::Unsupported("mutex")),
        }
    }
}

fn task_profile() -> Result<String> {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|_| Error::Unsupported("goroutine"))?;
    let metrics = handle.metrics();
    Ok(format!(
        "goroutine profile: total {}\n# workers = {}\n",
        metrics.num_alive_tasks(),
        metrics.num_workers()
    ))
}

/// Memory lines of `/proc/self/status`
const MEMORY_KEYS: [&str; 5] = ["VmPeak", "VmSize", "VmHWM", "VmRSS", "VmData"];

fn memory_status() -> Result<Vec<(String, String)>> {
    Ok(proc_status()?
        .into_iter()
        .filter(|(key, _)| MEMORY_KEYS.contains(&key.as_str()))
        .collect())
}

/// Process memory counters in bytes, empty when unavailable
pub(crate) fn memory_stats() -> serde_json::Map<String, serde_json::Value> {
    memory_status()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| {
            let kib = value.trim_end_matches("kB").trim().parse::<u64>().ok()?;
            Some((key, serde_json::Value::from(kib * 1024)))
        })
        .collect()
}

fn proc_status() -> Result<Vec<(String, String)>> {
    let status = std::fs::read_to_string("/proc/self/status").map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::Unsupported("process status")
        } else {
            Error::Io(err)
        }
    })?;
    Ok(parse_status(&status))
}

fn parse_status(status: &str) -> Vec<(String, String)> {
    status
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}
