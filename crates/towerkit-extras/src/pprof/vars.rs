//! Process-wide debug variables served at `/debug/vars`.
//!
//! `cmdline` and `memstats` are always present. Anything else is published
//! once under a unique name:
//!
//! ```rust
//! use towerkit_extras::pprof::vars;
//!
//! let requests = vars::new_counter("doc_requests").unwrap();
//! requests.add(1);
//! vars::publish("doc_build", || serde_json::json!({ "version": "1.2.3" })).unwrap();
//! ```

use super::profiler::memory_stats;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use towerkit_core::{Error, Result};

/// Produces the current value of a published variable
pub type VarFn = Arc<dyn Fn() -> Value + Send + Sync>;

const RESERVED: [&str; 2] = ["cmdline", "memstats"];

fn registry() -> &'static RwLock<BTreeMap<String, VarFn>> {
    static VARS: OnceLock<RwLock<BTreeMap<String, VarFn>>> = OnceLock::new();
    VARS.get_or_init(Default::default)
}

/// Publish a variable. Names are unique for the life of the process.
pub fn publish<F>(name: impl Into<String>, f: F) -> Result<()>
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    let name = name.into();
    if RESERVED.contains(&name.as_str()) {
        return Err(Error::DuplicateVar(name));
    }

    let mut vars = registry().write().unwrap_or_else(PoisonError::into_inner);
    if vars.contains_key(&name) {
        return Err(Error::DuplicateVar(name));
    }
    vars.insert(name, Arc::new(f));
    Ok(())
}

/// Current value of a variable
pub fn get(name: &str) -> Option<Value> {
    match name {
        "cmdline" => Some(cmdline()),
        "memstats" => Some(Value::Object(memory_stats())),
        _ => {
            let f = registry()
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
                .cloned()?;
            Some(f())
        }
    }
}

/// Every variable, sorted by name
pub fn snapshot() -> Map<String, Value> {
    let published: Vec<(String, VarFn)> = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(name, f)| (name.clone(), f.clone()))
        .collect();

    // evaluate outside the lock, a variable may read the registry itself
    let mut out = Map::new();
    out.insert("cmdline".to_string(), cmdline());
    out.insert("memstats".to_string(), Value::Object(memory_stats()));
    for (name, f) in published {
        out.insert(name, f());
    }
    out
}

fn cmdline() -> Value {
    Value::from(std::env::args().collect::<Vec<_>>())
}

/// Published integer counter
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicI64>);

impl Counter {
    /// Add `delta`
    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    /// Overwrite the value
    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    /// Current value
    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Publish a counter starting at zero
pub fn new_counter(name: impl Into<String>) -> Result<Counter> {
    let counter = Counter::default();
    let published = counter.clone();
    publish(name, move || Value::from(published.value()))?;
    Ok(counter)
}
