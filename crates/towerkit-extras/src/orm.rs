//! Diesel query logging.
//!
//! [`QueryLogger`] implements diesel's [`Instrumentation`] and turns
//! connection events into `tracing` records. Failed queries log at `ERROR`,
//! queries slower than the threshold at `WARN`, and every query at `INFO`
//! when the level is [`LogLevel::Info`].
//!
//! ```rust,no_run
//! use towerkit_extras::orm::{install_default, LogLevel, QueryLoggerConfig};
//!
//! install_default(QueryLoggerConfig::default().log_mode(LogLevel::Info))
//!     .expect("instrumentation already set");
//! ```
//!
//! Or per connection:
//!
//! ```rust,ignore
//! conn.set_instrumentation(QueryLogger::default());
//! ```

use diesel::connection::{Instrumentation, InstrumentationEvent};
use diesel::result::{Error as DieselError, QueryResult};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::Level;

/// Verbosity of the query logger, ordered `Silent < Error < Warn < Info`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Log nothing
    Silent,
    /// Failed queries only
    Error,
    /// Failed and slow queries
    #[default]
    Warn,
    /// Every query
    Info,
}

/// Query logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLoggerConfig {
    /// Queries taking longer are logged as slow. Zero disables it.
    /// Default: 200ms.
    pub slow_threshold: Duration,
    /// Do not treat `NotFound` as a failure. Default: false.
    pub ignore_record_not_found: bool,
    /// Verbosity. Default: [`LogLevel::Warn`].
    pub log_level: LogLevel,
}

impl Default for QueryLoggerConfig {
    fn default() -> Self {
        Self {
            slow_threshold: Duration::from_millis(200),
            ignore_record_not_found: false,
            log_level: LogLevel::Warn,
        }
    }
}

impl QueryLoggerConfig {
    /// Copy with another level
    pub fn log_mode(&self, level: LogLevel) -> Self {
        Self {
            log_level: level,
            ..self.clone()
        }
    }

    /// Set the slow query threshold
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Ignore `NotFound` errors
    pub fn ignore_record_not_found(mut self, ignore: bool) -> Self {
        self.ignore_record_not_found = ignore;
        self
    }
}

/// Diesel instrumentation logging queries through `tracing`
#[derive(Debug, Default)]
pub struct QueryLogger {
    config: QueryLoggerConfig,
    query_start: Option<Instant>,
}

impl QueryLogger {
    /// Create a logger
    pub fn new(config: QueryLoggerConfig) -> Self {
        Self {
            config,
            query_start: None,
        }
    }

    /// Copy with another level
    pub fn log_mode(&self, level: LogLevel) -> Self {
        Self::new(self.config.log_mode(level))
    }

    /// Current configuration
    pub fn config(&self) -> &QueryLoggerConfig {
        &self.config
    }

    /// Informational message, emitted at `DEBUG`
    pub fn info(&self, msg: impl Display) {
        if self.config.log_level >= LogLevel::Info {
            tracing::debug!("{}", msg);
        }
    }

    /// Warning message
    pub fn warn(&self, msg: impl Display) {
        if self.config.log_level >= LogLevel::Warn {
            tracing::warn!("{}", msg);
        }
    }

    /// Error message
    pub fn error(&self, msg: impl Display) {
        if self.config.log_level >= LogLevel::Error {
            tracing::error!("{}", msg);
        }
    }

    /// Log one executed statement.
    ///
    /// `f` yields the statement text and the affected rows, when known. It is
    /// only called when a record is emitted.
    pub fn trace<F>(&self, begin: Instant, f: F, err: Option<&DieselError>)
    where
        F: FnOnce() -> (String, Option<u64>),
    {
        let level = self.config.log_level;
        if level <= LogLevel::Silent {
            return;
        }

        let elapsed = begin.elapsed();
        let threshold = self.config.slow_threshold;
        let failed = err.filter(|err| {
            !(self.config.ignore_record_not_found && matches!(err, DieselError::NotFound))
        });

        if let (Some(err), true) = (failed, level >= LogLevel::Error) {
            if tracing::enabled!(Level::ERROR) {
                let (sql, rows) = f();
                tracing::error!(
                    error = %err,
                    latency = ?elapsed,
                    rows = %rows_field(rows),
                    sql = %sql,
                    "trace"
                );
            }
        } else if elapsed > threshold && !threshold.is_zero() && level >= LogLevel::Warn {
            if tracing::enabled!(Level::WARN) {
                let (sql, rows) = f();
                let slow = format!("SLOW SQL >= {:?}", threshold);
                tracing::warn!(
                    error = err.map(tracing::field::display),
                    slow = %slow,
                    latency = ?elapsed,
                    rows = %rows_field(rows),
                    sql = %sql,
                    "trace"
                );
            }
        } else if level == LogLevel::Info && tracing::enabled!(Level::INFO) {
            let (sql, rows) = f();
            tracing::info!(
                error = err.map(tracing::field::display),
                latency = ?elapsed,
                rows = %rows_field(rows),
                sql = %sql,
                "trace"
            );
        }
    }
}

fn rows_field(rows: Option<u64>) -> String {
    rows.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string())
}

impl Instrumentation for QueryLogger {
    fn on_connection_event(&mut self, event: InstrumentationEvent<'_>) {
        match event {
            InstrumentationEvent::StartQuery { .. } => {
                self.query_start = Some(Instant::now());
            }
            InstrumentationEvent::FinishQuery { query, error, .. } => {
                let begin = self.query_start.take().unwrap_or_else(Instant::now);
                self.trace(begin, || (query.to_string(), None), error);
            }
            // the url may carry credentials and is left out
            InstrumentationEvent::FinishEstablishConnection {
                error: Some(err), ..
            } => {
                self.error(format_args!("failed to establish connection: {}", err));
            }
            InstrumentationEvent::BeginTransaction { depth, .. } => {
                self.info(format_args!("begin transaction (depth {})", depth));
            }
            InstrumentationEvent::CommitTransaction { depth, .. } => {
                self.info(format_args!("commit transaction (depth {})", depth));
            }
            InstrumentationEvent::RollbackTransaction { depth, .. } => {
                self.info(format_args!("rollback transaction (depth {})", depth));
            }
            _ => {}
        }
    }
}

static DEFAULT_CONFIG: RwLock<Option<QueryLoggerConfig>> = RwLock::new(None);

fn default_instrumentation() -> Option<Box<dyn Instrumentation>> {
    let config = DEFAULT_CONFIG
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or_default();
    Some(Box::new(QueryLogger::new(config)))
}

/// Attach a [`QueryLogger`] with `config` to every connection established
/// from now on in this process.
pub fn install_default(config: QueryLoggerConfig) -> QueryResult<()> {
    *DEFAULT_CONFIG
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Some(config);
    diesel::connection::set_default_instrumentation(default_instrumentation)
}
