/// Emit a `tracing` event at a level only known at runtime.
///
/// `tracing` macros need a constant level, so this dispatches to the matching
/// macro. Everything after the level is forwarded unchanged. The expansion
/// goes through this crate, so callers need no `tracing` dependency of their
/// own.
///
/// ```rust
/// use towerkit_core::{event_at, Level};
///
/// let status = 404u16;
/// let level = if status >= 500 { Level::ERROR } else { Level::WARN };
/// event_at!(level, status, "request completed");
/// ```
#[macro_export]
macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {{
        let level: $crate::__tracing::Level = $level;
        if level == $crate::__tracing::Level::ERROR {
            $crate::__tracing::error!($($arg)+)
        } else if level == $crate::__tracing::Level::WARN {
            $crate::__tracing::warn!($($arg)+)
        } else if level == $crate::__tracing::Level::INFO {
            $crate::__tracing::info!($($arg)+)
        } else if level == $crate::__tracing::Level::DEBUG {
            $crate::__tracing::debug!($($arg)+)
        } else {
            $crate::__tracing::trace!($($arg)+)
        }
    }};
}
