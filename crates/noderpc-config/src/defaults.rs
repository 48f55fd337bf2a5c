/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default number of async job workers.
pub const DEFAULT_ASYNC_WORKERS: usize = 4;

/// Default bound on queued async jobs.
pub const DEFAULT_ASYNC_BACKLOG: usize = 1024;

/// Default shutdown grace period, in milliseconds.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Default log filter expression used by the daemon.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default async worker count (serde hook).
#[must_use]
pub fn default_async_workers() -> usize {
    DEFAULT_ASYNC_WORKERS
}

/// Default async backlog bound (serde hook).
#[must_use]
pub fn default_async_backlog() -> usize {
    DEFAULT_ASYNC_BACKLOG
}

/// Default shutdown grace period in milliseconds (serde hook).
#[must_use]
pub fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}
