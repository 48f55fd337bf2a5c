//! Shared configuration for the noderpc dispatch engine and daemon.
//!
//! Configuration is layered by `ortho_config`: compiled defaults, an optional
//! TOML file, `NODERPC_*` environment variables, then command-line flags. The
//! resolved [`Config`] sizes the async job pool, bounds its backlog, sets the
//! shutdown grace period, and drives telemetry.

mod defaults;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_ASYNC_BACKLOG, DEFAULT_ASYNC_WORKERS, DEFAULT_LOG_FILTER, DEFAULT_SHUTDOWN_GRACE_MS,
    default_async_backlog, default_async_workers, default_log_filter, default_log_filter_string,
    default_log_format, default_shutdown_grace_ms,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for the RPC dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "NODERPC")]
pub struct Config {
    /// Tracing filter expression, for example `info` or `noderpc=debug`.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format of the structured log stream.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Number of worker threads executing async jobs.
    #[serde(default = "default_async_workers")]
    pub async_workers: usize,
    /// Maximum number of queued (not yet running) async jobs.
    #[serde(default = "default_async_backlog")]
    pub async_backlog: usize,
    /// Milliseconds granted to running jobs when the server stops.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            async_workers: DEFAULT_ASYNC_WORKERS,
            async_backlog: DEFAULT_ASYNC_BACKLOG,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl Config {
    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Configured log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Size of the async worker pool, never below one.
    #[must_use]
    pub fn async_workers(&self) -> usize {
        self.async_workers.max(1)
    }

    /// Bound on queued async jobs.
    #[must_use]
    pub fn async_backlog(&self) -> usize {
        self.async_backlog
    }

    /// Grace period granted to in-flight jobs on shutdown.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
