//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use noderpc_config::Config;

use crate::bootstrap::BootstrapError;
use crate::jobs::ShutdownReport;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked whenever the warmup status text changes.
    fn warmup_status(&self, status: &str);

    /// Invoked once the server accepts commands.
    fn server_ready(&self, commands: usize);

    /// Invoked after the server has stopped.
    fn server_stopped(&self, report: &ShutdownReport);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn warmup_status(&self, status: &str) {
        (**self).warmup_status(status);
    }

    fn server_ready(&self, commands: usize) {
        (**self).server_ready(commands);
    }

    fn server_stopped(&self, report: &ShutdownReport) {
        (**self).server_stopped(report);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            async_workers = config.async_workers(),
            async_backlog = config.async_backlog(),
            shutdown_grace_ms = config.shutdown_grace_ms,
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn warmup_status(&self, status: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "warmup_status",
            status,
            "warmup status changed"
        );
    }

    fn server_ready(&self, commands: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_ready",
            commands,
            "rpc server ready"
        );
    }

    fn server_stopped(&self, report: &ShutdownReport) {
        if report.completed_in_grace() {
            tracing::info!(
                target: HEALTH_TARGET,
                event = "server_stopped",
                cancelled_queued = report.cancelled_queued,
                "rpc server stopped"
            );
        } else {
            tracing::warn!(
                target: HEALTH_TARGET,
                event = "server_stopped",
                cancelled_queued = report.cancelled_queued,
                abandoned = report.abandoned,
                "rpc server stopped with jobs still running"
            );
        }
    }
}
