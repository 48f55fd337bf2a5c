//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::sync::Mutex;

use noderpc_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::jobs::ShutdownReport;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// Warmup status changed.
    WarmupStatus(String),
    /// The server began accepting commands.
    ServerReady(usize),
    /// The server stopped.
    ServerStopped(ShutdownReport),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn warmup_status(&self, status: &str) {
        self.record(HealthEvent::WarmupStatus(status.to_owned()));
    }

    fn server_ready(&self, commands: usize) {
        self.record(HealthEvent::ServerReady(commands));
    }

    fn server_stopped(&self, report: &ShutdownReport) {
        self.record(HealthEvent::ServerStopped(*report));
    }
}
