//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use noderpc_config::Config;

use crate::health::HealthReporter;
use crate::jobs::ShutdownReport;
use crate::node::NodeStatus;
use crate::server::{RpcServer, ServerConfig};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Result of a successful bootstrap invocation.
///
/// The daemon owns the configured [`RpcServer`] and reports each lifecycle
/// transition to its [`HealthReporter`].
pub struct Daemon {
    config: Config,
    server: Arc<RpcServer>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    fn new(
        config: Config,
        server: Arc<RpcServer>,
        telemetry: TelemetryHandle,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            config,
            server,
            telemetry,
            reporter,
        }
    }

    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The dispatch engine built from the configuration.
    #[must_use]
    pub fn server(&self) -> &Arc<RpcServer> {
        &self.server
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Publishes a new warmup status.
    pub fn set_warmup_status(&self, status: &str) {
        self.server.warmup().set_status(status);
        self.reporter.warmup_status(status);
    }

    /// Starts the server and lifts the warmup gate.
    pub fn start(&self) {
        self.server.start();
        self.server.warmup().mark_finished();
        self.reporter
            .server_ready(self.server.table().commands().len());
    }

    /// Interrupts and stops the server, reporting how the job queue drained.
    pub fn shutdown(&self) -> ShutdownReport {
        self.server.interrupt();
        let report = self.server.stop();
        self.reporter.server_stopped(&report);
        report
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// The returned server is still warming up and has an open command table, so
/// callers register their commands before calling [`Daemon::start`].
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    node: Arc<dyn NodeStatus>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let server = Arc::new(RpcServer::new(ServerConfig::from(&config), node));
    reporter.bootstrap_succeeded(&config);

    Ok(Daemon::new(config, server, telemetry, reporter))
}
