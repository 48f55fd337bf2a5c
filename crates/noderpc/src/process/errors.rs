//! Defines the unified error surface for daemon launch and supervision.

use std::io;

use thiserror::Error;

use crate::bootstrap::BootstrapError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the daemon failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// A supervision thread could not be spawned.
    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        /// Name of the thread.
        name: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Reading requests or writing replies failed.
    #[error("stdio transport failed: {source}")]
    Stdio {
        /// Underlying IO error.
        #[from]
        source: io::Error,
    },
    /// A supervision thread panicked.
    #[error("thread '{name}' panicked")]
    Panicked {
        /// Name of the thread.
        name: &'static str,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
