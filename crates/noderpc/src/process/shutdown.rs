use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{debug, info};

use super::PROCESS_TARGET;

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that waits for termination signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl SystemShutdownSignal {
    /// Builds a signal listener.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        if let Some(signal) = signals.forever().next() {
            info!(target: PROCESS_TARGET, signal, "shutdown signal received");
        }
        Ok(())
    }
}

/// Reason the daemon began shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ShutdownCause {
    /// A termination signal arrived.
    Signal,
    /// The signal listener could not be installed.
    SignalListenerFailed,
    /// A client issued the `stop` command.
    StopCommand,
    /// The request stream reached end of input.
    InputClosed,
}

/// One-shot latch shared by everything that may request shutdown.
///
/// The first cause to fire wins; later calls are ignored.
#[derive(Debug, Clone, Default)]
pub struct ShutdownTrigger {
    inner: Arc<(Mutex<Option<ShutdownCause>>, Condvar)>,
}

impl ShutdownTrigger {
    /// Creates an unfired trigger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `cause` unless a cause was already recorded.
    pub fn fire(&self, cause: ShutdownCause) {
        let (lock, ready) = &*self.inner;
        let mut fired = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if fired.is_none() {
            debug!(target: PROCESS_TARGET, %cause, "shutdown requested");
            *fired = Some(cause);
            ready.notify_all();
        }
    }

    /// The recorded cause, if the trigger has fired.
    #[must_use]
    pub fn cause(&self) -> Option<ShutdownCause> {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true once any cause has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.cause().is_some()
    }

    /// Blocks until the trigger fires and returns the winning cause.
    pub fn wait(&self) -> ShutdownCause {
        let (lock, ready) = &*self.inner;
        let mut fired = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(cause) = *fired {
                return cause;
            }
            fired = ready.wait(fired).unwrap_or_else(PoisonError::into_inner);
        }
    }
}
