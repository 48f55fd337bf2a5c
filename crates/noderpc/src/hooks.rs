//! Lifecycle hooks fired around server start/stop and every command.
//!
//! Hooks are registered during process setup and invoked in registration
//! order. A failing pre-command hook aborts the pending execution; post-command
//! failures are logged and swallowed so they never mask the handler outcome.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::protocol::{DispatchError, RpcError};
use crate::table::CommandDescriptor;

/// Tracing target for hook invocation.
pub(crate) const HOOKS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::hooks");

type LifecycleHook = Arc<dyn Fn() + Send + Sync>;
type CommandHook = Arc<dyn Fn(&CommandDescriptor) -> Result<(), RpcError> + Send + Sync>;

/// Ordered, append-only hook lists.
#[derive(Default)]
pub struct LifecycleHooks {
    started: RwLock<Vec<LifecycleHook>>,
    stopped: RwLock<Vec<LifecycleHook>>,
    pre_command: RwLock<Vec<CommandHook>>,
    post_command: RwLock<Vec<CommandHook>>,
}

impl std::fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("started", &snapshot(&self.started).len())
            .field("stopped", &snapshot(&self.stopped).len())
            .field("pre_command", &snapshot(&self.pre_command).len())
            .field("post_command", &snapshot(&self.post_command).len())
            .finish()
    }
}

impl LifecycleHooks {
    /// Creates an empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback fired when the server starts.
    pub fn on_started(&self, hook: impl Fn() + Send + Sync + 'static) {
        append(&self.started, Arc::new(hook));
    }

    /// Registers a callback fired when the server stops.
    pub fn on_stopped(&self, hook: impl Fn() + Send + Sync + 'static) {
        append(&self.stopped, Arc::new(hook));
    }

    /// Registers a callback fired before every command.
    pub fn on_pre_command(
        &self,
        hook: impl Fn(&CommandDescriptor) -> Result<(), RpcError> + Send + Sync + 'static,
    ) {
        append(&self.pre_command, Arc::new(hook));
    }

    /// Registers a callback fired after every command, whatever its outcome.
    pub fn on_post_command(
        &self,
        hook: impl Fn(&CommandDescriptor) -> Result<(), RpcError> + Send + Sync + 'static,
    ) {
        append(&self.post_command, Arc::new(hook));
    }

    pub(crate) fn fire_started(&self) {
        for hook in snapshot(&self.started) {
            hook();
        }
    }

    pub(crate) fn fire_stopped(&self) {
        for hook in snapshot(&self.stopped) {
            hook();
        }
    }

    /// Runs pre-command hooks, stopping at the first failure.
    pub(crate) fn run_pre_command(&self, command: &CommandDescriptor) -> Result<(), DispatchError> {
        for hook in snapshot(&self.pre_command) {
            hook(command).map_err(DispatchError::Command)?;
        }
        Ok(())
    }

    /// Runs every post-command hook, logging failures.
    pub(crate) fn run_post_command(&self, command: &CommandDescriptor) {
        for hook in snapshot(&self.post_command) {
            if let Err(error) = hook(command) {
                warn!(
                    target: HOOKS_TARGET,
                    command = %command.name,
                    %error,
                    "post-command hook failed"
                );
            }
        }
    }
}

fn append<T>(list: &RwLock<Vec<T>>, hook: T) {
    list.write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(hook);
}

/// Clones the current list so hooks run without holding the lock.
fn snapshot<T: Clone>(list: &RwLock<Vec<T>>) -> Vec<T> {
    list.read().unwrap_or_else(PoisonError::into_inner).clone()
}
