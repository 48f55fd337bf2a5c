//! Command dispatch engine for a full node's JSON-RPC interface.
//!
//! The crate turns raw request documents into command invocations. A
//! [`CommandTable`] maps method names to handlers grouped by category; the
//! [`RpcServer`] wraps it with the warmup gate, lifecycle hooks, a named timer
//! registry and an [`AsyncJobQueue`] for long-running work. Requests arrive as
//! single objects or batches and every element yields exactly one reply, so a
//! failing command never disturbs its neighbours.
//!
//! The daemon side mirrors a conventional service bootstrap: configuration is
//! resolved by [`noderpc_config`], telemetry is installed once, and health
//! events are surfaced through a [`HealthReporter`]. The bundled transport
//! reads line-delimited JSON from stdin and writes replies to stdout until a
//! termination signal, the `stop` command or end of input ends the run.
//!
//! ## Dispatch order
//!
//! Each request passes through these checks before its handler runs:
//!
//! 1. The server must not be shutting down.
//! 2. The node must have finished warming up.
//! 3. The method must be registered.
//! 4. Commands that are unsafe in safe mode are refused while it is active.
//! 5. Every pre-command hook must accept the command.
//!
//! Post-command hooks observe the command after its handler returns.

mod bootstrap;
mod builtins;
mod health;
mod hooks;
pub mod jobs;
mod node;
mod process;
pub mod protocol;
mod server;
mod table;
mod telemetry;
mod timer;
pub mod validate;
pub mod values;
mod warmup;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use builtins::register_builtins;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use hooks::LifecycleHooks;
pub use jobs::{AsyncJobQueue, JobId, JobSnapshot, JobState};
pub use node::{NodeStatus, NormalOperation};
pub use process::{
    LaunchError, LaunchPlan, MAX_REQUEST_BYTES, ShutdownCause, ShutdownError, ShutdownSignal,
    ShutdownTrigger, SystemShutdownSignal, run_daemon, run_daemon_with, serve_lines,
};
pub use protocol::{DispatchError, JsonReply, JsonRequest, Params, RpcError};
pub use server::{RpcServer, ServerConfig};
pub use table::{CommandDescriptor, CommandHandler, CommandTable};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use timer::{ThreadTimerDriver, TimerCallback, TimerDriver, TimerHandle, TimerRegistry};
pub use warmup::WarmupGuard;

#[cfg(test)]
mod tests;
