//! Process-scoped RPC server context.
//!
//! [`RpcServer`] owns every piece of dispatch state: the warmup guard, the
//! command table with its lifecycle hooks, the named timer registry and the
//! async job queue. The running and shutdown flags live here rather than in
//! globals, so several servers can coexist in one process (as the test suites
//! do).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use noderpc_config::Config;
use serde_json::Value;
use tracing::{debug, info};

use crate::hooks::LifecycleHooks;
use crate::jobs::{AsyncJobQueue, JobId, QueueConfig, ShutdownReport};
use crate::node::NodeStatus;
use crate::protocol::{DispatchError, JsonReply, JsonRequest, Params, request_id};
use crate::table::CommandTable;
use crate::timer::TimerRegistry;
use crate::warmup::WarmupGuard;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Runtime settings for an [`RpcServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Async worker pool sizing.
    pub queue: QueueConfig,
    /// Time granted to running jobs when the server stops.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            queue: QueueConfig {
                workers: config.async_workers(),
                backlog: config.async_backlog(),
            },
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// Command dispatch engine shared by every transport.
#[derive(Debug)]
pub struct RpcServer {
    config: ServerConfig,
    warmup: WarmupGuard,
    hooks: Arc<LifecycleHooks>,
    table: Arc<CommandTable>,
    timers: TimerRegistry,
    jobs: AsyncJobQueue,
    running: AtomicBool,
    shutting_down: AtomicBool,
}

impl RpcServer {
    /// Creates a server in the warming-up state with an empty command table.
    pub fn new(config: ServerConfig, node: Arc<dyn NodeStatus>) -> Self {
        let hooks = Arc::new(LifecycleHooks::new());
        let table = Arc::new(CommandTable::new(Arc::clone(&hooks), node));
        Self {
            config,
            warmup: WarmupGuard::new(),
            hooks,
            table,
            timers: TimerRegistry::new(),
            jobs: AsyncJobQueue::new(config.queue),
            running: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Settings the server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Warmup guard consulted before every dispatch.
    pub fn warmup(&self) -> &WarmupGuard {
        &self.warmup
    }

    /// Command table.
    pub fn table(&self) -> &Arc<CommandTable> {
        &self.table
    }

    /// Lifecycle hooks.
    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    /// Named timer registry.
    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Async job queue.
    pub fn jobs(&self) -> &AsyncJobQueue {
        &self.jobs
    }

    /// Closes the command table and fires the started hooks.
    ///
    /// Calling `start` on a running server does nothing.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.table.mark_serving();
        info!(
            target: DISPATCH_TARGET,
            commands = self.table.commands().len(),
            "rpc server started"
        );
        self.hooks.fire_started();
    }

    /// Refuses all new work from now on.
    pub fn interrupt(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            info!(target: DISPATCH_TARGET, "rpc server interrupted");
        }
    }

    /// Stops the server: cancels pending timers, drains the job queue within
    /// the configured grace period and fires the stopped hooks.
    pub fn stop(&self) -> ShutdownReport {
        self.interrupt();
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.timers.clear();
        let report = self.jobs.shutdown(self.config.shutdown_grace);
        if was_running {
            self.hooks.fire_stopped();
            info!(target: DISPATCH_TARGET, "rpc server stopped");
        }
        report
    }

    /// Returns true between `start` and `interrupt`/`stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.shutting_down.load(Ordering::SeqCst)
    }

    /// Executes a command synchronously.
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` after an interrupt, `Warmup` while the node is
    /// still warming up, or any error raised by the command table.
    pub fn execute(&self, name: &str, params: &Params) -> Result<Value, DispatchError> {
        self.admit()?;
        self.table.execute(name, params, false)
    }

    /// Executes a parsed request and builds its reply.
    pub fn execute_request(&self, request: &JsonRequest) -> JsonReply {
        JsonReply::from_outcome(
            request.id.clone(),
            self.execute(&request.method, &request.params),
        )
    }

    /// Queues a command to run on the async job pool.
    ///
    /// # Errors
    ///
    /// Fails like [`RpcServer::execute`] for gating and unknown methods, and
    /// with `QueueFull` when the backlog is exhausted.
    pub fn submit(&self, name: &str, params: Params) -> Result<JobId, DispatchError> {
        self.admit()?;
        if self.table.lookup(name).is_none() {
            return Err(DispatchError::method_not_found(name));
        }
        let table = Arc::clone(&self.table);
        let method = name.to_owned();
        self.jobs.submit(name, move |_context| {
            table
                .execute(&method, &params, false)
                .map_err(|error| error.to_rpc_error())
        })
    }

    /// Dispatches a request object, or a batch of them, to reply values.
    ///
    /// Batch elements are isolated: a malformed or failing element yields an
    /// error reply in its slot and never affects its neighbours.
    pub fn handle_value(&self, value: &Value) -> Value {
        match value {
            Value::Array(items) => {
                debug!(target: DISPATCH_TARGET, size = items.len(), "dispatching batch");
                Value::Array(
                    items
                        .iter()
                        .map(|item| self.handle_single(item).into_value())
                        .collect(),
                )
            }
            single => self.handle_single(single).into_value(),
        }
    }

    /// Parses a JSON document and dispatches it.
    ///
    /// Text that is not valid JSON yields a parse error reply with a null id.
    pub fn handle_text(&self, text: &str) -> String {
        let reply = match serde_json::from_str::<Value>(text) {
            Ok(value) => self.handle_value(&value),
            Err(error) => {
                debug!(target: DISPATCH_TARGET, %error, "request is not valid JSON");
                JsonReply::from_outcome(Value::Null, Err(DispatchError::from_json_error(error)))
                    .into_value()
            }
        };
        reply.to_string()
    }

    fn handle_single(&self, value: &Value) -> JsonReply {
        match JsonRequest::parse(value) {
            Ok(request) => self.execute_request(&request),
            Err(error) => JsonReply::from_outcome(request_id(value), Err(error)),
        }
    }

    fn admit(&self) -> Result<(), DispatchError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(DispatchError::ShuttingDown);
        }
        let (in_warmup, status) = self.warmup.query();
        if in_warmup {
            return Err(DispatchError::warmup(status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
