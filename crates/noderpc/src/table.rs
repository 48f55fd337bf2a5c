//! Command registry and dispatch table.
//!
//! Commands are registered by name during setup. Once the server starts the
//! table is marked serving and refuses further registrations, so the set of
//! dispatchable commands is fixed for the life of the process. Execution looks
//! up the descriptor under a read lock, releases the lock, then runs the
//! safe-mode check, the pre-command hooks, the handler and the post-command
//! hooks in that order.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::hooks::LifecycleHooks;
use crate::node::NodeStatus;
use crate::protocol::{DispatchError, Params, RpcError};
use crate::server::DISPATCH_TARGET;

/// Executes a single RPC command.
///
/// When `help` is true the handler must return its usage text instead of
/// running; the first line of that text is used in the command listing.
pub trait CommandHandler: Send + Sync {
    /// Runs the command or renders its usage.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcError`] that is relayed to the caller verbatim.
    fn invoke(&self, params: &Params, help: bool) -> Result<Value, RpcError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&Params, bool) -> Result<Value, RpcError> + Send + Sync,
{
    fn invoke(&self, params: &Params, help: bool) -> Result<Value, RpcError> {
        self(params, help)
    }
}

/// Immutable description of a registered command.
#[derive(Clone)]
pub struct CommandDescriptor {
    /// Help grouping, e.g. `control`.
    pub category: String,
    /// Unique method name.
    pub name: String,
    /// Handler invoked on dispatch.
    pub handler: Arc<dyn CommandHandler>,
    /// Whether the command may run while the node is in safe mode.
    pub safe_mode_allowed: bool,
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("category", &self.category)
            .field("name", &self.name)
            .field("safe_mode_allowed", &self.safe_mode_allowed)
            .finish_non_exhaustive()
    }
}

impl CommandDescriptor {
    /// Describes a command backed by a closure. Safe mode is allowed by
    /// default.
    pub fn new<F>(category: impl Into<String>, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Params, bool) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        Self::with_handler(category, name, Arc::new(handler))
    }

    /// Describes a command backed by an existing handler.
    pub fn with_handler(
        category: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            handler,
            safe_mode_allowed: true,
        }
    }

    /// Sets whether the command may run in safe mode.
    #[must_use]
    pub fn safe_mode(mut self, allowed: bool) -> Self {
        self.safe_mode_allowed = allowed;
        self
    }

    fn usage(&self) -> String {
        match self.handler.invoke(&Params::default(), true) {
            Ok(Value::String(text)) => text,
            Ok(other) => other.to_string(),
            Err(error) => error.message,
        }
    }
}

#[derive(Default)]
struct TableState {
    commands: BTreeMap<String, Arc<CommandDescriptor>>,
    serving: bool,
}

/// Name-keyed registry of commands.
pub struct CommandTable {
    state: RwLock<TableState>,
    hooks: Arc<LifecycleHooks>,
    node: Arc<dyn NodeStatus>,
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("commands", &self.commands())
            .field("serving", &self.is_serving())
            .finish_non_exhaustive()
    }
}

impl CommandTable {
    /// Creates an empty table that consults `node` for safe mode and runs
    /// `hooks` around every command.
    pub fn new(hooks: Arc<LifecycleHooks>, node: Arc<dyn NodeStatus>) -> Self {
        Self {
            state: RwLock::new(TableState::default()),
            hooks,
            node,
        }
    }

    /// Registers a command under its descriptor name.
    ///
    /// Returns false when the table is already serving or the name is taken.
    /// An existing registration is never replaced.
    pub fn register(&self, descriptor: CommandDescriptor) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.serving {
            warn!(
                target: DISPATCH_TARGET,
                command = %descriptor.name,
                "registration refused: server already started"
            );
            return false;
        }
        if state.commands.contains_key(&descriptor.name) {
            warn!(
                target: DISPATCH_TARGET,
                command = %descriptor.name,
                "registration refused: name already registered"
            );
            return false;
        }
        debug!(
            target: DISPATCH_TARGET,
            command = %descriptor.name,
            category = %descriptor.category,
            "registered command"
        );
        state
            .commands
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        true
    }

    /// Closes the table to further registrations.
    pub fn mark_serving(&self) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .serving = true;
    }

    /// Returns true once the table has been marked serving.
    pub fn is_serving(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .serving
    }

    /// Looks up a command by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .commands
            .get(name)
            .cloned()
    }

    /// Registered command names in sorted order.
    pub fn commands(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .commands
            .keys()
            .cloned()
            .collect()
    }

    /// Executes a command by name.
    ///
    /// # Errors
    ///
    /// Returns `MethodNotFound` for unknown names, `SafeMode` when the node is
    /// restricted and the command disallows it, the first pre-command hook
    /// failure, or the handler's own error wrapped in `Command`.
    pub fn execute(&self, name: &str, params: &Params, help: bool) -> Result<Value, DispatchError> {
        let command = self
            .lookup(name)
            .ok_or_else(|| DispatchError::method_not_found(name))?;

        if !command.safe_mode_allowed && self.node.in_safe_mode() {
            return Err(DispatchError::safe_mode(name));
        }

        self.hooks.run_pre_command(&command)?;

        debug!(target: DISPATCH_TARGET, command = %command.name, help, "executing command");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            command.handler.invoke(params, help)
        }));

        self.hooks.run_post_command(&command);

        match outcome {
            Ok(result) => result.map_err(DispatchError::Command),
            Err(_) => {
                warn!(target: DISPATCH_TARGET, command = %command.name, "command handler panicked");
                Err(DispatchError::internal(format!(
                    "command {} panicked",
                    command.name
                )))
            }
        }
    }

    /// Renders help text.
    ///
    /// An empty name lists the first usage line of every command, grouped by
    /// category. A known name yields that command's full usage text.
    pub fn help(&self, name: &str) -> String {
        if !name.is_empty() {
            return match self.lookup(name) {
                Some(command) => command.usage(),
                None => format!("help: unknown command: {name}"),
            };
        }

        let mut commands: Vec<Arc<CommandDescriptor>> = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .commands
            .values()
            .cloned()
            .collect();
        commands.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));

        let mut sections: Vec<String> = Vec::new();
        let mut current: Option<&str> = None;
        for command in &commands {
            if current != Some(command.category.as_str()) {
                current = Some(command.category.as_str());
                sections.push(format!("== {} ==", capitalise(&command.category)));
            }
            let usage = command.usage();
            let first_line = usage.lines().next().unwrap_or_default();
            if let Some(section) = sections.last_mut() {
                section.push('\n');
                section.push_str(first_line);
            }
        }
        sections.join("\n\n")
    }
}

fn capitalise(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
