//! Supervises daemon launch sequencing and runtime orchestration.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use std::thread;

use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::builtins::register_builtins;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::node::{NodeStatus, NormalOperation};
use crate::timer::ThreadTimerDriver;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownCause, ShutdownSignal, ShutdownTrigger, SystemShutdownSignal};
use super::stdio::serve_lines;

const SIGNAL_THREAD: &str = "noderpc-signals";
const STDIO_THREAD: &str = "noderpc-stdio";

/// Collaborators required to launch the daemon runtime.
pub struct LaunchPlan<L, S> {
    /// Source of the daemon configuration.
    pub loader: L,
    /// Sink for lifecycle health events.
    pub reporter: Arc<dyn HealthReporter>,
    /// Node state consulted for safe mode.
    pub node: Arc<dyn NodeStatus>,
    /// Listener for external termination requests.
    pub shutdown: S,
}

/// Runs the daemon using the production collaborators, serving requests
/// from stdin and writing replies to stdout.
pub fn run_daemon() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        node: Arc::new(NormalOperation),
        shutdown: SystemShutdownSignal::new(),
    };
    run_daemon_with(plan, BufReader::new(io::stdin()), io::stdout()).map(|_| ())
}

/// Runs the daemon with injected collaborators and streams.
///
/// Returns the cause that ended the run. When a signal ends it, the transport
/// thread may still be blocked on input and is left detached.
pub fn run_daemon_with<L, S, R, W>(
    plan: LaunchPlan<L, S>,
    input: R,
    output: W,
) -> Result<ShutdownCause, LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal + 'static,
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let LaunchPlan {
        loader,
        reporter,
        node,
        shutdown,
    } = plan;

    info!(target: PROCESS_TARGET, "starting daemon runtime");
    let daemon = bootstrap_with(&loader, reporter, node)?;
    daemon.set_warmup_status("Registering commands...");

    let trigger = ShutdownTrigger::new();
    let stopper = trigger.clone();
    let builtins = register_builtins(daemon.server(), move || {
        stopper.fire(ShutdownCause::StopCommand);
    });
    info!(target: PROCESS_TARGET, builtins, "builtin commands registered");
    daemon
        .server()
        .timers()
        .register_driver(Arc::new(ThreadTimerDriver::new()));
    daemon.start();

    let watcher = trigger.clone();
    let signals = thread::Builder::new()
        .name(SIGNAL_THREAD.to_owned())
        .spawn(move || {
            let outcome = shutdown.wait();
            let cause = if outcome.is_ok() {
                ShutdownCause::Signal
            } else {
                ShutdownCause::SignalListenerFailed
            };
            watcher.fire(cause);
            outcome
        })
        .map_err(|source| LaunchError::Spawn {
            name: SIGNAL_THREAD,
            source,
        })?;

    let server = Arc::clone(daemon.server());
    let closer = trigger.clone();
    let transport = thread::Builder::new()
        .name(STDIO_THREAD.to_owned())
        .spawn(move || {
            let outcome = serve_lines(&server, input, output, &closer);
            closer.fire(ShutdownCause::InputClosed);
            outcome
        })
        .map_err(|source| LaunchError::Spawn {
            name: STDIO_THREAD,
            source,
        })?;

    let cause = trigger.wait();
    info!(target: PROCESS_TARGET, %cause, "shutdown sequence started");
    let report = daemon.shutdown();

    match cause {
        ShutdownCause::SignalListenerFailed => {
            signals
                .join()
                .map_err(|_| LaunchError::Panicked {
                    name: SIGNAL_THREAD,
                })??;
        }
        ShutdownCause::StopCommand | ShutdownCause::InputClosed => {
            let replies = transport.join().map_err(|_| LaunchError::Panicked {
                name: STDIO_THREAD,
            })??;
            info!(target: PROCESS_TARGET, replies, "stdio transport finished");
        }
        ShutdownCause::Signal => {}
    }

    if !report.completed_in_grace() {
        warn!(
            target: PROCESS_TARGET,
            abandoned = report.abandoned,
            "jobs still running after the grace period"
        );
    }
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(cause)
}
