//! Process supervision: launch sequencing, shutdown triggers and the
//! line-delimited stdio transport.

mod errors;
pub(crate) mod launch;
pub(crate) mod shutdown;
pub(crate) mod stdio;

pub use errors::LaunchError;
pub use launch::{LaunchPlan, run_daemon, run_daemon_with};
pub use shutdown::{
    ShutdownCause, ShutdownError, ShutdownSignal, ShutdownTrigger, SystemShutdownSignal,
};
pub use stdio::{MAX_REQUEST_BYTES, serve_lines};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
