//! Async job queue for long-running commands.
//!
//! Jobs are accepted without blocking the caller, identified by an opaque
//! `opid-` id, and executed by a fixed pool of worker threads in FIFO order.
//! Callers poll the job for its state and collect the result once it reaches
//! a terminal state.

mod queue;
mod state;

pub use self::queue::{AsyncJobQueue, JobTask, QueueConfig, ShutdownReport};
pub use self::state::{JobContext, JobId, JobSnapshot, JobState};
