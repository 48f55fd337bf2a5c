//! Job identity, lifecycle states and snapshots.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::protocol::RpcError;

/// Opaque identifier of an async job, rendered as `opid-<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub(crate) fn generate() -> Self {
        Self(format!("opid-{}", Uuid::new_v4()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Lifecycle state of a job.
///
/// States only move forward: `Queued` to `Running` or `Cancelled`, and
/// `Running` to one of the terminal states.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    /// Waiting for a worker.
    Queued,
    /// Executing on a worker.
    Running,
    /// Finished with a result.
    Success(Value),
    /// Finished with an error.
    Failed(RpcError),
    /// Cancelled before or during execution.
    Cancelled,
}

impl JobState {
    /// Status label reported to callers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "executing",
            Self::Success(_) => "success",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true once the job can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Failed(_) | Self::Cancelled)
    }

    /// Returns true when moving to `next` keeps the lifecycle forward-only.
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        match self {
            Self::Queued => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// Cooperative cancellation view handed to a running job.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    cancelled: Arc<AtomicBool>,
}

impl JobContext {
    pub(crate) fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self { cancelled }
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    /// Job identifier.
    pub id: JobId,
    /// Label supplied on submission, usually the method name.
    pub label: String,
    /// Current state.
    pub state: JobState,
    /// When the job was accepted.
    pub submitted_at: SystemTime,
    /// When a worker picked the job up.
    pub started_at: Option<SystemTime>,
    /// When the job reached a terminal state.
    pub finished_at: Option<SystemTime>,
}

impl JobSnapshot {
    /// Renders the snapshot as a status object.
    pub fn to_value(&self) -> Value {
        let mut object = json!({
            "id": self.id.as_str(),
            "method": self.label,
            "status": self.state.label(),
            "creation_time": unix_seconds(self.submitted_at),
        });
        if let Value::Object(map) = &mut object {
            match &self.state {
                JobState::Success(result) => {
                    map.insert("result".to_owned(), result.clone());
                }
                JobState::Failed(error) => {
                    map.insert(
                        "error".to_owned(),
                        json!({"code": error.code, "message": error.message}),
                    );
                }
                _ => {}
            }
            if let (Some(started), Some(finished)) = (self.started_at, self.finished_at) {
                let elapsed = finished.duration_since(started).unwrap_or(Duration::ZERO);
                map.insert("execution_secs".to_owned(), json!(elapsed.as_secs_f64()));
            }
        }
        object
    }
}

fn unix_seconds(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
