//! Bounded FIFO of async jobs served by a fixed worker pool.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::state::{JobContext, JobId, JobSnapshot, JobState};
use crate::protocol::{DispatchError, RpcError};

/// Tracing target for async job execution.
pub(crate) const JOBS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::jobs");

/// Body of an async job.
pub type JobTask = Box<dyn FnOnce(&JobContext) -> Result<Value, RpcError> + Send + 'static>;

/// Sizing of the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Number of worker threads; at least one is always spawned.
    pub workers: usize,
    /// Maximum number of jobs waiting for a worker.
    pub backlog: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: noderpc_config::DEFAULT_ASYNC_WORKERS,
            backlog: noderpc_config::DEFAULT_ASYNC_BACKLOG,
        }
    }
}

/// Outcome of [`AsyncJobQueue::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// Queued jobs cancelled before they started.
    pub cancelled_queued: usize,
    /// Running jobs still executing when the grace period ran out.
    pub abandoned: usize,
}

impl ShutdownReport {
    /// Returns true when every running job finished within the grace period.
    pub fn completed_in_grace(&self) -> bool {
        self.abandoned == 0
    }
}

struct JobRecord {
    sequence: u64,
    label: String,
    state: JobState,
    submitted_at: SystemTime,
    started_at: Option<SystemTime>,
    finished_at: Option<SystemTime>,
    cancel: Arc<AtomicBool>,
}

impl JobRecord {
    fn snapshot(&self, id: &JobId) -> JobSnapshot {
        JobSnapshot {
            id: id.clone(),
            label: self.label.clone(),
            state: self.state.clone(),
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    fn transition(&mut self, id: &JobId, next: JobState) {
        if !self.state.can_transition_to(&next) {
            warn!(
                target: JOBS_TARGET,
                job = %id,
                from = self.state.label(),
                to = next.label(),
                "ignored backward job transition"
            );
            return;
        }
        match next {
            JobState::Running => self.started_at = Some(SystemTime::now()),
            _ => self.finished_at = Some(SystemTime::now()),
        }
        self.state = next;
    }
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<JobId, JobRecord>,
    pending: VecDeque<(JobId, JobTask)>,
    running: usize,
    next_sequence: u64,
    shutting_down: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    work_ready: Condvar,
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Async job queue with a fixed pool of worker threads.
///
/// Submissions never block: a full backlog is reported to the caller.
pub struct AsyncJobQueue {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: QueueConfig,
}

impl fmt::Debug for AsyncJobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncJobQueue")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AsyncJobQueue {
    /// Spawns the worker pool.
    pub fn new(config: QueueConfig) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
        });
        let mut workers = Vec::new();
        for index in 0..config.workers.max(1) {
            let worker_shared = Arc::clone(&shared);
            match thread::Builder::new()
                .name(format!("noderpc-job-{index}"))
                .spawn(move || worker_loop(&worker_shared))
            {
                Ok(handle) => workers.push(handle),
                Err(error) => {
                    warn!(target: JOBS_TARGET, worker = index, %error, "failed to spawn job worker");
                }
            }
        }
        debug!(
            target: JOBS_TARGET,
            workers = workers.len(),
            backlog = config.backlog,
            "job queue started"
        );
        Self {
            shared,
            workers: Mutex::new(workers),
            config,
        }
    }

    /// Pool sizing in effect.
    pub fn config(&self) -> QueueConfig {
        self.config
    }

    /// Enqueues a job and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once shutdown has begun, or `QueueFull` when the
    /// backlog bound is reached.
    pub fn submit<F>(&self, label: impl Into<String>, task: F) -> Result<JobId, DispatchError>
    where
        F: FnOnce(&JobContext) -> Result<Value, RpcError> + Send + 'static,
    {
        let mut state = self.shared.lock();
        if state.shutting_down {
            return Err(DispatchError::ShuttingDown);
        }
        if state.pending.len() >= self.config.backlog {
            return Err(DispatchError::QueueFull {
                backlog: self.config.backlog,
            });
        }

        let id = JobId::generate();
        let label = label.into();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        debug!(target: JOBS_TARGET, job = %id, label = %label, "job queued");
        state.jobs.insert(
            id.clone(),
            JobRecord {
                sequence,
                label,
                state: JobState::Queued,
                submitted_at: SystemTime::now(),
                started_at: None,
                finished_at: None,
                cancel: Arc::new(AtomicBool::new(false)),
            },
        );
        state.pending.push_back((id.clone(), Box::new(task)));
        self.shared.work_ready.notify_one();
        Ok(id)
    }

    /// Returns a snapshot of the job.
    ///
    /// # Errors
    ///
    /// Returns `UnknownJob` when the id was never issued or already reaped.
    pub fn poll(&self, id: &str) -> Result<JobSnapshot, DispatchError> {
        let state = self.shared.lock();
        let id = JobId::from(id);
        state
            .jobs
            .get(&id)
            .map(|record| record.snapshot(&id))
            .ok_or_else(|| DispatchError::unknown_job(id.as_str()))
    }

    /// Requests cancellation.
    ///
    /// A queued job is cancelled immediately and `true` is returned. A running
    /// job only has its cancellation flag raised, so `false` is returned, as
    /// it is for jobs that already finished.
    ///
    /// # Errors
    ///
    /// Returns `UnknownJob` for unknown ids.
    pub fn cancel(&self, id: &str) -> Result<bool, DispatchError> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let id = JobId::from(id);
        let Some(record) = state.jobs.get_mut(&id) else {
            return Err(DispatchError::unknown_job(id.as_str()));
        };
        match record.state {
            JobState::Queued => {
                record.transition(&id, JobState::Cancelled);
                state.pending.retain(|(pending, _)| *pending != id);
                info!(target: JOBS_TARGET, job = %id, "queued job cancelled");
                Ok(true)
            }
            JobState::Running => {
                record.cancel.store(true, Ordering::SeqCst);
                info!(target: JOBS_TARGET, job = %id, "cancellation requested for running job");
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Removes a finished job and returns its final snapshot.
    ///
    /// Returns `None` while the job is still queued or running.
    ///
    /// # Errors
    ///
    /// Returns `UnknownJob` for unknown ids.
    pub fn reap(&self, id: &str) -> Result<Option<JobSnapshot>, DispatchError> {
        let mut state = self.shared.lock();
        let id = JobId::from(id);
        let Some(record) = state.jobs.get(&id) else {
            return Err(DispatchError::unknown_job(id.as_str()));
        };
        if !record.state.is_terminal() {
            return Ok(None);
        }
        Ok(state.jobs.remove(&id).map(|record| record.snapshot(&id)))
    }

    /// Ids of known jobs in submission order, optionally limited to one
    /// status label.
    pub fn list(&self, status: Option<&str>) -> Vec<JobId> {
        let state = self.shared.lock();
        let mut jobs: Vec<(&JobId, &JobRecord)> = state
            .jobs
            .iter()
            .filter(|(_, record)| status.is_none_or(|label| record.state.label() == label))
            .collect();
        jobs.sort_by_key(|(_, record)| record.sequence);
        jobs.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Stops accepting work, cancels queued jobs and waits up to `grace` for
    /// running jobs.
    ///
    /// Jobs still running after the grace period have their cancellation flag
    /// raised and their workers are detached.
    pub fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let deadline = Instant::now() + grace;
        {
            let mut state = self.shared.lock();
            state.shutting_down = true;
            let pending: Vec<JobId> = state.pending.drain(..).map(|(id, _)| id).collect();
            for id in pending {
                if let Some(record) = state.jobs.get_mut(&id) {
                    record.transition(&id, JobState::Cancelled);
                    report.cancelled_queued += 1;
                }
            }
            self.shared.work_ready.notify_all();

            while state.running > 0 {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let (guard, _) = self
                    .shared
                    .idle
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
            }

            report.abandoned = state.running;
            if state.running > 0 {
                for record in state.jobs.values() {
                    if record.state == JobState::Running {
                        record.cancel.store(true, Ordering::SeqCst);
                    }
                }
            }
        }

        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            let joinable = report.abandoned == 0 || worker.is_finished();
            if joinable && worker.join().is_err() {
                warn!(target: JOBS_TARGET, "job worker exited abnormally");
            }
        }

        info!(
            target: JOBS_TARGET,
            cancelled_queued = report.cancelled_queued,
            abandoned = report.abandoned,
            "job queue shut down"
        );
        report
    }
}

impl Drop for AsyncJobQueue {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.shutting_down = true;
        state.pending.clear();
        self.shared.work_ready.notify_all();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let mut state = shared.lock();
        let (id, task) = loop {
            if let Some(next) = state.pending.pop_front() {
                break next;
            }
            if state.shutting_down {
                return;
            }
            state = shared
                .work_ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        };

        let Some(record) = state.jobs.get_mut(&id) else {
            continue;
        };
        record.transition(&id, JobState::Running);
        let context = JobContext::new(Arc::clone(&record.cancel));
        state.running += 1;
        drop(state);

        debug!(target: JOBS_TARGET, job = %id, "job started");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(&context)));
        let next = match outcome {
            Ok(Ok(result)) => JobState::Success(result),
            Ok(Err(_)) if context.is_cancelled() => JobState::Cancelled,
            Ok(Err(error)) => JobState::Failed(error),
            Err(_) => {
                warn!(target: JOBS_TARGET, job = %id, "job panicked");
                JobState::Failed(RpcError::internal("job panicked"))
            }
        };
        debug!(target: JOBS_TARGET, job = %id, status = next.label(), "job finished");

        let mut state = shared.lock();
        if let Some(record) = state.jobs.get_mut(&id) {
            record.transition(&id, next);
        }
        state.running -= 1;
        shared.idle.notify_all();
    }
}
