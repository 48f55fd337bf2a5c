//! Named delayed callbacks scheduled through a pluggable timer driver.
//!
//! The registry keeps at most one pending timer per name. Scheduling under a
//! name that is already in use cancels the earlier timer first, so only the
//! latest callback can fire. The active driver is process-wide and may be
//! swapped at runtime; the last registration wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::protocol::DispatchError;

/// Tracing target for timer scheduling.
pub(crate) const TIMER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::timer");

/// Callback run when a timer expires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled callback.
///
/// Implementations must guarantee that a cancelled callback never runs.
/// Dropping a handle should cancel it as well.
pub trait TimerHandle: Send {
    /// Cancels the callback if it has not fired yet.
    fn cancel(&self);

    /// Returns true while the callback is still waiting to fire.
    fn is_pending(&self) -> bool;
}

/// Backend able to run a callback after a delay.
pub trait TimerDriver: Send + Sync {
    /// Human-readable driver name used in logs.
    fn name(&self) -> &str;

    /// Schedules `callback` to run once after `delay`.
    ///
    /// The callback must run on a context that does not hold the registry
    /// lock, typically another thread.
    fn new_timer(&self, callback: TimerCallback, delay: Duration) -> Box<dyn TimerHandle>;
}

#[derive(Default)]
struct TimerState {
    driver: Option<Arc<dyn TimerDriver>>,
    timers: HashMap<String, Box<dyn TimerHandle>>,
}

/// Registry of named timers and the active driver.
#[derive(Default)]
pub struct TimerRegistry {
    state: Mutex<TimerState>,
}

impl fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TimerRegistry")
            .field("driver", &state.driver.as_ref().map(|driver| driver.name()))
            .field("timers", &state.timers.len())
            .finish()
    }
}

impl TimerRegistry {
    /// Creates a registry with no driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `driver` as the active driver, replacing any previous one.
    pub fn register_driver(&self, driver: Arc<dyn TimerDriver>) {
        let mut state = self.lock();
        info!(target: TIMER_TARGET, driver = driver.name(), "timer driver registered");
        state.driver = Some(driver);
    }

    /// Removes `driver` if it is the active one; otherwise does nothing.
    pub fn unregister_driver(&self, driver: &Arc<dyn TimerDriver>) {
        let mut state = self.lock();
        let is_active = state
            .driver
            .as_ref()
            .is_some_and(|active| std::ptr::addr_eq(Arc::as_ptr(active), Arc::as_ptr(driver)));
        if is_active {
            info!(target: TIMER_TARGET, driver = driver.name(), "timer driver unregistered");
            state.driver = None;
        }
    }

    /// Schedules `callback` under `name` after `delay_secs` seconds.
    ///
    /// Any timer already stored under `name` is cancelled first. Handles that
    /// have already fired or been cancelled are dropped at the same time.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::NoTimerDriver` when no driver is registered.
    pub fn run_later(
        &self,
        name: &str,
        callback: impl FnOnce() + Send + 'static,
        delay_secs: u64,
    ) -> Result<(), DispatchError> {
        let mut state = self.lock();
        let driver = state.driver.clone().ok_or(DispatchError::NoTimerDriver)?;

        if let Some(previous) = state.timers.remove(name) {
            debug!(target: TIMER_TARGET, timer = name, "replacing pending timer");
            previous.cancel();
        }
        state.timers.retain(|_, handle| handle.is_pending());

        let handle = driver.new_timer(Box::new(callback), Duration::from_secs(delay_secs));
        debug!(
            target: TIMER_TARGET,
            timer = name,
            driver = driver.name(),
            delay_secs,
            "timer scheduled"
        );
        state.timers.insert(name.to_owned(), handle);
        Ok(())
    }

    /// Cancels and forgets every timer.
    pub fn clear(&self) {
        let mut state = self.lock();
        for (_, handle) in state.timers.drain() {
            handle.cancel();
        }
    }

    /// Names of timers that have not fired or been cancelled, sorted.
    pub fn pending(&self) -> Vec<String> {
        let state = self.lock();
        let mut names: Vec<String> = state
            .timers
            .iter()
            .filter(|(_, handle)| handle.is_pending())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadTimerState {
    Pending,
    Cancelled,
    Fired,
}

struct ThreadTimerShared {
    state: Mutex<ThreadTimerState>,
    wake: Condvar,
}

impl ThreadTimerShared {
    fn wait_then_run(&self, delay: Duration, callback: TimerCallback) {
        // A delay past the clock's range never elapses; only cancellation ends it.
        let deadline = Instant::now().checked_add(delay);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if *state != ThreadTimerState::Pending {
                return;
            }
            let Some(deadline) = deadline else {
                state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .wake
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        *state = ThreadTimerState::Fired;
        drop(state);
        callback();
    }
}

struct ThreadTimer {
    shared: Arc<ThreadTimerShared>,
}

impl TimerHandle for ThreadTimer {
    fn cancel(&self) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *state == ThreadTimerState::Pending {
            *state = ThreadTimerState::Cancelled;
            self.shared.wake.notify_all();
        }
    }

    fn is_pending(&self) -> bool {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            == ThreadTimerState::Pending
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Timer driver that parks one thread per timer until it fires or is
/// cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadTimerDriver;

impl ThreadTimerDriver {
    /// Creates the driver.
    pub fn new() -> Self {
        Self
    }
}

impl TimerDriver for ThreadTimerDriver {
    fn name(&self) -> &str {
        "thread"
    }

    fn new_timer(&self, callback: TimerCallback, delay: Duration) -> Box<dyn TimerHandle> {
        let shared = Arc::new(ThreadTimerShared {
            state: Mutex::new(ThreadTimerState::Pending),
            wake: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("noderpc-timer".to_owned())
            .spawn(move || worker.wait_then_run(delay, callback));
        let timer = ThreadTimer { shared };
        if let Err(error) = spawned {
            warn!(target: TIMER_TARGET, %error, "failed to spawn timer thread");
            timer.cancel();
        }
        Box::new(timer)
    }
}
