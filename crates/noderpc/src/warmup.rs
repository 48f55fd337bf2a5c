//! Node warmup gate.
//!
//! The guard starts in `WarmingUp("")` and moves to `Ready` exactly once.
//! Writes after the transition are ignored.

use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::server::DISPATCH_TARGET;

#[derive(Debug, Clone, PartialEq, Eq)]
enum WarmupState {
    WarmingUp(String),
    Ready,
}

/// Process-wide readiness state consulted before every dispatch.
#[derive(Debug)]
pub struct WarmupGuard {
    state: Mutex<WarmupState>,
}

impl Default for WarmupGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl WarmupGuard {
    /// Creates a guard in the warming-up state with an empty status.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WarmupState::WarmingUp(String::new())),
        }
    }

    /// Updates the status message reported while warming up.
    pub fn set_status(&self, message: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let WarmupState::WarmingUp(status) = &mut *state {
            *status = message.into();
        }
    }

    /// Marks warmup as done. Irreversible.
    pub fn mark_finished(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != WarmupState::Ready {
            *state = WarmupState::Ready;
            info!(target: DISPATCH_TARGET, "rpc warmup finished");
        }
    }

    /// Returns whether warmup is still in progress, with the current status.
    pub fn query(&self) -> (bool, String) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            WarmupState::WarmingUp(status) => (true, status.clone()),
            WarmupState::Ready => (false, String::new()),
        }
    }

    /// Returns true once warmup has finished.
    pub fn is_ready(&self) -> bool {
        !self.query().0
    }
}
