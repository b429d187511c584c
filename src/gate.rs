//! Cooperative pause/resume barrier for commit-sensitive operations.
//!
//! A [`CommitGate`] lets one part of the application (for example, a storage
//! migration or a bulk edit) ask everything else that writes results to hold
//! off for a while. Writers call [`CommitGate::wait_if_paused`] right before
//! committing; it returns immediately while the gate is clear and suspends
//! while it is paused.
//!
//! The gate does not remember why it was paused.

use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

/// Two-state barrier: `clear` or `paused`.
#[derive(Debug, Default)]
pub struct CommitGate {
    state: Mutex<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    paused: bool,
    /// Pending resumption handles, in registration order.
    waiters: Vec<oneshot::Sender<()>>,
}

impl CommitGate {
    /// Creates a clear gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses the gate. Pausing an already paused gate changes nothing.
    pub fn pause(&self) {
        let mut state = self.lock();
        if !state.paused {
            debug!("commit gate paused");
            state.paused = true;
        }
    }

    /// Clears the gate and wakes every suspended waiter exactly once.
    ///
    /// Resuming a clear gate changes nothing.
    pub fn resume(&self) {
        let waiters = {
            let mut state = self.lock();
            if !state.paused {
                return;
            }
            state.paused = false;
            std::mem::take(&mut state.waiters)
        };

        debug!(waiters = waiters.len(), "commit gate resumed");
        for waiter in waiters {
            // A dropped receiver means that waiter was cancelled; nothing to wake.
            let _ = waiter.send(());
        }
    }

    /// Returns whether the gate is currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Returns immediately if the gate is clear; otherwise waits for [`resume`](Self::resume).
    pub async fn wait_if_paused(&self) {
        let receiver = {
            let mut state = self.lock();
            if !state.paused {
                return;
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push(sender);
            receiver
        };

        // The sender only disappears when resume() fires it or the gate is dropped;
        // either way the wait is over.
        let _ = receiver.await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.lock().waiters.len()
    }
}
