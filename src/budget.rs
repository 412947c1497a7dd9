//! Budget tracker: the session's current permissions.
//!
//! One `TimerStatus` record, replaced whole on every update. Readers get a
//! copy; nothing ever merges individual fields. Two watch channels let loops
//! block instead of polling: one flips with roll availability, the other
//! counts updates.

use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::mudae::TimerStatus;

pub struct BudgetTracker {
    status: Mutex<TimerStatus>,
    rolls_ready: watch::Sender<bool>,
    generation: watch::Sender<u64>,
}

impl BudgetTracker {
    /// Starts denied until the first status report arrives.
    pub fn new() -> Self {
        Self::with_status(TimerStatus::default())
    }

    pub fn with_status(status: TimerStatus) -> Self {
        let (rolls_ready, _) = watch::channel(status.rolls_available > 0);
        let (generation, _) = watch::channel(0);
        Self {
            status: Mutex::new(status),
            rolls_ready,
            generation,
        }
    }

    /// Replace the whole status.
    pub async fn update(&self, new: TimerStatus) {
        self.replace(|_| new, "Budget updated").await;
    }

    /// Swap in the status built by `next` from the current one. Every
    /// replacement is an update: readiness and generation follow it.
    async fn replace(&self, next: impl FnOnce(TimerStatus) -> TimerStatus, reason: &'static str) {
        let mut status = self.status.lock().await;
        let previous = *status;
        let new = next(previous);
        *status = new;

        let ready = new.rolls_available > 0;
        if ready != (previous.rolls_available > 0) {
            debug!(ready, rolls = new.rolls_available, "Roll readiness changed");
        }
        self.rolls_ready.send_if_modified(|current| {
            let changed = *current != ready;
            *current = ready;
            changed
        });
        self.generation.send_modify(|g| *g += 1);
        drop(status);

        info!(status = %new, "{reason}");
    }

    /// Snapshot of the current status.
    pub async fn status(&self) -> TimerStatus {
        *self.status.lock().await
    }

    /// Number of updates applied so far.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Block until rolls are available. Returns immediately if they already are.
    pub async fn wait_for_rolls(&self) {
        let mut rx = self.rolls_ready.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Block until an update newer than `since` has been applied.
    pub async fn wait_for_update(&self, since: u64) -> u64 {
        let mut rx = self.generation.subscribe();
        match rx.wait_for(|g| *g > since).await {
            Ok(g) => *g,
            Err(_) => since,
        }
    }

    /// Mark the claim as spent until the next status report.
    pub async fn record_claim(&self) {
        self.replace(
            |status| TimerStatus {
                can_claim: false,
                ..status
            },
            "Claim spent",
        )
        .await;
    }

    /// Mark the kakera reaction as spent until the next status report.
    pub async fn record_kakera_react(&self) {
        self.replace(
            |status| TimerStatus {
                can_kakera_react: false,
                ..status
            },
            "Kakera react spent",
        )
        .await;
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new()
    }
}
