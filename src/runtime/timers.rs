//! Timer registry
//!
//! Each armed timer is a sleeping task that posts its token-carrying event
//! back into the session queue. Cancellation is best effort: a timer that
//! already fired is discarded by the token check in the transition.

use crate::state_machine::{Event, SlotToken, TimerSpec};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct TimerRegistry {
    armed: HashMap<SlotToken, CancellationToken>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `timer`; re-arming the same token replaces the previous timer
    pub fn schedule(&mut self, timer: TimerSpec, event_tx: mpsc::Sender<Event>) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.armed.insert(timer.token, cancel.clone()) {
            previous.cancel();
        }

        tokio::spawn(async move {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::debug!(token = %timer.token, kind = ?timer.kind, "Timer cancelled");
                }

                () = tokio::time::sleep(timer.delay) => {
                    tracing::debug!(token = %timer.token, kind = ?timer.kind, "Timer fired");
                    let _ = event_tx.send(timer.fired_event()).await;
                }
            }
        });
    }

    pub fn cancel(&mut self, token: SlotToken) {
        if let Some(cancel) = self.armed.remove(&token) {
            cancel.cancel();
        }
    }

    /// Forget a timer whose event has been delivered
    pub fn fired(&mut self, token: SlotToken) {
        self.armed.remove(&token);
    }

    pub fn cancel_all(&mut self) {
        for (_, cancel) in self.armed.drain() {
            cancel.cancel();
        }
    }

    /// Number of timers not yet fired or cancelled
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
