//! Reusable N-party rendezvous with abort
//!
//! Unlike `tokio::sync::Barrier`, a waiter cancelled mid-wait breaks the
//! barrier for everyone: current waiters and all later arrivals observe
//! `BarrierError::Broken`. The executor treats that as non-retryable for
//! the batch.

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// The rendezvous cannot complete
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BarrierError {
    /// A party was cancelled while waiting; the barrier is permanently broken
    #[error("barrier is broken")]
    Broken,
}

struct BarrierState {
    arrived: usize,
    generation: u64,
    broken: bool,
}

/// Cyclic barrier for `parties` workers
pub struct CyclicBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    notify: Notify,
}

impl CyclicBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                broken: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    pub fn is_broken(&self) -> bool {
        self.state.lock().broken
    }

    /// Park until all parties arrive, or fail when broken or cancelled
    ///
    /// Cancellation of `cancel` while parked breaks the barrier for every
    /// other waiter as well.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), BarrierError> {
        let my_generation = {
            let mut state = self.state.lock();
            if state.broken {
                return Err(BarrierError::Broken);
            }
            state.arrived += 1;
            if state.arrived == self.parties {
                // last arrival releases the generation
                state.arrived = 0;
                state.generation = state.generation.wrapping_add(1);
                self.notify.notify_waiters();
                return Ok(());
            }
            state.generation
        };

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.state.lock();
                if state.broken {
                    return Err(BarrierError::Broken);
                }
                if state.generation != my_generation {
                    return Ok(());
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => {
                    self.abort();
                    return Err(BarrierError::Broken);
                }
            }
        }
    }

    /// Break the barrier; every current and future waiter fails
    pub fn abort(&self) {
        self.state.lock().broken = true;
        self.notify.notify_waiters();
    }
}
