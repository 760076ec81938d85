//! Cooperative shutdown signal shared by the scheduler and the binary.
//!
//! Cancellation is a one-way latch: once [`ShutdownSignal::cancel`] is
//! called, [`ShutdownSignal::cancelled`] resolves for every current and
//! future waiter. Nothing is preempted; the scheduler checks the signal only
//! between ticks.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Process-wide cooperative cancellation flag.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// Wakes tasks parked in [`ShutdownSignal::cancelled`].
    notify: Notify,
}

impl ShutdownSignal {
    /// Create a signal that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Wait until shutdown is requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent `cancel`
            // cannot slip between the check and the await.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
