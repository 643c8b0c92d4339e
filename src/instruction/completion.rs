//! Completion and abort channels for operation instructions.
//!
//! Every instruction carries two notification primitives:
//!
//! - a [`CompletionChannel`]: single-fire, multi-subscriber, carrying a
//!   human-readable outcome code. Subscribers that attach after the fire
//!   resolve immediately, so there is no missed-notification race.
//! - a [`CancellationSignal`]: a cooperative abort flag the executing
//!   operation is expected to observe. Raising it after completion has
//!   fired is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};

/// Single-fire completion channel with synchronous multi-subscriber fan-out.
#[derive(Debug)]
pub struct CompletionChannel {
    sender: watch::Sender<Option<String>>,
}

impl CompletionChannel {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Fire the completion with the given outcome code.
    ///
    /// Only the first fire wins; returns `false` if the channel already fired.
    pub fn fire(&self, outcome: impl Into<String>) -> bool {
        let outcome = outcome.into();
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
            true
        })
    }

    /// Whether the completion has already fired.
    pub fn has_fired(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// The outcome code, once fired.
    pub fn outcome(&self) -> Option<String> {
        self.sender.borrow().clone()
    }

    /// Subscribe to the completion. Subscribing after the fire still yields
    /// the outcome immediately.
    pub fn subscribe(&self) -> CompletionReceiver {
        CompletionReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for CompletionChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a [`CompletionChannel`] subscription.
#[derive(Debug, Clone)]
pub struct CompletionReceiver {
    receiver: watch::Receiver<Option<String>>,
}

impl CompletionReceiver {
    /// Wait until the completion fires and return its outcome code.
    pub async fn wait(mut self) -> String {
        loop {
            if let Some(outcome) = self.receiver.borrow().clone() {
                return outcome;
            }
            // The sender lives as long as its instruction; a closed channel
            // without an outcome means the instruction was dropped mid-flight.
            if self.receiver.changed().await.is_err() {
                return String::from("completion channel closed");
            }
        }
    }

    /// Non-blocking view of the outcome, if fired.
    pub fn outcome(&self) -> Option<String> {
        self.receiver.borrow().clone()
    }
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation signal shared between the queueing engine and the
/// operation it is executing.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<CancelInner>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Wait until the signal is raised.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a concurrent
            // `cancel` between the check and the await cannot be missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
