//! Cancellable one-shot timers and background tasks.
//!
//! Every timer the simulator schedules (emit acknowledgements, presence
//! events) and every long-lived loop (scheduler, settings watcher) is spawned
//! through a [`TimerScope`], so that service shutdown can cancel them and
//! wait for them to finish.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A task tracker paired with a cancellation token.
///
/// Clones share both the tracker and the token. [`TimerScope::child`]
/// shares the tracker but gets a child token that can be cancelled on its
/// own without affecting the parent.
#[derive(Clone, Default)]
pub struct TimerScope {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl TimerScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope whose token is cancelled when this scope's token is.
    pub fn child(&self) -> Self {
        Self {
            tracker: self.tracker.clone(),
            cancel: self.cancel.child_token(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `action` once after `delay`, unless the scope is cancelled first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn after<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => action(),
            }
        });
    }

    /// Spawn a long-lived task on the shared tracker.
    ///
    /// The future is expected to watch [`TimerScope::token`] itself.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Cancel this scope and wait for every task on the tracker to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
