//! Reconnect timers
//!
//! The manager only needs "run this once after a delay, maybe cancel it".
//! Cancellation is best-effort: the manager re-checks its reconnect intent
//! when a timer fires, so a timer that fires after `cancel` is harmless.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Work run when a timer fires
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled timer
pub trait TimerHandle: Send {
    /// Stop the timer if it has not fired yet
    fn cancel(&mut self);
}

/// Source of one-shot timers
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle>;
}

/// Timers backed by the tokio runtime
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Use the runtime of the calling context
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Box::new(TokioTimer { handle })
    }
}

struct TokioTimer {
    handle: JoinHandle<()>,
}

impl TimerHandle for TokioTimer {
    fn cancel(&mut self) {
        if !self.handle.is_finished() {
            debug!("Cancelling pending reconnect timer");
            self.handle.abort();
        }
    }
}
