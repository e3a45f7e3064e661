//! Mock implementations for testing
//!
//! [`MockTransport`] hands out sockets that tests drive by hand, and
//! [`ManualScheduler`] runs timers only when a test advances its clock, so
//! connection scenarios run without a network or a wall clock.

use crate::connection::scheduler::{Scheduler, TimerHandle, TimerTask};
use crate::transport::{EventSink, Socket, Transport, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock transport for testing
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

#[derive(Debug, Default)]
struct TransportState {
    open_calls: usize,
    fail_next: Option<String>,
    connections: Vec<MockConnection>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail synchronously
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        lock(&self.state).fail_next = Some(reason.into());
    }

    /// Number of `open` calls, failed ones included
    pub fn open_count(&self) -> usize {
        lock(&self.state).open_calls
    }

    /// Every socket handed out so far, oldest first
    pub fn connections(&self) -> Vec<MockConnection> {
        lock(&self.state).connections.clone()
    }

    pub fn connection(&self, index: usize) -> Option<MockConnection> {
        lock(&self.state).connections.get(index).cloned()
    }

    /// Most recently opened socket
    pub fn last(&self) -> Option<MockConnection> {
        lock(&self.state).connections.last().cloned()
    }
}

impl Transport for MockTransport {
    fn open(&self, url: &Url, sink: EventSink) -> Result<Box<dyn Socket>, TransportError> {
        let mut state = lock(&self.state);
        state.open_calls += 1;
        if let Some(reason) = state.fail_next.take() {
            return Err(TransportError::OpenFailed(reason));
        }

        let connection = MockConnection {
            url: url.clone(),
            sink,
            close_requested: Arc::new(AtomicBool::new(false)),
        };
        state.connections.push(connection.clone());
        Ok(Box::new(MockSocket {
            close_requested: connection.close_requested.clone(),
        }))
    }
}

/// Test-side view of one socket: emits events as the transport would
#[derive(Debug, Clone)]
pub struct MockConnection {
    url: Url,
    sink: EventSink,
    close_requested: Arc<AtomicBool>,
}

impl MockConnection {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn open(&self) {
        self.sink.opened();
    }

    pub fn frame(&self, text: impl Into<String>) {
        self.sink.frame(text);
    }

    pub fn error(&self, detail: impl Into<String>) {
        self.sink.error(detail);
    }

    /// A frame the transport could not read as text
    pub fn undecodable(&self, detail: impl Into<String>) {
        self.sink.undecodable(detail);
    }

    pub fn close_with(&self, code: Option<u16>, reason: impl Into<String>) {
        self.sink.closed(code, reason);
    }

    /// Server-side close with a normal closure code
    pub fn close(&self) {
        self.close_with(Some(1000), "server closed");
    }

    /// Whether the manager asked this socket to close
    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }
}

struct MockSocket {
    close_requested: Arc<AtomicBool>,
}

impl Socket for MockSocket {
    fn close(&mut self) {
        self.close_requested.store(true, Ordering::SeqCst);
    }
}

/// Scheduler whose clock only moves when a test calls [`advance`](Self::advance)
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

#[derive(Default)]
struct SchedulerState {
    now: Duration,
    unreliable_cancel: bool,
    scheduled: usize,
    timers: Vec<ManualTimer>,
}

struct ManualTimer {
    due: Duration,
    seq: usize,
    cancelled: Arc<AtomicBool>,
    task: TimerTask,
}

impl ManualTimer {
    fn live(&self, unreliable_cancel: bool) -> bool {
        unreliable_cancel || !self.cancelled.load(Ordering::SeqCst)
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler whose `cancel` is ignored, so cancelled timers still fire
    pub fn with_unreliable_cancel() -> Self {
        let scheduler = Self::default();
        lock(&scheduler.state).unreliable_cancel = true;
        scheduler
    }

    /// Time elapsed on this scheduler's clock
    pub fn now(&self) -> Duration {
        lock(&self.state).now
    }

    /// Move the clock forward, firing every timer that comes due in order
    ///
    /// Timers scheduled by a firing timer run too if they fall inside the window.
    pub fn advance(&self, by: Duration) {
        let target = lock(&self.state).now + by;

        loop {
            let task = {
                let mut state = lock(&self.state);
                let unreliable = state.unreliable_cancel;
                state.timers.retain(|t| t.live(unreliable));
                let next = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.seq))
                    .map(|(index, _)| index);
                match next {
                    Some(index) => {
                        let timer = state.timers.remove(index);
                        state.now = timer.due;
                        timer.task
                    }
                    None => {
                        state.now = target;
                        break;
                    }
                }
            };
            task();
        }
    }

    /// Advance exactly to the earliest pending timer and fire it; false if none
    pub fn fire_next(&self) -> bool {
        let next_due = {
            let state = lock(&self.state);
            let unreliable = state.unreliable_cancel;
            state
                .timers
                .iter()
                .filter(|t| t.live(unreliable))
                .map(|t| t.due)
                .min()
                .map(|due| due.saturating_sub(state.now))
        };
        match next_due {
            Some(delay) => {
                self.advance(delay);
                true
            }
            None => false,
        }
    }

    /// Remaining delay of each pending timer that has not been cancelled
    pub fn pending_delays(&self) -> Vec<Duration> {
        let state = lock(&self.state);
        state
            .timers
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .map(|t| t.due.saturating_sub(state.now))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending_delays().len()
    }

    /// Timers ever scheduled, fired or not
    pub fn scheduled_count(&self) -> usize {
        lock(&self.state).scheduled
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = lock(&self.state);
        let seq = state.scheduled;
        state.scheduled += 1;
        let due = state.now + delay;
        state.timers.push(ManualTimer {
            due,
            seq,
            cancelled: cancelled.clone(),
            task,
        });
        Box::new(ManualTimerHandle { cancelled })
    }
}

struct ManualTimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for ManualTimerHandle {
    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
