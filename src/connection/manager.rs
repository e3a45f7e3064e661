//! Connection manager for the live channel
//!
//! Owns the single socket, runs the connection state machine, schedules
//! reconnects with exponential backoff, and routes every transport event into
//! the event log and the subscription registry.
//!
//! All mutation happens under one lock. Subscriber notifications are queued
//! while the lock is held and delivered after it is released, one dispatcher
//! at a time, so subscribers may call back into the manager and still see
//! transitions in the order they happened.

use super::scheduler::{Scheduler, TimerHandle};
use super::state::{log_state_transition, next_state, Backoff, ConnectionState, ReconnectConfig, Transition};
use crate::connection_span;
use crate::error::sanitize_detail;
use crate::event_log::{EventLog, EventLogEntry, LogEvent, EVENT_LOG_CAPACITY};
use crate::observability::metrics::{ConnectionMetrics, MetricsSnapshot};
use crate::protocol::{MessageKind, PushMessage};
use crate::subscription::{Disposer, MessageCallback, StatusCallback, SubscriptionRegistry};
use crate::transport::{EventSink, Socket, Transport, TransportEvent};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Detail recorded when the client closes the socket itself
const CLIENT_CLOSE_DETAIL: &str = "closed by client";

/// Tunables for one manager
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerOptions {
    pub reconnect: ReconnectConfig,
    pub event_log_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            event_log_capacity: EVENT_LOG_CAPACITY,
        }
    }
}

/// Handle to one live-channel connection
///
/// Cheap to clone; every clone drives the same connection. The socket and any
/// pending reconnect timer are released when the last clone is dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    id: Uuid,
    url: Url,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    registry: Arc<SubscriptionRegistry>,
    metrics: ConnectionMetrics,
    inner: Mutex<Inner>,
}

/// The socket the manager currently listens to
struct ActiveSocket {
    generation: u64,
    /// `None` while `Transport::open` is still running
    handle: Option<Box<dyn Socket>>,
}

struct PendingTimer {
    id: u64,
    handle: Box<dyn TimerHandle>,
}

enum Notification {
    /// Transition number `seq`
    Status(ConnectionState, u64),
    /// First call to a status subscriber, with the state it registered under
    Prime(StatusCallback, ConnectionState),
    Message(PushMessage),
}

struct Inner {
    state: ConnectionState,
    backoff: Backoff,
    should_reconnect: bool,
    generation: u64,
    active: Option<ActiveSocket>,
    reconnect_timer: Option<PendingTimer>,
    next_timer_id: u64,
    log: EventLog,
    /// Number of transitions queued so far
    status_seq: u64,
    outbox: VecDeque<Notification>,
    dispatching: bool,
}

impl Inner {
    fn transition(&mut self, to: ConnectionState, detail: Option<String>) {
        let from = self.state;
        self.state = to;
        log_state_transition(from, to);
        self.log.record(match detail {
            Some(detail) => LogEvent::status_with_detail(to, detail),
            None => LogEvent::status(to),
        });
        self.status_seq += 1;
        self.outbox.push_back(Notification::Status(to, self.status_seq));
    }

    fn is_current(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    /// Stop listening to the active socket; returns it so it can be closed
    /// outside the lock
    fn detach(&mut self) -> Option<Box<dyn Socket>> {
        self.active.take().and_then(|active| active.handle)
    }

    fn cancel_timer(&mut self) {
        if let Some(mut timer) = self.reconnect_timer.take() {
            timer.handle.cancel();
        }
    }
}

impl ConnectionManager {
    pub fn new(url: Url, transport: Arc<dyn Transport>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_options(url, transport, scheduler, ManagerOptions::default())
    }

    pub fn with_options(
        url: Url,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
        options: ManagerOptions,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!(client_id = %id, url = %url, "Creating connection manager");

        Self {
            shared: Arc::new(Shared {
                id,
                url,
                transport,
                scheduler,
                registry: SubscriptionRegistry::new(),
                metrics: ConnectionMetrics::new(),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    backoff: Backoff::new(&options.reconnect),
                    should_reconnect: false,
                    generation: 0,
                    active: None,
                    reconnect_timer: None,
                    next_timer_id: 0,
                    log: EventLog::with_capacity(options.event_log_capacity),
                    status_seq: 0,
                    outbox: VecDeque::new(),
                    dispatching: false,
                }),
            }),
        }
    }

    /// Open the channel and keep it open until [`disconnect`](Self::disconnect)
    ///
    /// A no-op while a socket is connecting or connected.
    pub fn connect(&self) {
        let _span = connection_span!(client_id = %self.shared.id, op = "connect").entered();
        self.shared.lock().should_reconnect = true;
        self.shared.begin_connect();
    }

    /// Close the channel and suppress every pending or future reconnect
    pub fn disconnect(&self) {
        let _span = connection_span!(client_id = %self.shared.id, op = "disconnect").entered();
        let socket = {
            let mut inner = self.shared.lock();
            inner.should_reconnect = false;
            inner.cancel_timer();
            let socket = inner.detach();
            if let Some(next) = next_state(inner.state, Transition::Closed) {
                inner.transition(next, Some(CLIENT_CLOSE_DETAIL.to_string()));
                self.shared.metrics.connection_closed();
            }
            socket
        };

        if let Some(mut socket) = socket {
            socket.close();
        }
        info!(client_id = %self.shared.id, "Live channel disconnected by client");
        self.shared.drain();
    }

    /// Register a status subscriber; it is invoked once with the current
    /// state, then on every later transition
    ///
    /// Transitions queued before registration are never delivered to it. The
    /// first call happens before this returns unless another thread, or the
    /// caller's own enclosing callback, is delivering notifications; it is
    /// then made in order by that dispatcher.
    pub fn on_status_change(&self, callback: StatusCallback) -> Disposer {
        let disposer = {
            let mut inner = self.shared.lock();
            let disposer = self
                .shared
                .registry
                .add_status(callback.clone(), inner.status_seq);
            let state = inner.state;
            inner.outbox.push_back(Notification::Prime(callback, state));
            disposer
        };

        self.shared.drain();
        disposer
    }

    /// Register a subscriber for every decoded message
    pub fn on_message(&self, callback: MessageCallback) -> Disposer {
        self.shared.registry.add_message(callback)
    }

    /// Register a subscriber for decoded messages of one type
    pub fn subscribe(&self, kind: impl Into<MessageKind>, callback: MessageCallback) -> Disposer {
        let kind = kind.into();
        self.shared.registry.add_typed(kind.as_str(), callback)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Copy of the diagnostic event log, oldest first
    pub fn events(&self) -> Vec<EventLogEntry> {
        self.shared.lock().log.snapshot()
    }

    /// Delay the next automatic retry would wait
    pub fn next_reconnect_delay(&self) -> Duration {
        self.shared.lock().backoff.peek()
    }

    /// Whether a reconnect timer is armed
    pub fn reconnect_pending(&self) -> bool {
        self.shared.lock().reconnect_timer.is_some()
    }

    /// Whether the manager intends to stay connected
    pub fn should_reconnect(&self) -> bool {
        self.shared.lock().should_reconnect
    }

    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("id", &self.shared.id)
            .field("url", &self.shared.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_connect(self: &Arc<Self>) {
        let generation = {
            let mut inner = self.lock();
            let Some(next) = next_state(inner.state, Transition::Connect) else {
                debug!(state = %inner.state, "Connect ignored; socket already live");
                return;
            };

            inner.cancel_timer();
            inner.generation += 1;
            let generation = inner.generation;
            inner.active = Some(ActiveSocket {
                generation,
                handle: None,
            });
            inner.transition(next, None);
            generation
        };

        self.metrics.connection_attempted();
        debug!(generation, url = %self.url, "Opening socket");

        match self.transport.open(&self.url, self.sink_for(generation)) {
            Ok(socket) => {
                let superseded = {
                    let mut inner = self.lock();
                    match inner.active.as_mut() {
                        Some(active) if active.generation == generation => {
                            active.handle = Some(socket);
                            None
                        }
                        _ => Some(socket),
                    }
                };
                if let Some(mut socket) = superseded {
                    debug!(generation, "Socket superseded while opening; closing it");
                    socket.close();
                }
            }
            Err(e) => self.handle_event(generation, TransportEvent::Error(e.to_string())),
        }

        self.drain();
    }

    fn sink_for(self: &Arc<Self>, generation: u64) -> EventSink {
        let shared = Arc::downgrade(self);
        EventSink::new(move |event| {
            if let Some(shared) = Weak::upgrade(&shared) {
                shared.handle_event(generation, event);
                shared.drain();
            }
        })
    }

    fn handle_event(self: &Arc<Self>, generation: u64, event: TransportEvent) {
        let to_close = {
            let mut inner = self.lock();
            if !inner.is_current(generation) {
                self.metrics.stale_event();
                debug!(generation, current = inner.generation, event = event.name(), "Ignoring event from stale socket");
                return;
            }

            match event {
                TransportEvent::Opened => {
                    match next_state(inner.state, Transition::Opened) {
                        Some(next) => {
                            inner.backoff.reset();
                            inner.transition(next, None);
                            self.metrics.connection_established();
                        }
                        None => warn!(state = %inner.state, "Unexpected open signal"),
                    }
                    None
                }
                TransportEvent::Frame(text) => {
                    match PushMessage::decode(&text) {
                        Ok(message) => {
                            inner.log.record(LogEvent::message(message.message_type()));
                            inner.outbox.push_back(Notification::Message(message));
                        }
                        Err(e) => self.drop_frame(&mut inner, &e.to_string()),
                    }
                    None
                }
                TransportEvent::Undecodable(detail) => {
                    self.drop_frame(&mut inner, &detail);
                    None
                }
                TransportEvent::Error(detail) => {
                    self.metrics.transport_error();
                    let detail = sanitize_detail(&detail);
                    warn!(detail = %detail, "Transport error; forcing close");
                    inner.log.record(LogEvent::error(detail.clone()));
                    let socket = inner.detach();
                    self.close_and_schedule(&mut inner, detail);
                    socket
                }
                TransportEvent::Closed { code, reason } => {
                    let detail = match code {
                        Some(code) => format!("closed ({code}) {reason}"),
                        None => format!("closed: {reason}"),
                    };
                    let socket = inner.detach();
                    self.close_and_schedule(&mut inner, sanitize_detail(detail.trim_end()));
                    socket
                }
            }
        };

        if let Some(mut socket) = to_close {
            socket.close();
        }
    }

    /// Count and log a frame no subscriber will see
    fn drop_frame(&self, inner: &mut Inner, reason: &str) {
        self.metrics.decode_error();
        warn!("Dropping undecodable frame: {}", reason);
        inner
            .log
            .record(LogEvent::error(sanitize_detail(&format!("undecodable frame: {reason}"))));
    }

    /// Enter `disconnected` after the socket went away, then arm a retry
    fn close_and_schedule(self: &Arc<Self>, inner: &mut Inner, detail: String) {
        if let Some(next) = next_state(inner.state, Transition::Closed) {
            inner.transition(next, Some(detail));
            self.metrics.connection_closed();
        }
        self.schedule_reconnect(inner);
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        if !inner.should_reconnect {
            self.metrics.reconnect_suppressed();
            debug!("Reconnect not scheduled; client asked to stay disconnected");
            return;
        }

        inner.cancel_timer();
        let delay = inner.backoff.next_delay();
        let id = inner.next_timer_id;
        inner.next_timer_id += 1;

        let shared = Arc::downgrade(self);
        let handle = self.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(shared) = Weak::upgrade(&shared) {
                    shared.on_reconnect_timer(id);
                }
            }),
        );
        inner.reconnect_timer = Some(PendingTimer { id, handle });
        self.metrics.reconnect_scheduled();
        info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
    }

    fn on_reconnect_timer(self: &Arc<Self>, id: u64) {
        {
            let mut inner = self.lock();
            let armed = inner
                .reconnect_timer
                .as_ref()
                .is_some_and(|timer| timer.id == id);
            if !armed {
                debug!(timer_id = id, "Ignoring cancelled reconnect timer");
                return;
            }
            inner.reconnect_timer = None;

            if !inner.should_reconnect {
                self.metrics.reconnect_suppressed();
                debug!("Reconnect suppressed at fire time");
                return;
            }
            if inner.state != ConnectionState::Disconnected {
                return;
            }
        }

        let _span = connection_span!(client_id = %self.id, op = "reconnect").entered();
        self.begin_connect();
    }

    /// Deliver queued notifications unless another caller already is
    fn drain(&self) {
        {
            let mut inner = self.lock();
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }

        loop {
            let next = {
                let mut inner = self.lock();
                match inner.outbox.pop_front() {
                    Some(next) => next,
                    None => {
                        inner.dispatching = false;
                        break;
                    }
                }
            };

            let panicked = match next {
                Notification::Status(state, seq) => self.registry.publish_status(state, seq),
                Notification::Prime(callback, state) => {
                    self.registry.prime_status(&callback, state)
                }
                Notification::Message(message) => {
                    self.metrics.message_delivered();
                    self.registry.publish_message(&message)
                }
            };
            self.metrics.subscriber_panics(panicked);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.cancel_timer();
        if let Some(mut socket) = inner.detach() {
            socket.close();
        }
    }
}
