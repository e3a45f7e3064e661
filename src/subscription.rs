//! Subscription fan-out
//!
//! Three independent channels: connection status, every decoded message, and
//! decoded messages of one type. Each channel is an ordered set of
//! [`Callback`]s keyed by identity, so registering the same callback twice
//! still delivers each event to it once.

use crate::connection::state::ConnectionState;
use crate::protocol::PushMessage;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::error;

/// Shared, identity-compared subscriber callback
///
/// Clones share identity; two `Callback::new` calls never do, even with the
/// same closure body.
pub struct Callback<T: ?Sized>(Arc<dyn Fn(&T) + Send + Sync>);

impl<T: ?Sized> Callback<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Identity comparison
    pub fn same_as(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }

    /// Invoke with the panic contained; returns false if the callback panicked
    pub fn invoke(&self, value: &T) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.0)(value))).is_ok()
    }
}

impl<T: ?Sized> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

pub type StatusCallback = Callback<ConnectionState>;
pub type MessageCallback = Callback<PushMessage>;

/// Undoes one registration when [`Disposer::dispose`] is called
///
/// Dropping a disposer without calling `dispose` leaves the callback
/// registered.
#[must_use = "the callback stays registered until `dispose` is called"]
pub struct Disposer {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposer {
    fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A disposer with nothing to undo
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn dispose(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

/// Ordered set of callbacks, each tagged with the sequence number current
/// when it was registered
struct SubscriberSet<T: ?Sized> {
    entries: Vec<(Callback<T>, u64)>,
}

impl<T: ?Sized> SubscriberSet<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn insert(&mut self, callback: Callback<T>, since: u64) {
        if !self.contains(&callback) {
            self.entries.push((callback, since));
        }
    }

    fn remove(&mut self, callback: &Callback<T>) {
        self.entries.retain(|(c, _)| !c.same_as(callback));
    }

    fn contains(&self, callback: &Callback<T>) -> bool {
        self.entries.iter().any(|(c, _)| c.same_as(callback))
    }

    fn snapshot(&self) -> Vec<Callback<T>> {
        self.entries.iter().map(|(c, _)| c.clone()).collect()
    }

    /// Callbacks registered before event `seq` was queued
    fn snapshot_before(&self, seq: u64) -> Vec<Callback<T>> {
        self.entries
            .iter()
            .filter(|(_, since)| *since < seq)
            .map(|(c, _)| c.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct Channels {
    status: SubscriberSet<ConnectionState>,
    messages: SubscriberSet<PushMessage>,
    /// Created on first subscription per type; never pruned
    typed: HashMap<String, SubscriberSet<PushMessage>>,
}

/// Registry behind `on_status_change`, `on_message` and `subscribe`
///
/// Invocations happen on a snapshot taken outside the lock, so callbacks may
/// register or dispose other callbacks while being invoked.
pub struct SubscriptionRegistry {
    channels: Mutex<Channels>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(Channels {
                status: SubscriberSet::new(),
                messages: SubscriberSet::new(),
                typed: HashMap::new(),
            }),
        })
    }

    fn channels(&self) -> MutexGuard<'_, Channels> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a status subscriber that only hears transitions numbered
    /// after `since`
    pub fn add_status(self: &Arc<Self>, callback: StatusCallback, since: u64) -> Disposer {
        self.channels().status.insert(callback.clone(), since);
        let registry = Arc::downgrade(self);
        Disposer::new(move || {
            if let Some(registry) = Weak::upgrade(&registry) {
                registry.channels().status.remove(&callback);
            }
        })
    }

    pub fn add_message(self: &Arc<Self>, callback: MessageCallback) -> Disposer {
        self.channels().messages.insert(callback.clone(), 0);
        let registry = Arc::downgrade(self);
        Disposer::new(move || {
            if let Some(registry) = Weak::upgrade(&registry) {
                registry.channels().messages.remove(&callback);
            }
        })
    }

    pub fn add_typed(self: &Arc<Self>, message_type: &str, callback: MessageCallback) -> Disposer {
        self.channels()
            .typed
            .entry(message_type.to_string())
            .or_insert_with(SubscriberSet::new)
            .insert(callback.clone(), 0);

        let registry = Arc::downgrade(self);
        let message_type = message_type.to_string();
        Disposer::new(move || {
            if let Some(registry) = Weak::upgrade(&registry) {
                if let Some(set) = registry.channels().typed.get_mut(&message_type) {
                    set.remove(&callback);
                }
            }
        })
    }

    /// Deliver transition `seq` to every status subscriber registered before
    /// it was queued; returns how many panicked
    pub fn publish_status(&self, state: ConnectionState, seq: u64) -> usize {
        let subscribers = self.channels().status.snapshot_before(seq);
        invoke_all(&subscribers, &state, "status")
    }

    /// Give a newly registered status subscriber the state it registered
    /// under, unless it was disposed first; returns how many panicked
    pub fn prime_status(&self, callback: &StatusCallback, state: ConnectionState) -> usize {
        if !self.channels().status.contains(callback) {
            return 0;
        }
        invoke_all(std::slice::from_ref(callback), &state, "status")
    }

    /// Deliver a message to global subscribers, then to subscribers of its
    /// type; returns how many panicked
    pub fn publish_message(&self, message: &PushMessage) -> usize {
        let (global, typed) = {
            let channels = self.channels();
            let typed = channels
                .typed
                .get(message.message_type())
                .map(SubscriberSet::snapshot)
                .unwrap_or_default();
            (channels.messages.snapshot(), typed)
        };

        invoke_all(&global, message, "message") + invoke_all(&typed, message, message.message_type())
    }

    pub fn status_subscriber_count(&self) -> usize {
        self.channels().status.len()
    }

    pub fn message_subscriber_count(&self) -> usize {
        self.channels().messages.len()
    }

    pub fn typed_subscriber_count(&self, message_type: &str) -> usize {
        self.channels()
            .typed
            .get(message_type)
            .map(SubscriberSet::len)
            .unwrap_or(0)
    }

    /// Types that have ever had a subscriber
    pub fn known_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.channels().typed.keys().cloned().collect();
        types.sort();
        types
    }
}

fn invoke_all<T: ?Sized>(subscribers: &[Callback<T>], value: &T, channel: &str) -> usize {
    let mut panicked = 0;
    for subscriber in subscribers {
        if !subscriber.invoke(value) {
            panicked += 1;
            error!(channel = %channel, "Subscriber panicked; continuing fan-out");
        }
    }
    panicked
}
