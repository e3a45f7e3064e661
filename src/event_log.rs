//! Bounded diagnostic history
//!
//! A fixed-capacity FIFO of connection transitions, message arrivals and
//! transport failures, each stamped when recorded. Callers only ever see
//! copies of the buffer.

use crate::connection::state::ConnectionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Default number of entries kept
pub const EVENT_LOG_CAPACITY: usize = 100;

/// What an entry records
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LogEvent {
    /// Connection transition
    Status {
        state: ConnectionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Arrival of a decoded push message
    Message { message_type: String },
    /// Transport failure or undecodable payload
    Error { detail: String },
}

impl LogEvent {
    pub fn status(state: ConnectionState) -> Self {
        LogEvent::Status {
            state,
            detail: None,
        }
    }

    pub fn status_with_detail(state: ConnectionState, detail: impl Into<String>) -> Self {
        LogEvent::Status {
            state,
            detail: Some(detail.into()),
        }
    }

    pub fn message(message_type: impl Into<String>) -> Self {
        LogEvent::Message {
            message_type: message_type.into(),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        LogEvent::Error {
            detail: detail.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LogEvent::Error { .. })
    }
}

/// A recorded event with its timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLogEntry {
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LogEvent,
}

/// Ring buffer of [`EventLogEntry`], oldest first
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<EventLogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    /// A capacity of zero is treated as one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Stamp `event` with the current time and append it, evicting the
    /// oldest entry when full
    pub fn record(&mut self, event: LogEvent) {
        self.push(EventLogEntry {
            recorded_at: Utc::now(),
            event,
        });
    }

    fn push(&mut self, entry: EventLogEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<EventLogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
