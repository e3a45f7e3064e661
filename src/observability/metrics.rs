//! Thread-safe connection metrics
//!
//! Atomic counters owned by one connection manager. Counters only ever go
//! up; a [`MetricsSnapshot`] is a consistent-enough copy for diagnostics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Counters for one connection manager
#[derive(Debug)]
pub struct ConnectionMetrics {
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connections_closed: AtomicU64,
    reconnects_scheduled: AtomicU64,
    reconnects_suppressed: AtomicU64,
    messages_delivered: AtomicU64,
    decode_errors: AtomicU64,
    transport_errors: AtomicU64,
    stale_events: AtomicU64,
    subscriber_panics: AtomicU64,
    last_connected_at: AtomicU64,
    created_at: AtomicU64,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self {
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            reconnects_scheduled: AtomicU64::new(0),
            reconnects_suppressed: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            stale_events: AtomicU64::new(0),
            subscriber_panics: AtomicU64::new(0),
            last_connected_at: AtomicU64::new(0),
            created_at: AtomicU64::new(current_timestamp()),
        }
    }

    pub fn connection_attempted(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.last_connected_at
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_suppressed(&self) {
        self.reconnects_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stale_event(&self) {
        self.stale_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_panics(&self, count: usize) {
        if count > 0 {
            self.subscriber_panics
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_connected_at = self.last_connected_at.load(Ordering::Relaxed);
        MetricsSnapshot {
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            connections_established: self.connections_established.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            reconnects_suppressed: self.reconnects_suppressed.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            stale_events: self.stale_events.load(Ordering::Relaxed),
            subscriber_panics: self.subscriber_panics.load(Ordering::Relaxed),
            last_connected_at: (last_connected_at > 0).then_some(last_connected_at),
            uptime_seconds: current_timestamp()
                .saturating_sub(self.created_at.load(Ordering::Relaxed)),
        }
    }
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable copy of [`ConnectionMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connections_closed: u64,
    pub reconnects_scheduled: u64,
    pub reconnects_suppressed: u64,
    pub messages_delivered: u64,
    pub decode_errors: u64,
    pub transport_errors: u64,
    pub stale_events: u64,
    pub subscriber_panics: u64,
    /// Unix seconds of the last successful open
    pub last_connected_at: Option<u64>,
    pub uptime_seconds: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let snapshot = ConnectionMetrics::new().snapshot();
        assert_eq!(snapshot.connection_attempts, 0);
        assert_eq!(snapshot.messages_delivered, 0);
        assert_eq!(snapshot.last_connected_at, None);
    }

    #[test]
    fn test_counters_increment() {
        let metrics = ConnectionMetrics::new();
        metrics.connection_attempted();
        metrics.connection_attempted();
        metrics.connection_established();
        metrics.decode_error();
        metrics.subscriber_panics(0);
        metrics.subscriber_panics(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connection_attempts, 2);
        assert_eq!(snapshot.connections_established, 1);
        assert_eq!(snapshot.decode_errors, 1);
        assert_eq!(snapshot.subscriber_panics, 3);
        assert!(snapshot.last_connected_at.is_some());
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(ConnectionMetrics::new().snapshot()).unwrap();
        assert_eq!(json["reconnects_scheduled"], 0);
        assert!(json["last_connected_at"].is_null());
    }
}
