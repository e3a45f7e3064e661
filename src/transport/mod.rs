//! Transport layer for the live channel
//!
//! This module provides the transport abstraction the connection manager
//! drives, and a WebSocket implementation of it.
//!
//! A transport opens sockets. Each socket reports what happens to it through
//! the [`EventSink`] it was opened with; the manager builds one sink per
//! connection attempt, so events from a superseded socket can be told apart
//! and dropped.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub mod websocket;

pub use websocket::WebSocketTransport;

/// What a socket can report
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The socket finished its handshake
    Opened,
    /// A text frame arrived
    Frame(String),
    /// A frame arrived that cannot be read as text
    Undecodable(String),
    /// The socket closed; emitted once per socket
    Closed { code: Option<u16>, reason: String },
    /// The transport failed; a `Closed` normally follows
    Error(String),
}

impl TransportEvent {
    pub fn closed(code: Option<u16>, reason: impl Into<String>) -> Self {
        TransportEvent::Closed {
            code,
            reason: reason.into(),
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Opened => "opened",
            TransportEvent::Frame(_) => "frame",
            TransportEvent::Undecodable(_) => "undecodable",
            TransportEvent::Closed { .. } => "closed",
            TransportEvent::Error(_) => "error",
        }
    }
}

/// Receiver side of one socket's events
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(TransportEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(TransportEvent) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.deliver)(event)
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn frame(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Frame(text.into()));
    }

    pub fn undecodable(&self, detail: impl Into<String>) {
        self.emit(TransportEvent::Undecodable(detail.into()));
    }

    pub fn closed(&self, code: Option<u16>, reason: impl Into<String>) {
        self.emit(TransportEvent::closed(code, reason));
    }

    pub fn error(&self, detail: impl Into<String>) {
        self.emit(TransportEvent::Error(detail.into()));
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Transport-level errors raised when a socket cannot even be created
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Unsupported channel URL: {0}")]
    UnsupportedUrl(String),
    #[error("Failed to open socket: {0}")]
    OpenFailed(String),
}

/// An open (or opening) socket owned by the connection manager
pub trait Socket: Send {
    /// Ask the socket to close; idempotent
    fn close(&mut self);
}

/// Transport trait for the live channel
///
/// Implementations must not call into the sink synchronously from `open`;
/// events are delivered from the transport's own task or callback context.
pub trait Transport: Send + Sync {
    fn open(&self, url: &Url, sink: EventSink) -> Result<Box<dyn Socket>, TransportError>;
}
