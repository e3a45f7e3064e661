//! livewire - auto-reconnecting live-updates client
//!
//! A persistent client for a single server-push channel. It keeps at most one
//! socket open, recovers from drops with capped exponential backoff, and fans
//! decoded messages out to subscribers without letting a failing subscriber,
//! a malformed frame, or a network blip take the client down.
//!
//! # Overview
//!
//! - [`ConnectionManager`] owns the socket and the connection state machine
//! - [`subscription`] holds the status, all-message and per-type channels
//! - [`event_log`] keeps the last 100 diagnostic entries
//! - [`transport`] abstracts the socket; [`WebSocketTransport`] is the real one
//! - [`observability`] wires logging, metrics and the diagnostics server
//!
//! # Quick Start
//!
//! ```no_run
//! use livewire::{Callback, ConnectionManager, ConnectionState, PushMessage};
//! use livewire::{TokioScheduler, WebSocketTransport};
//! use livewire::protocol::channel_url;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = channel_url("https://markets.example.com/board", "/ws")?;
//! let manager = ConnectionManager::new(
//!     url,
//!     Arc::new(WebSocketTransport::current(Duration::from_secs(10))),
//!     Arc::new(TokioScheduler::current()),
//! );
//!
//! let status = manager.on_status_change(Callback::new(|state: &ConnectionState| {
//!     println!("channel is {state}");
//! }));
//! let prices = manager.subscribe("price", Callback::new(|message: &PushMessage| {
//!     println!("price update: {}", message.to_json());
//! }));
//!
//! manager.connect();
//! tokio::time::sleep(Duration::from_secs(30)).await;
//!
//! prices.dispose();
//! status.dispose();
//! manager.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod event_log;
pub mod observability;
pub mod protocol;
pub mod subscription;
pub mod testing;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use connection::{
    ConnectionManager, ConnectionState, ManagerOptions, ReconnectConfig, Scheduler,
    TokioScheduler,
};
pub use error::{LiveError, LiveResult};
pub use event_log::{EventLog, EventLogEntry, LogEvent};
pub use protocol::{MessageKind, PushMessage};
pub use subscription::{Callback, Disposer, MessageCallback, StatusCallback};
pub use transport::{Transport, TransportEvent, WebSocketTransport};
