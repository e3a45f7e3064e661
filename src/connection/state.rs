//! Pure connection state management
//!
//! Connection states, the transition table that drives them, and the
//! reconnect backoff arithmetic. Nothing in here performs I/O.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Connection state of the live channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket; initial state, and the resting state between retries
    #[default]
    Disconnected,
    /// A socket has been requested and has not opened yet
    Connecting,
    /// The transport reported the socket open
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    /// A socket exists (or is being opened) in this state
    pub fn is_live(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `connect()` or the reconnect timer asked for a socket
    Connect,
    /// The transport reported the socket open
    Opened,
    /// The socket closed, failed, or was torn down by the client
    Closed,
}

/// Next state for `transition` out of `from`, or `None` if the input is not
/// valid in that state
pub fn next_state(from: ConnectionState, transition: Transition) -> Option<ConnectionState> {
    use ConnectionState::*;
    match (from, transition) {
        (Disconnected, Transition::Connect) => Some(Connecting),
        (Connecting, Transition::Opened) => Some(Connected),
        (Connecting | Connected, Transition::Closed) => Some(Disconnected),
        _ => None,
    }
}

/// Log a state transition at the level it deserves
pub fn log_state_transition(from: ConnectionState, to: ConnectionState) {
    match (from, to) {
        (ConnectionState::Connecting, ConnectionState::Connected) => {
            info!("Live channel connected");
        }
        (ConnectionState::Connected, ConnectionState::Disconnected) => {
            warn!("Live channel connection lost");
        }
        (ConnectionState::Connecting, ConnectionState::Disconnected) => {
            warn!("Live channel connection attempt failed");
        }
        _ => {
            info!("Live channel state: {} -> {}", from, to);
        }
    }
}

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// First retry delay, and the delay restored after every successful open
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for the retry delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    16000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("base_delay_ms must be greater than 0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(format!(
                "max_delay_ms ({}) must be at least base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            ));
        }
        Ok(())
    }

    /// Delays produced by `attempts` consecutive failures from a cold start
    pub fn delay_sequence(&self, attempts: usize) -> Vec<u64> {
        let mut backoff = Backoff::new(self);
        (0..attempts)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect()
    }
}

/// Exponential backoff with a cap
///
/// Holds `base <= current <= cap` at all times.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: u64,
    cap: u64,
    current: u64,
}

impl Backoff {
    /// Build from config; a zero base is lifted to 1 ms and a cap below the
    /// base is raised to the base so the invariant holds for any input
    pub fn new(config: &ReconnectConfig) -> Self {
        let base = config.base_delay_ms.max(1);
        let cap = config.max_delay_ms.max(base);
        Self {
            base,
            cap,
            current: base,
        }
    }

    /// Delay for the retry being scheduled now; doubles the next one up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.cap);
        Duration::from_millis(delay)
    }

    /// Delay the next retry would get, without advancing
    pub fn peek(&self) -> Duration {
        Duration::from_millis(self.current)
    }

    /// Back to the base delay after a successful open
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base)
    }

    pub fn cap(&self) -> Duration {
        Duration::from_millis(self.cap)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(&ReconnectConfig::default())
    }
}
