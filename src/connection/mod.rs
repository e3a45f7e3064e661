//! Connection lifecycle: state machine, backoff, timers and the manager that
//! ties them to a transport

pub mod manager;
pub mod scheduler;
pub mod state;

pub use manager::{ConnectionManager, ManagerOptions};
pub use scheduler::{Scheduler, TimerHandle, TimerTask, TokioScheduler};
pub use state::{Backoff, ConnectionState, ReconnectConfig, Transition};
