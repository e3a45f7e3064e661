//! Observability for the live-updates client
//!
//! Structured logging, per-connection metrics, and the HTTP diagnostics
//! surface over the event log.

pub mod diagnostics;
pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use diagnostics::DiagnosticsServer;
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{ConnectionMetrics, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{connection_span, lifecycle_span};
