//! Error types for the live-updates client
//!
//! Runtime failures (bad frames, dropped sockets) never surface as errors to
//! callers; they are recorded in the event log. The types here cover setup
//! and the command line entry points.

use crate::config::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Longest detail string kept in an event-log entry
pub const MAX_DETAIL_LEN: usize = 500;

/// Main error type for client setup
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LiveError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type for client setup
pub type LiveResult<T> = Result<T, LiveError>;

static SECRET_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(password|token|key|secret|auth)[=:]\s*[^\s&]+").ok());

static CREDENTIALS_IN_URL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)([a-z][a-z0-9+.-]*://)[^/\s:@]+:[^/\s@]+@").ok());

/// Redact secrets and bound the length of a failure detail before it is
/// stored where operators can read it
pub fn sanitize_detail(detail: &str) -> String {
    let mut sanitized = detail.to_string();

    if let Some(pattern) = SECRET_PATTERN.as_ref() {
        sanitized = pattern.replace_all(&sanitized, "${1}=***").to_string();
    }

    if let Some(pattern) = CREDENTIALS_IN_URL.as_ref() {
        sanitized = pattern.replace_all(&sanitized, "${1}***@").to_string();
    }

    if sanitized.len() > MAX_DETAIL_LEN {
        let suffix = "...[truncated]";
        let mut cut = MAX_DETAIL_LEN - suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], suffix);
    }

    sanitized
}
