//! Channel endpoint construction
//!
//! The live channel lives on the same host as the page that hosts the client.
//! Its scheme follows the page: secure pages use `wss`, plain pages use `ws`.

use thiserror::Error;
use url::Url;

/// Default path of the live-updates channel
pub const DEFAULT_CHANNEL_PATH: &str = "/ws";

#[derive(Debug, Error, PartialEq)]
pub enum EndpointError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Unsupported page scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),
    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Map a page scheme to its channel scheme
pub fn channel_scheme(page_scheme: &str) -> Result<&'static str, EndpointError> {
    match page_scheme {
        "https" | "wss" => Ok("wss"),
        "http" | "ws" => Ok("ws"),
        other => Err(EndpointError::UnsupportedScheme(other.to_string())),
    }
}

/// Build the channel URL for a page URL
///
/// # Examples
/// ```
/// use livewire::protocol::endpoint::channel_url;
///
/// let url = channel_url("https://board.example.com:8443/markets?tab=1", "/ws").unwrap();
/// assert_eq!(url.as_str(), "wss://board.example.com:8443/ws");
/// ```
pub fn channel_url(page_url: &str, channel_path: &str) -> Result<Url, EndpointError> {
    let page = Url::parse(page_url).map_err(|e| EndpointError::InvalidUrl {
        url: page_url.to_string(),
        reason: e.to_string(),
    })?;

    if page.host_str().is_none() {
        return Err(EndpointError::MissingHost(page_url.to_string()));
    }

    let scheme = channel_scheme(page.scheme())?;
    let mut channel = page.clone();
    channel
        .set_scheme(scheme)
        .map_err(|_| EndpointError::UnsupportedScheme(page.scheme().to_string()))?;
    channel.set_path(&normalize_path(channel_path));
    channel.set_query(None);
    channel.set_fragment(None);
    Ok(channel)
}

/// Parse an explicit channel URL, which must already use `ws` or `wss`
pub fn parse_channel_url(url: &str) -> Result<Url, EndpointError> {
    let parsed = Url::parse(url).map_err(|e| EndpointError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => {}
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    }
    if parsed.host_str().is_none() {
        return Err(EndpointError::MissingHost(url.to_string()));
    }
    Ok(parsed)
}

/// Single leading slash, no repeated or trailing slashes
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.trim_matches('/').is_empty() {
        return DEFAULT_CHANNEL_PATH.to_string();
    }

    let mut result = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    while result.contains("//") {
        result = result.replace("//", "/");
    }
    if result.len() > 1 && result.ends_with('/') {
        result.pop();
    }
    result
}
