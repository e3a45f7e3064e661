//! Configuration loading and validation tests
//!
//! Tests focus on what loading a file produces: parsed values, defaults,
//! the derived channel URL, and the error kind for bad input.

use livewire::config::{ClientConfig, ConfigError};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[endpoint]
page_url = "https://markets.example.com/board?tab=equities"
channel_path = "/live/"
connect_timeout_ms = 2500

[reconnect]
base_delay_ms = 250
max_delay_ms = 4000

[diagnostics]
event_log_capacity = 20
"#,
    );

    let config = assert_ok!(ClientConfig::load_from_file(temp_file.path()));

    assert_eq!(
        assert_ok!(config.channel_url()).as_str(),
        "wss://markets.example.com/live"
    );
    assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
    assert_eq!(config.reconnect.delay_sequence(6), vec![250, 500, 1000, 2000, 4000, 4000]);
    assert_eq!(config.diagnostics.event_log_capacity, 20);
}

#[test]
fn test_config_defaults_when_sections_missing() {
    let temp_file = write_config(
        r#"
[endpoint]
page_url = "http://localhost:3000/"
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.channel_url().unwrap().as_str(), "ws://localhost:3000/ws");
    assert_eq!(config.reconnect.base_delay_ms, 1000);
    assert_eq!(config.reconnect.max_delay_ms, 16000);
    assert_eq!(config.diagnostics.event_log_capacity, 100);
}

#[test]
fn test_config_explicit_url() {
    let temp_file = write_config(
        r#"
[endpoint]
url = "wss://push.example.com:8443/stream"
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(
        config.channel_url().unwrap().as_str(),
        "wss://push.example.com:8443/stream"
    );
}

#[test]
fn test_missing_file_is_read_error() {
    let result = ClientConfig::load_from_file(Path::new("/nonexistent/livewire.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("[endpoint\npage_url = ");
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_endpoint_section_is_parse_error() {
    let temp_file = write_config("[reconnect]\nbase_delay_ms = 10\n");
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_unsupported_page_scheme_rejected() {
    let temp_file = write_config(
        r#"
[endpoint]
page_url = "ftp://files.example.com/"
"#,
    );
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::Endpoint(_))));
}

#[test]
fn test_explicit_url_must_be_websocket() {
    let temp_file = write_config(
        r#"
[endpoint]
url = "https://push.example.com/stream"
"#,
    );
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::Endpoint(_))));
}

#[test]
fn test_inverted_backoff_rejected() {
    let temp_file = write_config(
        r#"
[endpoint]
page_url = "https://markets.example.com/"

[reconnect]
base_delay_ms = 8000
max_delay_ms = 1000
"#,
    );
    let result = ClientConfig::load_from_file(temp_file.path());
    match result {
        Err(ConfigError::InvalidConfig(message)) => assert!(message.contains("max_delay_ms")),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn test_endpoint_without_any_url_rejected() {
    let temp_file = write_config("[endpoint]\nchannel_path = \"/ws\"\n");
    let error = assert_err!(ClientConfig::load_from_file(temp_file.path()));
    assert!(error.to_string().contains("page_url or url"));
}

#[test]
fn test_zero_capacity_rejected() {
    let temp_file = write_config(
        r#"
[endpoint]
page_url = "https://markets.example.com/"

[diagnostics]
event_log_capacity = 0
"#,
    );
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_round_trips_through_toml() {
    let temp_file = write_config(
        r#"
[endpoint]
page_url = "https://markets.example.com/"

[diagnostics]
port = 9191
"#,
    );
    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = ClientConfig::from_toml_str(&rendered).unwrap();
    assert_eq!(reparsed.endpoint, config.endpoint);
    assert_eq!(reparsed.reconnect, config.reconnect);
}
