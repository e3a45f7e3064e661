//! Tests for logging configuration and format parsing

use livewire::observability::logging::{
    build_filter, init_logging, parse_level, parse_spans, LogFormat,
};
use livewire::{connection_span, lifecycle_span};
use tracing::Level;

#[test]
fn test_log_format_parse() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("PRETTY"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("Compact"), LogFormat::Compact));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    for input in ["invalid", "", "xml", "  json  ", "json\n"] {
        assert!(
            matches!(LogFormat::parse(input), LogFormat::Json),
            "Failed for input: {input:?}"
        );
    }
}

#[test]
fn test_filter_mentions_noisy_dependencies() {
    // RUST_LOG replaces the built filter entirely
    if std::env::var("RUST_LOG").is_ok() {
        return;
    }

    let filter = build_filter(Level::DEBUG).to_string();
    for target in ["tungstenite=warn", "tokio_tungstenite=warn", "hyper=warn", "warp=warn"] {
        assert!(filter.contains(target), "missing {target} in {filter}");
    }
    assert!(filter.contains("debug"));
}

#[test]
fn test_init_logging_twice_does_not_panic() {
    init_logging(Level::INFO, LogFormat::Compact, false);
    init_logging(Level::DEBUG, LogFormat::Json, true);
    tracing::info!("logging initialised");
}

#[test]
fn test_span_macros_are_exported() {
    let client_id = "test-client";
    let span = connection_span!(client_id = %client_id, op = "connect");
    let _guard = span.enter();
    let _lifecycle = lifecycle_span!(phase = "shutdown").entered();
}

#[test]
fn test_env_values_parse_like_init_default_logging() {
    assert_eq!(parse_level("debug"), Level::DEBUG);
    assert_eq!(parse_level("verbose"), Level::INFO);
    assert!(parse_spans("TRUE"));
    assert!(!parse_spans("yes"));
}
