//! Diagnostics HTTP routes exercised with `warp::test`

use livewire::observability::diagnostics::routes;
use livewire::testing::{ManualScheduler, MockTransport};
use livewire::ConnectionManager;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

fn manager() -> (ConnectionManager, MockTransport, ManualScheduler) {
    let transport = MockTransport::new();
    let scheduler = ManualScheduler::new();
    let manager = ConnectionManager::new(
        Url::parse("wss://markets.example.com/ws").unwrap(),
        Arc::new(transport.clone()),
        Arc::new(scheduler.clone()),
    );
    (manager, transport, scheduler)
}

async fn get(manager: &ConnectionManager, path: &str) -> (u16, Value) {
    let response = warp::test::request()
        .method("GET")
        .path(path)
        .reply(&routes(manager.clone()))
        .await;
    let status = response.status().as_u16();
    let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_reflects_connection_state() {
    let (manager, transport, _) = manager();

    let (status, body) = get(&manager, "/health").await;
    assert_eq!(status, 503);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["state"], "disconnected");

    manager.connect();
    transport.last().unwrap().open();

    let (status, body) = get(&manager, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["state"], "connected");
}

#[tokio::test]
async fn test_events_lists_log_oldest_first() {
    let (manager, transport, _) = manager();
    manager.connect();
    let socket = transport.last().unwrap();
    socket.open();
    socket.frame(r#"{"type":"news","headline":"Open"}"#);
    socket.frame("garbage");

    let (status, body) = get(&manager, "/events").await;
    assert_eq!(status, 200);

    let entries = body.as_array().unwrap();
    let kinds: Vec<&str> = entries
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["status", "status", "message", "error"]);
    assert_eq!(entries[0]["state"], "connecting");
    assert_eq!(entries[1]["state"], "connected");
    assert_eq!(entries[2]["message_type"], "news");
    assert!(entries[3]["detail"].as_str().unwrap().contains("undecodable"));
    assert!(entries[0]["recorded_at"].is_string());
}

#[tokio::test]
async fn test_status_reports_reconnect_and_metrics() {
    let (manager, transport, scheduler) = manager();
    manager.connect();
    transport.last().unwrap().close_with(Some(1006), "abnormal");
    assert_eq!(scheduler.pending_count(), 1);

    let (status, body) = get(&manager, "/status").await;
    assert_eq!(status, 200);
    assert_eq!(body["client_id"], manager.id().to_string());
    assert_eq!(body["url"], "wss://markets.example.com/ws");
    assert_eq!(body["state"], "disconnected");
    assert_eq!(body["should_reconnect"], true);
    assert_eq!(body["reconnect_pending"], true);
    assert_eq!(body["next_reconnect_delay_ms"], 2000);
    assert_eq!(body["metrics"]["connection_attempts"], 1);
    assert_eq!(body["metrics"]["reconnects_scheduled"], 1);
}

#[tokio::test]
async fn test_live_and_unknown_paths() {
    let (manager, _, _) = manager();

    let (status, body) = get(&manager, "/live").await;
    assert_eq!(status, 200);
    assert_eq!(body["alive"], true);

    let (status, _) = get(&manager, "/nope").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_routes_are_read_only() {
    let (manager, _, _) = manager();
    let before = manager.events().len();

    for path in ["/events", "/status", "/health", "/live"] {
        let _ = get(&manager, path).await;
    }

    assert_eq!(manager.events().len(), before);
    assert_eq!(manager.metrics().connection_attempts, 0);
}
