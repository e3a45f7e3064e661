//! WebSocket transport against a local warp server
//!
//! These run the real manager on tokio timers with short backoff delays.

use futures_util::{SinkExt, StreamExt};
use livewire::connection::ManagerOptions;
use livewire::event_log::LogEvent;
use livewire::{
    Callback, ConnectionManager, ConnectionState, PushMessage, ReconnectConfig, TokioScheduler,
    WebSocketTransport,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use url::Url;
use warp::ws::{Message, WebSocket, Ws};
use warp::Filter;

async fn serve<F, Fut>(handler: F) -> (SocketAddr, Arc<AtomicUsize>)
where
    F: Fn(WebSocket) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let upgrades = Arc::new(AtomicUsize::new(0));
    let counter = upgrades.clone();
    let route = warp::path("ws").and(warp::ws()).map(move |ws: Ws| {
        counter.fetch_add(1, Ordering::SeqCst);
        let handler = handler.clone();
        ws.on_upgrade(handler)
    });

    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (addr, upgrades)
}

fn manager_for(url: &str, connect_timeout: Duration) -> ConnectionManager {
    ConnectionManager::with_options(
        Url::parse(url).unwrap(),
        Arc::new(WebSocketTransport::current(connect_timeout)),
        Arc::new(TokioScheduler::current()),
        ManagerOptions {
            reconnect: ReconnectConfig {
                base_delay_ms: 50,
                max_delay_ms: 200,
            },
            ..Default::default()
        },
    )
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_frames_are_delivered_and_server_close_reconnects() {
    let (addr, upgrades) = serve(|socket: WebSocket| async move {
        let (mut tx, _rx) = socket.split();
        let _ = tx.send(Message::text(r#"{"type":"price","symbol":"ABC"}"#)).await;
        let _ = tx.send(Message::text("not json")).await;
        let _ = tx.send(Message::close_with(4000u16, "bye")).await;
    })
    .await;

    let manager = manager_for(&format!("ws://{addr}/ws"), Duration::from_secs(2));
    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    let prices = manager.subscribe(
        "price",
        Callback::new(move |message: &PushMessage| {
            received_clone
                .lock()
                .unwrap()
                .push(message.field("symbol").cloned());
        }),
    );

    manager.connect();
    assert!(wait_for(|| received.lock().unwrap().len() >= 2).await);
    manager.disconnect();
    prices.dispose();

    assert!(upgrades.load(Ordering::SeqCst) >= 2);
    assert_eq!(
        received.lock().unwrap()[0],
        Some(serde_json::json!("ABC"))
    );

    let metrics = manager.metrics();
    assert!(metrics.connections_established >= 2);
    assert!(metrics.decode_errors >= 1);
    assert!(metrics.reconnects_scheduled >= 1);

    let server_close = manager.events().into_iter().any(|entry| {
        matches!(
            entry.event,
            LogEvent::Status {
                state: ConnectionState::Disconnected,
                detail: Some(ref detail),
            } if detail.contains("4000") && detail.contains("bye")
        )
    });
    assert!(server_close);
}

#[tokio::test]
async fn test_non_utf8_binary_frame_is_reported() {
    let (addr, _) = serve(|socket: WebSocket| async move {
        let (mut tx, mut rx) = socket.split();
        let _ = tx.send(Message::binary(vec![0xff, 0xfe, 0xfd])).await;
        let _ = tx.send(Message::binary(br#"{"type":"price"}"#.to_vec())).await;
        // Hold the socket open until the client leaves
        while let Some(Ok(_)) = rx.next().await {}
    })
    .await;

    let manager = manager_for(&format!("ws://{addr}/ws"), Duration::from_secs(2));
    let delivered = Arc::new(AtomicUsize::new(0));
    let delivered_clone = delivered.clone();
    let prices = manager.subscribe(
        "price",
        Callback::new(move |_: &PushMessage| {
            delivered_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );

    manager.connect();
    assert!(wait_for(|| delivered.load(Ordering::SeqCst) == 1).await);
    manager.disconnect();
    prices.dispose();

    assert_eq!(manager.metrics().decode_errors, 1);
    let reported = manager.events().into_iter().any(|entry| {
        matches!(entry.event, LogEvent::Error { ref detail } if detail.contains("not UTF-8"))
    });
    assert!(reported);
}

#[tokio::test]
async fn test_disconnect_closes_server_side_and_stays_down() {
    let closed_by_client = Arc::new(AtomicUsize::new(0));
    let closed = closed_by_client.clone();
    let (addr, upgrades) = serve(move |socket: WebSocket| {
        let closed = closed.clone();
        async move {
            let (_tx, mut rx) = socket.split();
            while let Some(Ok(message)) = rx.next().await {
                if message.is_close() {
                    closed.fetch_add(1, Ordering::SeqCst);
                    break;
                }
            }
        }
    })
    .await;

    let manager = manager_for(&format!("ws://{addr}/ws"), Duration::from_secs(2));
    manager.connect();
    assert!(wait_for(|| manager.state() == ConnectionState::Connected).await);

    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(wait_for(|| closed_by_client.load(Ordering::SeqCst) == 1).await);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(upgrades.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.reconnect_pending());
}

#[tokio::test]
async fn test_handshake_timeout_is_a_transport_error() {
    // Accept TCP but never answer the upgrade
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let manager = manager_for(&format!("ws://{addr}/ws"), Duration::from_millis(100));
    manager.connect();
    assert!(wait_for(|| manager.metrics().transport_errors >= 1).await);
    manager.disconnect();

    let timed_out = manager.events().into_iter().any(|entry| {
        matches!(entry.event, LogEvent::Error { ref detail } if detail.contains("timed out"))
    });
    assert!(timed_out);
}
