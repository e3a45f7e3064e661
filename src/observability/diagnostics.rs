//! Diagnostics HTTP server
//!
//! Read-only endpoints over one connection manager for operators and
//! orchestration probes. Nothing served here changes connection behavior.
//!
//! - `GET /events` - event-log snapshot, oldest first
//! - `GET /status` - state, client id, reconnect intent and metrics
//! - `GET /health` - 200 when connected, 503 otherwise
//! - `GET /live`   - always 200 while the process runs

use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{LiveError, LiveResult};
use crate::observability::metrics::MetricsSnapshot;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::Filter;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub client_id: Uuid,
    pub url: String,
    pub state: ConnectionState,
    pub should_reconnect: bool,
    pub reconnect_pending: bool,
    pub next_reconnect_delay_ms: u64,
    pub metrics: MetricsSnapshot,
    pub timestamp: u64,
}

impl StatusResponse {
    fn from_manager(manager: &ConnectionManager) -> Self {
        Self {
            client_id: manager.id(),
            url: manager.url().to_string(),
            state: manager.state(),
            should_reconnect: manager.should_reconnect(),
            reconnect_pending: manager.reconnect_pending(),
            next_reconnect_delay_ms: manager.next_reconnect_delay().as_millis() as u64,
            metrics: manager.metrics(),
            timestamp: current_timestamp(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub state: ConnectionState,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub timestamp: u64,
}

/// All diagnostics routes for `manager`
pub fn routes(
    manager: ConnectionManager,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let events_manager = manager.clone();
    let events_route = warp::path("events")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || warp::reply::json(&events_manager.events()));

    let status_manager = manager.clone();
    let status_route = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || warp::reply::json(&StatusResponse::from_manager(&status_manager)));

    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            let state = manager.state();
            let healthy = state == ConnectionState::Connected;
            let response = HealthResponse {
                status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
                state,
                timestamp: current_timestamp(),
            };
            let code = if healthy {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            warp::reply::with_status(warp::reply::json(&response), code)
        });

    let live_route = warp::path("live")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&LivenessResponse {
                alive: true,
                timestamp: current_timestamp(),
            })
        });

    events_route
        .or(status_route)
        .or(health_route)
        .or(live_route)
        .with(warp::cors().allow_any_origin())
}

/// HTTP diagnostics server for one connection manager
pub struct DiagnosticsServer {
    manager: ConnectionManager,
    port: u16,
}

impl DiagnosticsServer {
    pub fn new(manager: ConnectionManager, port: u16) -> Self {
        Self { manager, port }
    }

    /// Bind and serve until the task is dropped
    ///
    /// Returns the bound address once listening; port 0 picks a free port.
    pub fn start(self) -> LiveResult<SocketAddr> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let (bound, server) = warp::serve(routes(self.manager))
            .try_bind_ephemeral(addr)
            .map_err(|e| LiveError::internal(format!("diagnostics server bind failed: {e}")))?;

        info!("Starting diagnostics server on {}", bound);
        tokio::spawn(server);
        Ok(bound)
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
