//! Axum-based HTTP gateway over the run controller.
//!
//! - Request body size limits (64KB max)
//! - Request timeouts (30s)
//! - Runs started over HTTP execute on a background task; the handler
//!   returns as soon as the run is claimed.

mod handlers;
mod websocket;

use handlers::{
    handle_add_service, handle_agent_state, handle_approve, handle_chat, handle_config,
    handle_health, handle_memory, handle_remove_service, handle_run, handle_services,
    handle_status, handle_stop,
};
use websocket::ws_logs_handler;

use crate::config::Config;
use crate::controller::Controller;
use anyhow::{Context, Result};
use axum::{
    Router,
    http::StatusCode,
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Placeholder for secrets in `GET /config`.
pub const REDACTED: &str = "***";

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    /// Redacted view of the loaded configuration
    pub config: Arc<serde_json::Value>,
}

impl AppState {
    pub fn new(controller: Arc<Controller>, config: &Config) -> Self {
        Self {
            controller,
            config: Arc::new(redacted_config(config)),
        }
    }
}

/// Query of `POST /agent/approve`
#[derive(Debug, serde::Deserialize)]
pub struct ApproveQuery {
    pub action: Option<String>,
}

/// Body of `POST /chat`
#[derive(Debug, serde::Deserialize)]
pub struct ChatRequest {
    #[serde(alias = "query")]
    pub message: String,
}

/// Serialize `config` with credentials replaced by [`REDACTED`].
pub fn redacted_config(config: &Config) -> serde_json::Value {
    let mut config = config.clone();
    if config.oracle.api_key.is_some() {
        config.oracle.api_key = Some(REDACTED.into());
    }
    if config.remote.password.is_some() {
        config.remote.password = Some(REDACTED.into());
    }
    serde_json::to_value(&config).unwrap_or_default()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/agent/run", post(handle_run))
        .route("/agent/stop", post(handle_stop))
        .route("/agent/approve", post(handle_approve))
        .route("/agent/state", get(handle_agent_state))
        .route("/memory", get(handle_memory))
        .route("/services", get(handle_services).post(handle_add_service))
        .route("/services/{name}", delete(handle_remove_service))
        .route("/chat", post(handle_chat))
        .route("/config", get(handle_config))
        .route("/ws/logs", get(ws_logs_handler))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Bind `host:port` and serve until the process exits.
pub async fn run_gateway(
    host: &str,
    port: u16,
    controller: Arc<Controller>,
    config: &Config,
) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid gateway address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind gateway on {addr}"))?;

    run_gateway_with_listener(host, listener, controller, config).await
}

/// Serve from a pre-bound listener.
pub async fn run_gateway_with_listener(
    host: &str,
    listener: tokio::net::TcpListener,
    controller: Arc<Controller>,
    config: &Config,
) -> Result<()> {
    let actual_port = listener.local_addr()?.port();
    if !is_loopback(host) {
        tracing::warn!(host, "gateway bound to a non-loopback address without authentication");
    }

    println!("◆ Sentinel gateway listening on http://{host}:{actual_port}");
    println!("  GET  /health /status /agent/state /memory /services /config");
    println!("  POST /agent/run /agent/stop /agent/approve?action=approve|reject /chat");
    println!("  GET  /ws/logs → WebSocket event stream");
    println!("  Press Ctrl+C to stop.\n");

    let app = router(AppState::new(controller, config));
    axum::serve(listener, app).await?;

    Ok(())
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]")
}
