use crate::config::ServiceDefinition;
use crate::error::ConfigError;
use crate::knowledge::{self, UNAVAILABLE_MESSAGE};
use crate::workflow::ApprovalDecision;
use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::PoisonError;

use super::{AppState, ApproveQuery, ChatRequest};

fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(json!({ "error": message.into() })))
}

/// GET /health
pub(super) async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "run_status": state.controller.status(),
    }))
}

/// GET /status: live fleet check, independent of any run
pub(super) async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.fleet_status().await)
}

/// POST /agent/run
pub(super) async fn handle_run(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.start() {
        Ok(_handle) => (
            StatusCode::OK,
            Json(json!({ "status": "started", "message": "Remediation run started" })),
        ),
        Err(e) => {
            tracing::warn!("run request refused: {e}");
            error_response(StatusCode::CONFLICT, e.to_string())
        }
    }
}

/// POST /agent/stop
pub(super) async fn handle_stop(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.stop() {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "stopping", "message": "Cancellation requested" })),
        ),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// POST /agent/approve?action=approve|reject
pub(super) async fn handle_approve(
    State(state): State<AppState>,
    Query(query): Query<ApproveQuery>,
) -> impl IntoResponse {
    let Some(decision) = query
        .action
        .as_deref()
        .and_then(|action| action.parse::<ApprovalDecision>().ok())
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid action. Use 'approve' or 'reject'.",
        );
    };

    match state.controller.start_resume(decision) {
        Ok(_handle) => (
            StatusCode::OK,
            Json(json!({ "status": "resumed", "decision": decision })),
        ),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// GET /agent/state
pub(super) async fn handle_agent_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.snapshot())
}

/// GET /memory
pub(super) async fn handle_memory(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "episodes": state.controller.episodes(),
        "summary": state.controller.memory_summary(),
    }))
}

/// GET /services
pub(super) async fn handle_services(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state
        .controller
        .engine()
        .services()
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    Json(registry.services().to_vec())
}

/// POST /services: add or replace a definition
pub(super) async fn handle_add_service(
    State(state): State<AppState>,
    body: Result<Json<ServiceDefinition>, JsonRejection>,
) -> impl IntoResponse {
    let Json(service) = match body {
        Ok(body) => body,
        Err(e) => {
            let message = format!("Invalid service definition: {e}");
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };
    let name = service.name.clone();

    let mut registry = state
        .controller
        .engine()
        .services()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    match registry.upsert(service) {
        Ok(()) => {
            tracing::info!(service = %name, "service definition saved");
            (StatusCode::OK, Json(json!({ "status": "saved", "name": name })))
        }
        Err(ConfigError::Validation(message)) => error_response(StatusCode::BAD_REQUEST, message),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// DELETE /services/{name}
pub(super) async fn handle_remove_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let mut registry = state
        .controller
        .engine()
        .services()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    match registry.remove(&name) {
        Ok(removed) => (
            StatusCode::OK,
            Json(json!({ "status": "removed", "name": removed.name })),
        ),
        Err(e @ ConfigError::UnknownService(_)) => {
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /chat: answer a question from the manuals
pub(super) async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => {
            let message = format!("Invalid chat request: {e}");
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Message must not be empty.");
    }

    let Some(kb) = state.controller.engine().knowledge() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_MESSAGE);
    };

    match knowledge::answer(kb.as_ref(), &request.message).await {
        Ok(answer) => (StatusCode::OK, Json(json!({ "answer": answer }))),
        Err(e) => {
            tracing::warn!("knowledge query failed: {e:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Knowledge base query failed: {e}"),
            )
        }
    }
}

/// GET /config: credentials redacted
pub(super) async fn handle_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.as_ref().clone())
}
