// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ingress HTTP API.
//!
//! The outward face of the gateway: accept a user message, run it through
//! the router, answer with what happened. Streaming responses do not flow
//! back through here; bridges push them to the callback endpoint directly.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use roost_core::store::StateStore;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::GatewayError;
use crate::router::MessageRouter;

/// Shared state for the ingress handlers.
#[derive(Clone)]
pub struct AppState {
    /// The message router behind `POST /v1/messages`.
    pub router: Arc<MessageRouter>,
    /// Store handle for status lookups.
    pub store: Arc<dyn StateStore>,
}

/// Build the ingress router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/messages", post(post_message))
        .route("/v1/users/{user_key}/status", get(user_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// One inbound message, as posted by the push transport edge.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngressMessage {
    user_id: String,
    message: String,
    #[serde(default)]
    channel: Option<String>,
    connection_id: String,
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn post_message(
    State(state): State<AppState>,
    Json(body): Json<IngressMessage>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let channel = body.channel.as_deref().unwrap_or("web");
    let outcome = state
        .router
        .route(&body.user_id, &body.message, channel, &body.connection_id)
        .await?;
    Ok(Json(json!({ "result": outcome })))
}

async fn user_status(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    use roost_core::model::TaskStatus;

    // Absent covers Idle and expired records; the caller only needs to
    // know whether a message would be served warm.
    let status = match state.store.get_task_state(&user_key).await? {
        Some(state) => match state.status {
            TaskStatus::Starting => "starting",
            TaskStatus::Running => "running",
            TaskStatus::Idle => "idle",
        },
        None => "idle",
    };
    Ok(Json(json!({ "status": status })))
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        error!(error = %self, "Request failed");
        let code = match &self {
            GatewayError::Store(e) => e.error_code(),
            GatewayError::Launcher(_) => "LAUNCHER_ERROR",
            GatewayError::Other(_) => "INTERNAL_ERROR",
        };
        let body = Json(json!({
            "error": { "code": code, "message": self.to_string() }
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
