// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The bridge's instance-local HTTP surface.
//!
//! Four routes: a health probe, message intake, a status snapshot, and a
//! shutdown trigger. The gateway is the only expected caller, so
//! everything except `/health` sits behind the shared bearer token.
//! `POST /message` replies immediately; the response streams out through
//! the callback endpoint, never through this surface.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::SecondsFormat;
use roost_core::model::BridgeMessage;
use serde_json::json;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::lifecycle::Lifecycle;
use crate::processing::MessageProcessor;

/// Shared state for the bridge handlers.
#[derive(Clone)]
pub struct BridgeState {
    /// Activity tracking and TaskState writes.
    pub lifecycle: Arc<Lifecycle>,
    /// The processing pipeline behind `POST /message`.
    pub processor: Arc<MessageProcessor>,
    /// Bearer token required on everything except `/health`.
    pub auth_token: String,
    /// Signalled when a shutdown is requested over HTTP.
    pub shutdown: Arc<Notify>,
}

/// Build the bridge router.
pub fn app(state: BridgeState) -> Router {
    let protected = Router::new()
        .route("/message", post(post_message))
        .route("/status", get(get_status))
        .route("/shutdown", post(post_shutdown))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_bearer(
    State(state): State<BridgeState>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == state.auth_token);

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }
    next.run(request).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn post_message(
    State(state): State<BridgeState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let Ok(message) = serde_json::from_value::<BridgeMessage>(body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing required fields" })),
        )
            .into_response();
    };

    state.lifecycle.touch();

    // Reply before processing; failures become error events on the
    // caller's connection, pushed from inside process.
    let processor = state.processor.clone();
    tokio::spawn(async move {
        let _ = processor
            .process(
                &message.user_id,
                &message.message,
                &message.channel,
                &message.connection_id,
            )
            .await;
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "processing" })),
    )
        .into_response()
}

async fn get_status(State(state): State<BridgeState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "uptime": state.lifecycle.uptime_secs(),
        "lastActivity": state
            .lifecycle
            .last_activity()
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn post_shutdown(State(state): State<BridgeState>) -> Json<serde_json::Value> {
    info!("Shutdown requested over HTTP");
    state.shutdown.notify_one();
    Json(json!({ "status": "shutting_down" }))
}
