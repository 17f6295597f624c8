// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::application::{AgentOrchestrator, DispatchError, Dispatcher, ProcessorOrchestrator};
use crate::domain::alert::AlertPayload;
use crate::domain::repository::WebhookStorage;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

pub struct AppState {
    pub storage: Arc<dyn WebhookStorage>,
    pub dispatcher: Arc<Dispatcher>,
    pub agent_orchestrator: Arc<AgentOrchestrator>,
    pub processor_orchestrator: Arc<ProcessorOrchestrator>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/receive", post(receive_webhook))
        .route("/webhooks/stats", get(webhook_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AlertPayload>,
) -> impl IntoResponse {
    let event = match state.storage.store_event(payload).await {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Failed to store webhook event");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    let event_id = event.id;
    // Processing outlives the request, so it gets its own token.
    let queued = match state.dispatcher.submit(CancellationToken::new(), event) {
        Ok(()) => true,
        Err(DispatchError::QueueFull) => false,
        Err(e) => {
            warn!(event_id, error = %e, "Webhook stored but not dispatched");
            false
        }
    };

    (
        StatusCode::ACCEPTED,
        Json(json!({ "event_id": event_id, "queued": queued })),
    )
}

async fn webhook_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "dispatcher": state.dispatcher.stats(),
        "agents": state.agent_orchestrator.stats(),
        "processors": state.processor_orchestrator.list_processors(),
    }))
}
