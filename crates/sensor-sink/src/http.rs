//! HTTP surface: alert ingestion, containment relay, and health check
//! (spec.md §6). Routed with `axum`, traced with `tower-http`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::alert_sink::{AlertSink, ContainResponse, IncomingAlertPayload};
use crate::registry::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<AlertSink>,
    pub sessions: Arc<SessionRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct ContainRequest {
    pub session_id: String,
    #[allow(dead_code)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

pub fn router(sink: Arc<AlertSink>, sessions: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/api/v1/alerts", post(post_alerts))
        .route("/api/v1/contain", post(post_contain))
        .route("/healthz", get(healthz))
        .with_state(AppState { sink, sessions })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn post_alerts(State(state): State<AppState>, Json(payload): Json<IncomingAlertPayload>) -> impl IntoResponse {
    match state.sink.process_alert(payload).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            warn!(error = %e, "alert processing failed");
            let body = ErrorBody { kind: "forensic_write_failed", message: e.to_string() };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn post_contain(State(state): State<AppState>, Json(req): Json<ContainRequest>) -> impl IntoResponse {
    let first = state.sessions.mark_contained(&req.session_id);
    let message =
        if first { format!("containment requested for {}", req.session_id) } else { format!("{} is already contained", req.session_id) };
    info!(session_id = %req.session_id, first_request = first, "containment command received");
    Json(ContainResponse { success: true, session_id: req.session_id, message })
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.sink.health().await;
    Json(serde_json::json!({
        "status": "ok",
        "anchor_queue_depth": health.anchor_queue_depth,
        "model_loaded": health.model_loaded,
    }))
}
