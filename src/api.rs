// HTTP API implementation
// This file provides the scrape endpoint plus small control endpoints
// for triggering and inspecting reconciliation passes
//
// Numan Thabit 2025 Nov

use crate::state::{ReconcileState, StatusSnapshot};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router as AxumRouter,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct ApiState {
    pub registry: Registry,
    pub reconcile: ReconcileState,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Create the HTTP router with scrape and control endpoints
pub fn create_api_router(state: ApiState) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health_check))
        .route("/metrics", get(scrape))
        .route("/api/v1/reconcile", post(trigger_reconcile))
        .route("/api/v1/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus text exposition of every registered family
async fn scrape(State(state): State<ApiState>) -> Response {
    let families = state.registry.gather();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buf) {
        warn!(error = %err, "metrics encoding failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buf,
    )
        .into_response()
}

/// Request an extra pass; it runs on the scheduling loop, not in this handler
async fn trigger_reconcile(State(state): State<ApiState>) -> StatusCode {
    state.reconcile.request_reconcile();
    StatusCode::ACCEPTED
}

/// Last report of every target
async fn get_status(State(state): State<ApiState>) -> Json<StatusSnapshot> {
    Json(state.reconcile.snapshot().await)
}
