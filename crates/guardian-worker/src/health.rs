//! Health and metrics HTTP endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use guardian_queue::JobQueue;

use crate::fleet::FleetSupervisor;
use crate::stream::{StreamHealth, StreamState};

/// State shared by the health handlers.
#[derive(Clone)]
pub struct HealthState {
    pub fleet: Arc<FleetSupervisor>,
    pub queue: Option<Arc<dyn JobQueue>>,
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub active_streams: usize,
    pub streams: Vec<StreamHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<usize>,
}

/// Liveness plus per-camera stream state.
pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    let streams = state.fleet.snapshot().await;
    // Exhausted workers stay listed until the next reconcile reaps them.
    let active_streams = streams
        .iter()
        .filter(|s| s.state != StreamState::Terminated)
        .count();

    let queue_depth = match &state.queue {
        Some(queue) => match queue.len().await {
            Ok(depth) => Some(depth),
            Err(e) => {
                warn!(error = %e, "Failed to read queue depth");
                None
            }
        },
        None => None,
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        active_streams,
        streams,
        queue_depth,
    })
}

pub fn create_router(state: HealthState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
