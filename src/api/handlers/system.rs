use super::AppState;
use crate::api::models::{HealthResponse, HealthStatus};
use axum::{extract::State, Json};

/// Handler for GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let hub_service = &state.hub_service;
    Json(HealthResponse {
        status: HealthStatus::Ok,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        connections: hub_service.hub().connection_count().await,
        running_profile: hub_service.execution().active_profile().await,
    })
}
