use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use super::ApiState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Whether the backing database answers queries
    pub database_ok: bool,
    /// Number of live tracking sessions
    pub active_sessions: usize,
    /// Number of active pickup-zone monitors
    pub active_pickup_monitors: usize,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let database_ok = sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .is_ok();

    Json(HealthResponse {
        healthy: true,
        database_ok,
        active_sessions: state.sessions.active_count(),
        active_pickup_monitors: state.pickup_monitors.lock().unwrap().len(),
    })
}
