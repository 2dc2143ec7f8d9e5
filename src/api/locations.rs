use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{user_id, ApiState};
use crate::api::{bad_request, internal_error, not_found, ErrorResponse};
use crate::models::{LocationSample, PositionFix};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Compass heading in degrees, 0..360, if the device reports one
    pub heading_degrees: Option<f64>,
    /// Ground speed in meters per second
    pub speed_mps: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy_meters: f64,
    /// When the device captured the fix (RFC 3339). Defaults to now.
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportLocationResponse {
    /// Whether the fix was queued for publishing
    pub accepted: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationListResponse {
    pub trip_id: String,
    pub locations: Vec<LocationSample>,
}

/// Report a position fix for the calling subject on a trip
#[utoipa::path(
    post,
    path = "/api/trips/{trip_id}/location",
    params(("trip_id" = String, Path, description = "Trip identifier")),
    request_body = ReportLocationRequest,
    responses(
        (status = 202, description = "Fix accepted into the tracking pipeline", body = ReportLocationResponse),
        (status = 400, description = "Missing identity header or invalid fix fields", body = ErrorResponse)
    ),
    tag = "locations"
)]
pub async fn report_location(
    State(state): State<ApiState>,
    Path(trip_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ReportLocationRequest>,
) -> Result<(StatusCode, Json<ReportLocationResponse>), (StatusCode, Json<ErrorResponse>)> {
    let subject_id = user_id(&headers)
        .ok_or_else(|| bad_request("Missing x-user-id header"))?;

    let fix = PositionFix::new(
        request.latitude,
        request.longitude,
        request.heading_degrees,
        request.speed_mps,
        request.accuracy_meters,
        request.captured_at.unwrap_or_else(Utc::now),
    )
    .map_err(|e| bad_request(e.to_string()))?;

    // First fix from a subject opens its session; later fixes reuse it.
    state.sessions.start(&trip_id, &subject_id);
    let accepted = state.sessions.push_fix(&trip_id, &subject_id, fix);

    Ok((
        StatusCode::ACCEPTED,
        Json(ReportLocationResponse { accepted }),
    ))
}

/// Get the most recent position reported on a trip
#[utoipa::path(
    get,
    path = "/api/trips/{trip_id}/location",
    params(("trip_id" = String, Path, description = "Trip identifier")),
    responses(
        (status = 200, description = "Latest sample across all subjects", body = LocationSample),
        (status = 404, description = "No location reported yet", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "locations"
)]
pub async fn latest_location(
    State(state): State<ApiState>,
    Path(trip_id): Path<String>,
) -> Result<Json<LocationSample>, (StatusCode, Json<ErrorResponse>)> {
    let sample = state
        .store
        .latest_location(&trip_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .ok_or_else(|| not_found("No location reported for this trip"))?;
    Ok(Json(sample))
}

/// List the current position of every tracked subject on a trip
#[utoipa::path(
    get,
    path = "/api/trips/{trip_id}/locations",
    params(("trip_id" = String, Path, description = "Trip identifier")),
    responses(
        (status = 200, description = "One sample per tracked subject", body = LocationListResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "locations"
)]
pub async fn list_locations(
    State(state): State<ApiState>,
    Path(trip_id): Path<String>,
) -> Result<Json<LocationListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let locations = state
        .store
        .list_locations(&trip_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?;
    Ok(Json(LocationListResponse { trip_id, locations }))
}
