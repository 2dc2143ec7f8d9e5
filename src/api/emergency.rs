use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{user_id, ApiState};
use crate::api::{bad_request, internal_error, ErrorResponse};
use crate::models::Coordinate;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SosRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Free-form reason supplied by the user, if any
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SosResponse {
    /// The alert record exists; notifications are best-effort beyond this
    pub recorded: bool,
}

/// Trigger an SOS on a trip
#[utoipa::path(
    post,
    path = "/api/trips/{trip_id}/sos",
    params(("trip_id" = String, Path, description = "Trip identifier")),
    request_body = SosRequest,
    responses(
        (status = 201, description = "Alert recorded and fan-out dispatched", body = SosResponse),
        (status = 400, description = "Missing identity header or invalid coordinates", body = ErrorResponse),
        (status = 500, description = "Alert could not be recorded", body = ErrorResponse)
    ),
    tag = "emergency"
)]
pub async fn trigger_sos(
    State(state): State<ApiState>,
    Path(trip_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SosRequest>,
) -> Result<(StatusCode, Json<SosResponse>), (StatusCode, Json<ErrorResponse>)> {
    // No anonymous SOS: the alert must name who triggered it.
    let triggered_by =
        user_id(&headers).ok_or_else(|| bad_request("Missing x-user-id header"))?;

    let location = Coordinate::new(request.latitude, request.longitude)
        .map_err(|e| bad_request(e.to_string()))?;

    let recorded = state
        .dispatcher
        .send_sos(&trip_id, &triggered_by, location, request.reason)
        .await;
    if !recorded {
        return Err(internal_error("Emergency alert could not be recorded"));
    }

    Ok((StatusCode::CREATED, Json(SosResponse { recorded })))
}
