use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use super::ApiState;
use crate::api::{bad_request, internal_error, not_found, ErrorResponse};
use crate::geo;
use crate::models::{Coordinate, StatusUpdate, TripStatus, TripTrackingStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    pub status: TripStatus,
    /// When present, the remaining distance, duration and ETA are computed
    /// from the trip's latest reported position towards this point.
    pub destination: Option<DestinationPoint>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DestinationPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Update a trip's tracking status
#[utoipa::path(
    put,
    path = "/api/trips/{trip_id}/status",
    params(("trip_id" = String, Path, description = "Trip identifier")),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Stored status after the write", body = TripTrackingStatus),
        (status = 400, description = "Invalid destination coordinates", body = ErrorResponse),
        (status = 500, description = "Status write failed", body = ErrorResponse)
    ),
    tag = "status"
)]
pub async fn set_status(
    State(state): State<ApiState>,
    Path(trip_id): Path<String>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<TripTrackingStatus>, (StatusCode, Json<ErrorResponse>)> {
    let mut update = StatusUpdate::new(&trip_id, request.status);

    if let Some(destination) = request.destination {
        let destination = Coordinate::new(destination.latitude, destination.longitude)
            .map_err(|e| bad_request(e.to_string()))?;

        // An estimate needs a current position; without one the status is
        // written as-is and the estimate fields stay untouched.
        match state.store.latest_location(&trip_id).await {
            Ok(Some(sample)) => {
                let estimate = geo::estimate(sample.coordinates, destination, sample.speed_mps);
                update.eta = Some(estimate.eta_at);
                update.distance_remaining_meters = Some(estimate.distance_meters);
                update.duration_remaining_seconds = Some(estimate.duration_seconds);
            }
            Ok(None) => {
                tracing::debug!(trip_id, "no position yet, storing status without estimate");
            }
            Err(e) => {
                tracing::warn!(trip_id, error = %e, "position read failed, storing status without estimate");
            }
        }
    }

    if !state.status.set_status(update).await {
        return Err(internal_error("Status write failed"));
    }

    // A terminal trip stops producing positions; tear down its tracking
    // sessions and any pickup monitor still polling for it.
    if request.status.is_terminal() {
        state.sessions.stop_trip(&trip_id);
        let monitor = state.pickup_monitors.lock().unwrap().remove(&trip_id);
        if let Some(monitor) = monitor {
            monitor.cancel();
        }
    }

    let stored = state
        .store
        .get_trip_status(&trip_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .ok_or_else(|| internal_error("Status missing after write"))?;
    Ok(Json(stored))
}

/// Get a trip's tracking status
#[utoipa::path(
    get,
    path = "/api/trips/{trip_id}/status",
    params(("trip_id" = String, Path, description = "Trip identifier")),
    responses(
        (status = 200, description = "Current tracking status", body = TripTrackingStatus),
        (status = 404, description = "No status recorded for this trip", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "status"
)]
pub async fn get_status(
    State(state): State<ApiState>,
    Path(trip_id): Path<String>,
) -> Result<Json<TripTrackingStatus>, (StatusCode, Json<ErrorResponse>)> {
    let status = state
        .store
        .get_trip_status(&trip_id)
        .await
        .map_err(|e| internal_error(e.to_string()))?
        .ok_or_else(|| not_found("No status recorded for this trip"))?;
    Ok(Json(status))
}
