use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ApiState;
use crate::api::{bad_request, not_found, ErrorResponse};
use crate::models::{Coordinate, StatusUpdate, TripStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PickupMonitorRequest {
    /// Center of the pickup zone
    pub latitude: f64,
    pub longitude: f64,
    /// Zone radius in meters. Defaults to the configured radius.
    pub radius_meters: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PickupMonitorResponse {
    pub trip_id: String,
    pub monitoring: bool,
}

/// Start watching a trip's pickup zone
#[utoipa::path(
    post,
    path = "/api/trips/{trip_id}/pickup-monitor",
    params(("trip_id" = String, Path, description = "Trip identifier")),
    request_body = PickupMonitorRequest,
    responses(
        (status = 201, description = "Monitor started; the trip moves to arriving on zone entry", body = PickupMonitorResponse),
        (status = 400, description = "Invalid coordinates or radius", body = ErrorResponse)
    ),
    tag = "pickup"
)]
pub async fn start_pickup_monitor(
    State(state): State<ApiState>,
    Path(trip_id): Path<String>,
    Json(request): Json<PickupMonitorRequest>,
) -> Result<(StatusCode, Json<PickupMonitorResponse>), (StatusCode, Json<ErrorResponse>)> {
    let center = Coordinate::new(request.latitude, request.longitude)
        .map_err(|e| bad_request(e.to_string()))?;
    if let Some(radius) = request.radius_meters {
        if !radius.is_finite() || radius < 0.0 {
            return Err(bad_request("radius_meters must be non-negative"));
        }
    }

    // Arrival flips the trip to arriving and removes the finished monitor.
    let status = state.status.clone();
    let monitors = state.pickup_monitors.clone();
    let arrival_trip = trip_id.clone();
    let handle = state.geofence.monitor_pickup_zone(
        &trip_id,
        center,
        request.radius_meters,
        move || {
            let status = status.clone();
            let update_trip = arrival_trip.clone();
            monitors.lock().unwrap().remove(&arrival_trip);
            tokio::spawn(async move {
                status
                    .set_status(StatusUpdate::new(update_trip, TripStatus::Arriving))
                    .await;
            });
        },
    );

    // Restarting replaces the previous watch for the trip.
    if let Some(previous) = state
        .pickup_monitors
        .lock()
        .unwrap()
        .insert(trip_id.clone(), handle)
    {
        previous.cancel();
    }

    Ok((
        StatusCode::CREATED,
        Json(PickupMonitorResponse {
            trip_id,
            monitoring: true,
        }),
    ))
}

/// Stop watching a trip's pickup zone
#[utoipa::path(
    delete,
    path = "/api/trips/{trip_id}/pickup-monitor",
    params(("trip_id" = String, Path, description = "Trip identifier")),
    responses(
        (status = 200, description = "Monitor cancelled", body = PickupMonitorResponse),
        (status = 404, description = "No active monitor for this trip", body = ErrorResponse)
    ),
    tag = "pickup"
)]
pub async fn stop_pickup_monitor(
    State(state): State<ApiState>,
    Path(trip_id): Path<String>,
) -> Result<Json<PickupMonitorResponse>, (StatusCode, Json<ErrorResponse>)> {
    let handle = state
        .pickup_monitors
        .lock()
        .unwrap()
        .remove(&trip_id)
        .ok_or_else(|| not_found("No active pickup monitor for this trip"))?;
    handle.cancel();

    Ok(Json(PickupMonitorResponse {
        trip_id,
        monitoring: false,
    }))
}
