pub mod emergency;
pub mod error;
pub mod health;
pub mod locations;
pub mod pickup;
pub mod status;
pub mod ws;

pub use error::{bad_request, internal_error, not_found, ErrorResponse};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::HeaderMap;
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::SqlitePool;

use crate::cancel::CancelHandle;
use crate::emergency::EmergencyDispatcher;
use crate::geofence::GeofenceMonitor;
use crate::status::TripStatusMachine;
use crate::store::TrackingStore;
use crate::tracking::SessionManager;

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub store: Arc<dyn TrackingStore>,
    pub sessions: Arc<SessionManager>,
    pub status: Arc<TripStatusMachine>,
    pub geofence: Arc<GeofenceMonitor>,
    pub dispatcher: Arc<EmergencyDispatcher>,
    /// One live pickup-zone watch per trip
    pub pickup_monitors: Arc<Mutex<HashMap<String, CancelHandle>>>,
}

/// Caller identity, asserted upstream by the gateway that terminates auth.
pub fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(String::from)
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/trips/{trip_id}/location",
            post(locations::report_location).get(locations::latest_location),
        )
        .route("/trips/{trip_id}/locations", get(locations::list_locations))
        .route(
            "/trips/{trip_id}/status",
            put(status::set_status).get(status::get_status),
        )
        .route(
            "/trips/{trip_id}/pickup-monitor",
            post(pickup::start_pickup_monitor).delete(pickup::stop_pickup_monitor),
        )
        .route("/trips/{trip_id}/sos", post(emergency::trigger_sos))
        .route("/health", get(health::health_check))
        .route("/ws/trips", get(ws::ws_trips))
        .with_state(state)
}
