//! Store collaborator interface.
//!
//! The tracking components only ever talk to the store through
//! [`TrackingStore`]; any backend that can upsert by key and emit change
//! events satisfies them. The bundled implementation is SQLite-backed
//! ([`sqlite::SqliteStore`]), with the change feed carried over a
//! `tokio::sync::broadcast` channel.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::models::{
    EmergencyAlert, LocationSample, StatusUpdate, TripTrackingStatus, UserProfile,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Stored data error: {0}")]
    Data(String),
}

/// Change event emitted after a successful write, scoped by trip (and
/// subject, for locations). Subscribers filter on these fields.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Location { sample: LocationSample },
    Status { status: TripTrackingStatus },
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Upsert the latest sample for (trip, subject). Last write wins; no
    /// history is kept at this layer.
    async fn upsert_location(&self, sample: &LocationSample) -> Result<(), StoreError>;

    /// Newest sample for the trip across all subjects, by capture time.
    async fn latest_location(&self, trip_id: &str) -> Result<Option<LocationSample>, StoreError>;

    /// Newest sample for one subject within the trip.
    async fn latest_location_for(
        &self,
        trip_id: &str,
        subject_id: &str,
    ) -> Result<Option<LocationSample>, StoreError>;

    /// Current sample of every tracked subject within the trip.
    async fn list_locations(&self, trip_id: &str) -> Result<Vec<LocationSample>, StoreError>;

    /// Partial upsert of the trip's tracking status; `None` fields keep
    /// their stored value.
    async fn upsert_trip_status(&self, update: &StatusUpdate) -> Result<TripTrackingStatus, StoreError>;

    async fn get_trip_status(&self, trip_id: &str)
        -> Result<Option<TripTrackingStatus>, StoreError>;

    /// Append an emergency alert. Never updates an existing row.
    async fn insert_emergency_alert(&self, alert: &EmergencyAlert) -> Result<(), StoreError>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// User ids of everyone on the trip (driver plus booked passengers).
    async fn trip_participants(&self, trip_id: &str) -> Result<Vec<String>, StoreError>;

    /// Subscribe to the change feed. Each receiver sees every event emitted
    /// after the call; lagging receivers skip, they are never blocked on.
    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent>;
}
