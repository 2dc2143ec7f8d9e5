//! SQLite-backed [`TrackingStore`].
//!
//! Timestamps are stored as fixed-width RFC 3339 TEXT so that string
//! ordering matches chronological ordering.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;

use super::{ChangeEvent, StoreError, TrackingStore};
use crate::models::{
    Coordinate, EmergencyAlert, LocationSample, StatusUpdate, TripStatus, TripTrackingStatus,
    UserProfile,
};

/// Capacity of the change feed. Slow subscribers lag and re-query rather
/// than applying backpressure to writers.
const CHANGE_FEED_CAPACITY: usize = 64;

pub struct SqliteStore {
    pool: SqlitePool,
    changes_tx: broadcast::Sender<ChangeEvent>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes_tx }
    }
}

fn to_db_time(t: DateTime<Utc>) -> String {
    // Micros + Z keeps every value the same width, so lexicographic
    // comparisons in SQL stay chronological.
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_db_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Data(format!("bad timestamp '{s}': {e}")))
}

type LocationRow = (
    String,
    String,
    f64,
    f64,
    Option<f64>,
    f64,
    f64,
    String,
);

fn sample_from_row(row: LocationRow) -> Result<LocationSample, StoreError> {
    let (trip_id, subject_id, latitude, longitude, heading_degrees, speed_mps, accuracy_meters, captured_at) =
        row;
    let coordinates = Coordinate::new(latitude, longitude)
        .map_err(|e| StoreError::Data(e.to_string()))?;
    Ok(LocationSample {
        trip_id,
        subject_id,
        coordinates,
        heading_degrees,
        speed_mps,
        accuracy_meters,
        captured_at: parse_db_time(&captured_at)?,
    })
}

fn status_from_row(row: sqlx::sqlite::SqliteRow) -> Result<TripTrackingStatus, StoreError> {
    let status_text: String = row.get("status");
    let status = TripStatus::parse(&status_text)
        .ok_or_else(|| StoreError::Data(format!("unknown trip status '{status_text}'")))?;
    let eta: Option<String> = row.get("eta");
    let eta = eta.as_deref().map(parse_db_time).transpose()?;
    let updated_at: String = row.get("updated_at");
    Ok(TripTrackingStatus {
        trip_id: row.get("trip_id"),
        status,
        eta,
        distance_remaining_meters: row.get("distance_remaining_meters"),
        duration_remaining_seconds: row.get("duration_remaining_seconds"),
        updated_at: parse_db_time(&updated_at)?,
    })
}

const SELECT_LOCATION: &str = "SELECT trip_id, subject_id, latitude, longitude, heading_degrees, \
     speed_mps, accuracy_meters, captured_at FROM trip_locations";

#[async_trait]
impl TrackingStore for SqliteStore {
    async fn upsert_location(&self, sample: &LocationSample) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trip_locations
                (trip_id, subject_id, latitude, longitude, heading_degrees,
                 speed_mps, accuracy_meters, captured_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(trip_id, subject_id) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                heading_degrees = excluded.heading_degrees,
                speed_mps = excluded.speed_mps,
                accuracy_meters = excluded.accuracy_meters,
                captured_at = excluded.captured_at
            "#,
        )
        .bind(&sample.trip_id)
        .bind(&sample.subject_id)
        .bind(sample.coordinates.latitude)
        .bind(sample.coordinates.longitude)
        .bind(sample.heading_degrees)
        .bind(sample.speed_mps)
        .bind(sample.accuracy_meters)
        .bind(to_db_time(sample.captured_at))
        .execute(&self.pool)
        .await?;

        // Send errors just mean no one is listening
        let _ = self.changes_tx.send(ChangeEvent::Location {
            sample: sample.clone(),
        });
        Ok(())
    }

    async fn latest_location(&self, trip_id: &str) -> Result<Option<LocationSample>, StoreError> {
        let row: Option<LocationRow> = sqlx::query_as(&format!(
            "{SELECT_LOCATION} WHERE trip_id = ? ORDER BY captured_at DESC LIMIT 1"
        ))
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(sample_from_row).transpose()
    }

    async fn latest_location_for(
        &self,
        trip_id: &str,
        subject_id: &str,
    ) -> Result<Option<LocationSample>, StoreError> {
        let row: Option<LocationRow> = sqlx::query_as(&format!(
            "{SELECT_LOCATION} WHERE trip_id = ? AND subject_id = ?"
        ))
        .bind(trip_id)
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(sample_from_row).transpose()
    }

    async fn list_locations(&self, trip_id: &str) -> Result<Vec<LocationSample>, StoreError> {
        let rows: Vec<LocationRow> = sqlx::query_as(&format!(
            "{SELECT_LOCATION} WHERE trip_id = ? ORDER BY subject_id"
        ))
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(sample_from_row).collect()
    }

    async fn upsert_trip_status(
        &self,
        update: &StatusUpdate,
    ) -> Result<TripTrackingStatus, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO trip_status
                (trip_id, status, eta, distance_remaining_meters,
                 duration_remaining_seconds, updated_at)
            VALUES (?, ?, ?, COALESCE(?, 0), COALESCE(?, 0), ?)
            ON CONFLICT(trip_id) DO UPDATE SET
                status = excluded.status,
                eta = COALESCE(?, trip_status.eta),
                distance_remaining_meters =
                    COALESCE(?, trip_status.distance_remaining_meters),
                duration_remaining_seconds =
                    COALESCE(?, trip_status.duration_remaining_seconds),
                updated_at = excluded.updated_at
            RETURNING trip_id, status, eta, distance_remaining_meters,
                      duration_remaining_seconds, updated_at
            "#,
        )
        .bind(&update.trip_id)
        .bind(update.status.as_str())
        .bind(update.eta.map(to_db_time))
        .bind(update.distance_remaining_meters)
        .bind(update.duration_remaining_seconds)
        .bind(to_db_time(Utc::now()))
        .bind(update.eta.map(to_db_time))
        .bind(update.distance_remaining_meters)
        .bind(update.duration_remaining_seconds)
        .fetch_one(&self.pool)
        .await?;

        let status = status_from_row(row)?;
        let _ = self.changes_tx.send(ChangeEvent::Status {
            status: status.clone(),
        });
        Ok(status)
    }

    async fn get_trip_status(
        &self,
        trip_id: &str,
    ) -> Result<Option<TripTrackingStatus>, StoreError> {
        let row = sqlx::query(
            "SELECT trip_id, status, eta, distance_remaining_meters, \
             duration_remaining_seconds, updated_at FROM trip_status WHERE trip_id = ?",
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(status_from_row).transpose()
    }

    async fn insert_emergency_alert(&self, alert: &EmergencyAlert) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO emergency_alerts
                (id, trip_id, triggered_by, latitude, longitude, reason, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.id)
        .bind(&alert.trip_id)
        .bind(&alert.triggered_by)
        .bind(alert.location.latitude)
        .bind(alert.location.longitude)
        .bind(&alert.reason)
        .bind(alert.status.as_str())
        .bind(to_db_time(alert.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT user_id, display_name, emergency_contacts FROM profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(user_id, display_name, contacts_json)| {
            let emergency_contacts = serde_json::from_str(&contacts_json)
                .map_err(|e| StoreError::Data(format!("bad emergency_contacts JSON: {e}")))?;
            Ok(UserProfile {
                user_id,
                display_name,
                emergency_contacts,
            })
        })
        .transpose()
    }

    async fn trip_participants(&self, trip_id: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM trip_participants WHERE trip_id = ? ORDER BY user_id",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes_tx.subscribe()
    }
}
