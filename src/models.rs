//! Core data model for live trip tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A validated WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinate {
    /// Latitude in degrees, -90..=90
    pub latitude: f64,
    /// Longitude in degrees, -180..=180
    pub longitude: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
pub struct InvalidCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinate> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if valid {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }
}

/// A single raw position reading from a device or other fix producer,
/// before it is bound to a trip and subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub coordinates: Coordinate,
    /// Compass heading in degrees, 0..360, if the source reports one.
    pub heading_degrees: Option<f64>,
    pub speed_mps: f64,
    pub accuracy_meters: f64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidFix {
    #[error(transparent)]
    Coordinate(#[from] InvalidCoordinate),
    #[error("invalid speed: {0} m/s")]
    Speed(f64),
    #[error("invalid accuracy: {0} m")]
    Accuracy(f64),
    #[error("invalid heading: {0} degrees")]
    Heading(f64),
}

impl PositionFix {
    /// Build a validated fix. Speed and accuracy must be finite and
    /// non-negative; a heading, when reported, must lie in 0..360.
    pub fn new(
        latitude: f64,
        longitude: f64,
        heading_degrees: Option<f64>,
        speed_mps: f64,
        accuracy_meters: f64,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, InvalidFix> {
        let coordinates = Coordinate::new(latitude, longitude)?;
        if !speed_mps.is_finite() || speed_mps < 0.0 {
            return Err(InvalidFix::Speed(speed_mps));
        }
        if !accuracy_meters.is_finite() || accuracy_meters < 0.0 {
            return Err(InvalidFix::Accuracy(accuracy_meters));
        }
        if let Some(heading) = heading_degrees {
            if !heading.is_finite() || !(0.0..360.0).contains(&heading) {
                return Err(InvalidFix::Heading(heading));
            }
        }
        Ok(Self {
            coordinates,
            heading_degrees,
            speed_mps,
            accuracy_meters,
            captured_at,
        })
    }
}

/// A fix bound to one trip and one subject (driver or passenger), as written
/// to the store. Immutable once created; superseded by later samples for the
/// same (trip, subject) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationSample {
    pub trip_id: String,
    pub subject_id: String,
    pub coordinates: Coordinate,
    pub heading_degrees: Option<f64>,
    pub speed_mps: f64,
    pub accuracy_meters: f64,
    pub captured_at: DateTime<Utc>,
}

/// Tracking lifecycle state of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Waiting,
    Arriving,
    PickedUp,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Waiting => "waiting",
            TripStatus::Arriving => "arriving",
            TripStatus::PickedUp => "picked_up",
            TripStatus::InProgress => "in_progress",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(TripStatus::Waiting),
            "arriving" => Some(TripStatus::Arriving),
            "picked_up" => Some(TripStatus::PickedUp),
            "in_progress" => Some(TripStatus::InProgress),
            "completed" => Some(TripStatus::Completed),
            "cancelled" => Some(TripStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    /// Advisory transition table. Re-publishing the current state is allowed;
    /// `cancelled` is reachable from every non-terminal state. The status
    /// machine logs transitions outside this table but does not reject them:
    /// the store has no transactional guard, and manually corrected states
    /// must stay writable.
    pub fn allows(&self, next: TripStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            TripStatus::Waiting => {
                matches!(next, TripStatus::Arriving | TripStatus::Cancelled)
            }
            TripStatus::Arriving => {
                matches!(next, TripStatus::PickedUp | TripStatus::Cancelled)
            }
            TripStatus::PickedUp => {
                matches!(next, TripStatus::InProgress | TripStatus::Cancelled)
            }
            TripStatus::InProgress => {
                matches!(next, TripStatus::Completed | TripStatus::Cancelled)
            }
            TripStatus::Completed | TripStatus::Cancelled => false,
        }
    }
}

/// One logical tracking-status record per trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TripTrackingStatus {
    pub trip_id: String,
    pub status: TripStatus,
    pub eta: Option<DateTime<Utc>>,
    pub distance_remaining_meters: i64,
    pub duration_remaining_seconds: i64,
    pub updated_at: DateTime<Utc>,
}

/// Partial status write. Fields left as `None` keep their stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub trip_id: String,
    pub status: TripStatus,
    pub eta: Option<DateTime<Utc>>,
    pub distance_remaining_meters: Option<i64>,
    pub duration_remaining_seconds: Option<i64>,
}

impl StatusUpdate {
    pub fn new(trip_id: impl Into<String>, status: TripStatus) -> Self {
        Self {
            trip_id: trip_id.into(),
            status,
            eta: None,
            distance_remaining_meters: None,
            duration_remaining_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// An SOS record. Created exactly once per trigger and never mutated by this
/// service; resolution happens elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EmergencyAlert {
    pub id: String,
    pub trip_id: String,
    pub triggered_by: String,
    pub location: Coordinate,
    pub reason: Option<String>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

impl EmergencyAlert {
    pub fn new(
        trip_id: impl Into<String>,
        triggered_by: impl Into<String>,
        location: Coordinate,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            trip_id: trip_id.into(),
            triggered_by: triggered_by.into(),
            location,
            reason,
            status: AlertStatus::Active,
            created_at: Utc::now(),
        }
    }
}

/// Emergency contact on a user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
}

/// The slice of a user profile this service reads during SOS fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub emergency_contacts: Vec<EmergencyContact>,
}
