use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// Location stream and publish tuning
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Pickup-zone geofence polling
    #[serde(default)]
    pub geofence: GeofenceConfig,
    /// Outbound notification providers; any section left out falls back to a
    /// log-only sender.
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// Tuning for the per-trip location pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Fixes older than this are never delivered to the publisher (default: 5000).
    #[serde(default = "TrackingConfig::default_max_fix_staleness_ms")]
    pub max_fix_staleness_ms: u64,
    /// Minimum gap between published samples per subject. 0 forwards every
    /// fix at device-reporting frequency (default: 0).
    #[serde(default)]
    pub min_publish_interval_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_fix_staleness_ms: Self::default_max_fix_staleness_ms(),
            min_publish_interval_ms: 0,
        }
    }
}

impl TrackingConfig {
    fn default_max_fix_staleness_ms() -> u64 {
        5_000
    }

    pub fn max_fix_staleness(&self) -> Duration {
        Duration::from_millis(self.max_fix_staleness_ms)
    }

    pub fn min_publish_interval(&self) -> Duration {
        Duration::from_millis(self.min_publish_interval_ms)
    }
}

/// Pickup-zone monitoring. Interval and radius are configuration rather than
/// constants so tests can run against an accelerated clock.
#[derive(Debug, Clone, Deserialize)]
pub struct GeofenceConfig {
    /// Interval in milliseconds between position polls (default: 5000)
    #[serde(default = "GeofenceConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Geofence radius in meters when the caller does not supply one (default: 100)
    #[serde(default = "GeofenceConfig::default_radius_meters")]
    pub default_radius_meters: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval_ms(),
            default_radius_meters: Self::default_radius_meters(),
        }
    }
}

impl GeofenceConfig {
    fn default_poll_interval_ms() -> u64 {
        5_000
    }
    fn default_radius_meters() -> f64 {
        100.0
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    pub sms: Option<WebhookConfig>,
    pub push: Option<WebhookConfig>,
    pub emergency_services: Option<WebhookConfig>,
}

/// A provider reachable as a JSON webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub endpoint: String,
    /// Request timeout in seconds (default: 10)
    #[serde(default = "WebhookConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl WebhookConfig {
    fn default_timeout_secs() -> u64 {
        10
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
