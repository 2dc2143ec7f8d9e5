//! Great-circle geometry used for distance, ETA and geofence checks.
//!
//! Everything here is pure and deterministic. ETAs are straight-line
//! estimates from the latest known position and speed; no road-network
//! routing is involved.

use chrono::{DateTime, Utc};

use crate::models::Coordinate;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Effective speed used when the latest sample reports no forward motion
/// (stopped at a light, stale heading, unknown speed). 13.89 m/s = 50 km/h.
pub const DEFAULT_CRUISE_SPEED_MPS: f64 = 13.89;

/// Haversine great-circle distance between two coordinates, in meters.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);

    // Rounding can push h fractionally above 1 for near-antipodal pairs,
    // which would make asin return NaN.
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Straight-line arrival estimate for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub eta_at: DateTime<Utc>,
    /// Remaining distance, rounded to whole meters for display stability.
    pub distance_meters: i64,
    /// Remaining duration, rounded to whole seconds.
    pub duration_seconds: i64,
}

/// Estimate time of arrival at `destination` from `current`, moving at
/// `current_speed_mps`. A non-positive speed falls back to
/// [`DEFAULT_CRUISE_SPEED_MPS`] so a momentarily stationary vehicle still
/// gets a usable ETA.
pub fn estimate(
    current: Coordinate,
    destination: Coordinate,
    current_speed_mps: f64,
) -> Estimate {
    let distance = distance_meters(current, destination);
    let effective_speed = if current_speed_mps > 0.0 {
        current_speed_mps
    } else {
        DEFAULT_CRUISE_SPEED_MPS
    };
    let duration_seconds = (distance / effective_speed).round() as i64;

    Estimate {
        eta_at: Utc::now() + chrono::Duration::seconds(duration_seconds),
        distance_meters: distance.round() as i64,
        duration_seconds,
    }
}

/// Whether `point` lies within the circular geofence around `center`.
/// Boundary-inclusive: a point exactly on the radius counts as inside.
pub fn within_geofence(point: Coordinate, center: Coordinate, radius_meters: f64) -> bool {
    distance_meters(point, center) <= radius_meters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate::new(latitude, longitude).unwrap()
    }

    #[test]
    fn distance_is_zero_for_identical_points() {
        let p = coord(25.0772, 55.1398);
        assert_eq!(distance_meters(p, p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = coord(48.3705, 10.8978);
        let b = coord(25.0772, 55.1398);
        let ab = distance_meters(a, b);
        let ba = distance_meters(b, a);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn known_distance_dubai_marina_to_abu_dhabi() {
        // Independently computed haversine distance for this pair.
        let marina = coord(25.0772, 55.1398);
        let abu_dhabi = coord(24.4539, 54.3773);
        let expected = 103_589.0;

        let d = distance_meters(marina, abu_dhabi);
        assert!(
            (d - expected).abs() / expected < 0.01,
            "expected ~{expected} m, got {d} m"
        );
    }

    #[test]
    fn distance_stays_finite_for_antipodal_points() {
        let north_pole = coord(90.0, 0.0);
        let south_pole = coord(-90.0, 0.0);
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_METERS;

        let d = distance_meters(north_pole, south_pole);
        assert!(d.is_finite());
        assert!((d - half_circumference).abs() < 1.0);

        // Near-antipodal pair on the equator
        let d = distance_meters(coord(0.0, 0.0), coord(0.0, 179.999_999_9));
        assert!(d.is_finite());
        assert!((d - half_circumference).abs() < 1.0);
    }

    #[test]
    fn estimate_falls_back_to_cruise_speed_when_stationary() {
        // ~13.9 km apart; at 13.89 m/s that is roughly 1000 seconds.
        let current = coord(25.0, 55.0);
        let destination = coord(25.125, 55.0);

        let est = estimate(current, destination, 0.0);

        let distance = distance_meters(current, destination);
        assert_eq!(
            est.duration_seconds,
            (distance / DEFAULT_CRUISE_SPEED_MPS).round() as i64
        );
        assert!((995..=1010).contains(&est.duration_seconds));
        assert_eq!(est.distance_meters, distance.round() as i64);
    }

    #[test]
    fn estimate_uses_reported_speed_when_moving() {
        let current = coord(25.0, 55.0);
        let destination = coord(25.125, 55.0);
        let distance = distance_meters(current, destination);

        let est = estimate(current, destination, 27.78);
        assert_eq!(est.duration_seconds, (distance / 27.78).round() as i64);
    }

    #[test]
    fn estimate_eta_lies_in_the_future() {
        let before = Utc::now();
        let est = estimate(coord(25.0, 55.0), coord(25.125, 55.0), 0.0);
        let offset = est.eta_at - before;
        assert!(offset.num_seconds() >= est.duration_seconds - 1);
        assert!(offset.num_seconds() <= est.duration_seconds + 1);
    }

    #[test]
    fn geofence_center_is_always_inside() {
        let center = coord(25.0772, 55.1398);
        assert!(within_geofence(center, center, 0.0));
        assert!(within_geofence(center, center, 100.0));
    }

    #[test]
    fn geofence_zero_radius_excludes_everything_else() {
        let center = coord(25.0772, 55.1398);
        let nearby = coord(25.0773, 55.1398);
        assert!(!within_geofence(nearby, center, 0.0));
    }

    #[test]
    fn geofence_boundary_is_inclusive() {
        let center = coord(25.0772, 55.1398);
        let point = coord(25.0781, 55.1398);
        let radius = distance_meters(point, center);
        assert!(within_geofence(point, center, radius));
        assert!(!within_geofence(point, center, radius - 1.0));
    }
}
