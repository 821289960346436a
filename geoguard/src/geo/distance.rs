// geoguard/src/geo/distance.rs
//
// Great-circle distance and implied travel speed.
//
// Invalid input never fails: any missing coordinate, non-finite value, or
// |lat| > 90 / |lon| > 180 yields 0 km, which in turn can never trip the
// impossible-travel threshold. Bad geo data therefore suppresses detection
// instead of aborting the verification.

use chrono::Duration;

use crate::events::Coordinates;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

fn valid(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}

/// Haversine distance in kilometres. Returns 0.0 for out-of-range input.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if !valid(lat1, lon1) || !valid(lat2, lon2) {
        return 0.0;
    }
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dp = (lat2 - lat1).to_radians();
    let dl = (lon2 - lon1).to_radians();

    let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance between two optional coordinate pairs. Returns 0.0 when either
/// side is missing.
pub fn distance_km(from: Option<Coordinates>, to: Option<Coordinates>) -> f64 {
    match (from, to) {
        (Some(a), Some(b)) => haversine_km(a.latitude, a.longitude, b.latitude, b.longitude),
        _ => 0.0,
    }
}

/// Implied speed in km/h. Zero or negative elapsed time yields +inf.
pub fn speed_kmh(distance_km: f64, elapsed: Duration) -> f64 {
    // Microsecond precision; spans too long for i64 µs fall back to ms.
    let hours = match elapsed.num_microseconds() {
        Some(us) => us as f64 / 3_600_000_000.0,
        None     => elapsed.num_milliseconds() as f64 / 3_600_000.0,
    };
    if hours <= 0.0 {
        return f64::INFINITY;
    }
    distance_km / hours
}

pub fn is_impossible(speed_kmh: f64, threshold_kmh: f64) -> bool {
    speed_kmh > threshold_kmh
}
