//! Geographic utilities: haversine distance and compass bearings.
//!
//! All inputs are in degrees. None of these functions validate their input;
//! any finite latitude/longitude pair is accepted.

use crate::LatLon;

/// Mean Earth radius in meters used by [`haversine_distance`].
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters (haversine).
///
/// # Example
/// ```
/// use course_tracker::LatLon;
/// use course_tracker::geo_utils::haversine_distance;
///
/// let a = LatLon::new(0.0, 0.0);
/// let b = LatLon::new(0.0, 1.0);
/// let d = haversine_distance(&a, &b);
/// assert!((d - 111_195.0).abs() < 10.0);
/// ```
pub fn haversine_distance(p1: &LatLon, p2: &LatLon) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lon = (p2.longitude - p1.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial compass bearing from `p1` towards `p2`, in degrees within [0, 360).
pub fn initial_bearing(p1: &LatLon, p2: &LatLon) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let d_lon = (p2.longitude - p1.longitude).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Smallest angle between two bearings, in degrees within [0, 180].
pub fn bearing_delta(a: f64, b: f64) -> f64 {
    let d = (a - b).abs();
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// Round to two decimal places (half away from zero).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
