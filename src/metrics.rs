//! Course metrics computation.
//!
//! A course's metrics are a pure function of its point *set*: the points are
//! put into chronological order on a private copy, then consecutive pairs
//! are walked once to accumulate distance, altitude change, and the number
//! of significant speed and direction changes between segments.

use std::cmp::Ordering;

use crate::geo_utils::{bearing_delta, haversine_distance, initial_bearing, round2};
use crate::{CourseMetrics, GeoPoint};

/// Thresholds used when counting speed and direction changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    /// Segment-to-segment speed delta (m/s) that counts as a speed change.
    /// Default: 1.0
    pub speed_change_threshold: f64,

    /// Segment-to-segment bearing delta (degrees) that counts as a direction change.
    /// Default: 15.0
    pub direction_change_threshold: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            speed_change_threshold: 1.0,
            direction_change_threshold: 15.0,
        }
    }
}

/// Compute course metrics with the default thresholds.
///
/// Input order does not matter; the caller's slice is left untouched.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use course_tracker::{compute_course_metrics, GeoPoint, LatLon};
///
/// let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
/// let points = vec![GeoPoint::new(10.0, 20.0, 5.0, t0)];
///
/// let metrics = compute_course_metrics(&points);
/// assert_eq!(metrics.total_distance, 0.0);
/// assert_eq!(metrics.starting_point, LatLon::new(10.0, 20.0));
/// assert_eq!(metrics.ending_point, LatLon::new(10.0, 20.0));
/// ```
pub fn compute_course_metrics(points: &[GeoPoint]) -> CourseMetrics {
    compute_course_metrics_with_config(points, &MetricsConfig::default())
}

/// Compute course metrics with explicit change thresholds.
pub fn compute_course_metrics_with_config(
    points: &[GeoPoint],
    config: &MetricsConfig,
) -> CourseMetrics {
    if points.len() < 2 {
        let endpoint = points.first().map(GeoPoint::position).unwrap_or_default();
        return CourseMetrics {
            starting_point: endpoint,
            ending_point: endpoint,
            ..CourseMetrics::default()
        };
    }

    let sorted = chronological(points);

    let mut total_distance = 0.0;
    let mut total_altitude_changes = 0.0;
    let mut speed_changes = 0u32;
    let mut direction_changes = 0u32;

    // (speed, bearing) of the previous segment
    let mut previous: Option<(f64, f64)> = None;

    for pair in sorted.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let (from, to) = (prev.position(), curr.position());

        let segment_distance = haversine_distance(&from, &to);
        total_distance += segment_distance;
        total_altitude_changes += (curr.altitude - prev.altitude).abs();

        let dt = seconds_between(prev, curr);
        let speed = if dt > 0.0 { segment_distance / dt } else { 0.0 };
        let bearing = initial_bearing(&from, &to);

        if let Some((previous_speed, previous_bearing)) = previous {
            if (speed - previous_speed).abs() > config.speed_change_threshold {
                speed_changes += 1;
            }
            if bearing_delta(bearing, previous_bearing) > config.direction_change_threshold {
                direction_changes += 1;
            }
        }

        previous = Some((speed, bearing));
    }

    let first = &sorted[0];
    let last = &sorted[sorted.len() - 1];
    let elapsed = seconds_between(first, last);
    let avg_speed = if elapsed > 0.0 {
        total_distance / elapsed
    } else {
        0.0
    };

    CourseMetrics {
        total_distance: round2(total_distance),
        avg_speed: round2(avg_speed),
        total_speed_changes: speed_changes,
        total_direction_changes: direction_changes,
        total_altitude_changes: round2(total_altitude_changes),
        starting_point: first.position(),
        ending_point: last.position(),
    }
}

/// Compute metrics for many independent courses.
///
/// Each course is a one-shot pure computation; with the `parallel` feature
/// the courses are spread across rayon's thread pool.
pub fn compute_metrics_batch(courses: &[Vec<GeoPoint>]) -> Vec<CourseMetrics> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        courses
            .par_iter()
            .map(|points| compute_course_metrics(points))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        courses
            .iter()
            .map(|points| compute_course_metrics(points))
            .collect()
    }
}

/// Chronological order of two points.
///
/// Equal timestamps fall back to latitude, longitude and altitude, so every
/// permutation of the same set sorts the same way. Anything that lists a
/// course's points uses this order, keeping the first and last listed points
/// equal to the metrics' starting and ending points.
pub(crate) fn chronological_cmp(a: &GeoPoint, b: &GeoPoint) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.latitude.total_cmp(&b.latitude))
        .then_with(|| a.longitude.total_cmp(&b.longitude))
        .then_with(|| a.altitude.total_cmp(&b.altitude))
}

/// Sorted copy of `points` in chronological order.
fn chronological(points: &[GeoPoint]) -> Vec<GeoPoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by(chronological_cmp);
    sorted
}

/// Signed seconds from `a` to `b`, at millisecond resolution.
fn seconds_between(a: &GeoPoint, b: &GeoPoint) -> f64 {
    (b.timestamp - a.timestamp).num_milliseconds() as f64 / 1000.0
}
