//! Request validation.
//!
//! The metrics core accepts any finite input and never checks it. Requests
//! are validated here before they reach the core or the store.

use chrono::{DateTime, Utc};

use crate::{CourseError, CourseUpdate, GeoPoint, NewCourse, Result};

/// Inclusive bounds of a course's noise level percentage.
pub const NOISE_LEVEL_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

/// Validate a course creation request.
pub fn validate_new_course(request: &NewCourse) -> Result<()> {
    validate_object_type(&request.object_type)?;
    validate_noise_level(request.noise_level)?;
    if request.points.is_empty() {
        return Err(CourseError::invalid("points", "at least one point is required"));
    }
    validate_points(&request.points)
}

/// Validate a course update request.
pub fn validate_course_update(update: &CourseUpdate) -> Result<()> {
    if let Some(object_type) = &update.object_type {
        validate_object_type(object_type)?;
    }
    if let Some(noise_level) = update.noise_level {
        validate_noise_level(noise_level)?;
    }
    if let Some(points) = update.replacement_points() {
        validate_points(points)?;
    }
    Ok(())
}

/// Validate a single point: finite values, latitude and longitude in range.
pub fn validate_point(point: &GeoPoint, field: &str) -> Result<()> {
    if !point.latitude.is_finite() || !(-90.0..=90.0).contains(&point.latitude) {
        return Err(CourseError::invalid(
            field,
            format!("latitude {} outside [-90, 90]", point.latitude),
        ));
    }
    if !point.longitude.is_finite() || !(-180.0..=180.0).contains(&point.longitude) {
        return Err(CourseError::invalid(
            field,
            format!("longitude {} outside [-180, 180]", point.longitude),
        ));
    }
    if !point.altitude.is_finite() {
        return Err(CourseError::invalid(field, "altitude must be a finite number"));
    }
    Ok(())
}

fn validate_points(points: &[GeoPoint]) -> Result<()> {
    for (i, point) in points.iter().enumerate() {
        validate_point(point, &format!("points[{}]", i))?;
    }
    Ok(())
}

fn validate_object_type(object_type: &str) -> Result<()> {
    if object_type.trim().is_empty() {
        return Err(CourseError::invalid("object_type", "must not be empty"));
    }
    Ok(())
}

fn validate_noise_level(noise_level: f64) -> Result<()> {
    if !noise_level.is_finite() || !NOISE_LEVEL_RANGE.contains(&noise_level) {
        return Err(CourseError::invalid(
            "noise_level",
            "must be a number between 0 and 100",
        ));
    }
    Ok(())
}

/// Truncate a timestamp to millisecond precision, the resolution the store keeps.
pub fn truncate_to_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timestamp.timestamp_millis()).unwrap_or(timestamp)
}

/// A copy of `point` with its timestamp truncated to milliseconds.
pub fn normalize_point(point: &GeoPoint) -> GeoPoint {
    GeoPoint {
        timestamp: truncate_to_millis(point.timestamp),
        ..*point
    }
}
