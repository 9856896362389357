//! # Course Tracker
//!
//! Recording and replaying GPS-like "courses" for object classification games.
//!
//! This library provides:
//! - Course metrics (distance, speed, direction and altitude changes) computed
//!   from raw timestamped points with haversine geometry
//! - A SQLite course store with per-point editing and automatic metric recomputation
//! - Testing sessions with accuracy statistics
//! - CSV export of courses and points
//!
//! ## Features
//!
//! - **`persistence`** (default) - SQLite course store, testing sessions and CSV export
//! - **`parallel`** - Parallel batch metrics computation with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use course_tracker::{compute_course_metrics, GeoPoint};
//!
//! let start = Utc.timestamp_opt(0, 0).unwrap();
//! let points = vec![
//!     GeoPoint::new(0.0, 0.0, 0.0, start),
//!     GeoPoint::new(0.0, 1.0, 10.0, start + chrono::Duration::hours(1)),
//! ];
//!
//! let metrics = compute_course_metrics(&points);
//! assert_eq!(metrics.avg_speed, 30.89);
//! assert_eq!(metrics.total_altitude_changes, 10.0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{CourseError, OptionExt, Result};

// Geographic utilities (distance, bearing, rounding)
pub mod geo_utils;

// Course metrics computation
pub mod metrics;
pub use metrics::{
    compute_course_metrics, compute_course_metrics_with_config, compute_metrics_batch,
    MetricsConfig,
};

// Course documents and request types
pub mod course;
pub use course::{
    Course, CourseFilter, CourseMode, CoursePoint, CourseUpdate, CourseWithPoints, NewCourse,
    PointPatch,
};

// Request validation performed before metrics are computed
pub mod validation;

// Configuration for the store and exporter
pub mod config;
pub use config::{ExportConfig, StoreConfig};

// Testing sessions and statistics
pub mod testing;
pub use testing::{
    summarize_sessions, AnswerKey, HiddenCourse, ObjectTypeStats, SessionOutcome,
    SessionSubmission, TestingChallenge, TestingSession, TestingStats,
};

// SQLite course store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::CourseStore;

// CSV export
#[cfg(feature = "persistence")]
pub mod export;
#[cfg(feature = "persistence")]
pub use export::{CsvExporter, ExportFormat, ExportManifest, ExportStats, ExportedFile};

// ============================================================================
// Core Types
// ============================================================================

/// A latitude/longitude pair in degrees.
///
/// Serialized as `{ "lat": .., "lon": .. }`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLon {
    #[serde(rename = "lat", alias = "latitude")]
    pub latitude: f64,
    #[serde(rename = "lon", alias = "longitude")]
    pub longitude: f64,
}

impl LatLon {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One timestamped latitude/longitude/altitude sample.
///
/// # Example
/// ```
/// use chrono::Utc;
/// use course_tracker::GeoPoint;
/// let point = GeoPoint::new(51.5074, -0.1278, 35.0, Utc::now()); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "lat", alias = "latitude")]
    pub latitude: f64,
    #[serde(rename = "lon", alias = "longitude")]
    pub longitude: f64,
    /// Meters, signed
    pub altitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64, altitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            timestamp,
        }
    }

    /// The horizontal position of this point.
    pub fn position(&self) -> LatLon {
        LatLon::new(self.latitude, self.longitude)
    }

    /// Check if the point has finite values and coordinates in range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.altitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Summary metrics derived from a course's points.
///
/// Fully derived from the point set; recomputed from scratch whenever the
/// points change.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CourseMetrics {
    /// Meters, rounded to 2 decimals
    pub total_distance: f64,
    /// m/s, rounded to 2 decimals
    pub avg_speed: f64,
    pub total_speed_changes: u32,
    pub total_direction_changes: u32,
    /// Meters, rounded to 2 decimals
    pub total_altitude_changes: f64,
    pub starting_point: LatLon,
    pub ending_point: LatLon,
}
