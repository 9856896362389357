//! Course documents and request types.
//!
//! A stored course is its classification metadata plus the metrics derived
//! from its points. Points live alongside it, each with a store-assigned
//! `point_id` (`p1`, `p2`, ...).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CourseError, CourseMetrics, GeoPoint};

/// Whether a course is used for training or for testing players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseMode {
    Training,
    Testing,
}

impl CourseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseMode::Training => "training",
            CourseMode::Testing => "testing",
        }
    }
}

impl fmt::Display for CourseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseMode {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "training" => Ok(CourseMode::Training),
            "testing" => Ok(CourseMode::Testing),
            other => Err(CourseError::invalid(
                "mode",
                format!("expected 'training' or 'testing', got '{}'", other),
            )),
        }
    }
}

/// A stored point of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoursePoint {
    pub point_id: String,
    #[serde(flatten)]
    pub point: GeoPoint,
}

impl CoursePoint {
    pub fn new(point_id: impl Into<String>, point: GeoPoint) -> Self {
        Self {
            point_id: point_id.into(),
            point,
        }
    }
}

/// A stored course document (without its points).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub object_type: String,
    pub mode: CourseMode,
    pub created_by: String,
    /// Percentage (0-100) of synthetic noise applied to the points
    pub noise_level: f64,
    #[serde(flatten)]
    pub metrics: CourseMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A course together with its points, ordered by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseWithPoints {
    #[serde(flatten)]
    pub course: Course,
    pub points: Vec<CoursePoint>,
}

impl CourseWithPoints {
    /// The raw geo-points, in stored order.
    pub fn geo_points(&self) -> Vec<GeoPoint> {
        self.points.iter().map(|p| p.point).collect()
    }
}

/// Request to create a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCourse {
    pub object_type: String,
    pub mode: CourseMode,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub noise_level: f64,
    pub points: Vec<GeoPoint>,
}

impl NewCourse {
    pub fn new(object_type: impl Into<String>, mode: CourseMode, points: Vec<GeoPoint>) -> Self {
        Self {
            object_type: object_type.into(),
            mode,
            created_by: None,
            noise_level: 0.0,
            points,
        }
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn with_noise_level(mut self, noise_level: f64) -> Self {
        self.noise_level = noise_level;
        self
    }
}

/// Partial update of a course. A non-empty `points` replaces the whole point set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseUpdate {
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub mode: Option<CourseMode>,
    #[serde(default)]
    pub noise_level: Option<f64>,
    #[serde(default)]
    pub points: Option<Vec<GeoPoint>>,
}

impl CourseUpdate {
    /// The replacement point set, if one was supplied.
    pub fn replacement_points(&self) -> Option<&[GeoPoint]> {
        self.points.as_deref().filter(|points| !points.is_empty())
    }
}

/// Partial update of a single point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointPatch {
    #[serde(default, rename = "lat", alias = "latitude")]
    pub latitude: Option<f64>,
    #[serde(default, rename = "lon", alias = "longitude")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PointPatch {
    /// Apply the patch on top of an existing point.
    pub fn apply(&self, point: &GeoPoint) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude.unwrap_or(point.latitude),
            longitude: self.longitude.unwrap_or(point.longitude),
            altitude: self.altitude.unwrap_or(point.altitude),
            timestamp: self.timestamp.unwrap_or(point.timestamp),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.latitude.is_none()
            && self.longitude.is_none()
            && self.altitude.is_none()
            && self.timestamp.is_none()
    }
}

/// Query filter for listing courses (newest first).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseFilter {
    pub mode: Option<CourseMode>,
    pub object_type: Option<String>,
    /// Falls back to the store's default list limit
    pub limit: Option<usize>,
}

impl CourseFilter {
    pub fn mode(mut self, mode: CourseMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
