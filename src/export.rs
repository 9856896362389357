//! CSV export of stored courses and their points.
//!
//! Exports are written as timestamped files into the configured export
//! directory and served back by file name. Files older than the configured
//! retention are removed by [`CsvExporter::purge_expired`].

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::metrics::chronological_cmp;
use crate::{CourseError, CourseStore, CourseWithPoints, ExportConfig, Result};

/// URL prefix under which export files are downloaded.
pub const DOWNLOAD_PREFIX: &str = "/api/export/download/";

const COURSE_HEADERS: [&str; 14] = [
    "course_id",
    "object_type",
    "mode",
    "noise_level",
    "total_distance",
    "avg_speed",
    "total_speed_changes",
    "total_direction_changes",
    "total_altitude_changes",
    "starting_point_lat",
    "starting_point_lon",
    "ending_point_lat",
    "ending_point_lon",
    "created_by",
];

const POINT_HEADERS: [&str; 7] = [
    "course_id",
    "point_id",
    "object_type",
    "lat",
    "lon",
    "altitude",
    "timestamp",
];

/// Which CSV files an export produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    Courses,
    Points,
    #[default]
    Both,
}

impl ExportFormat {
    fn includes_courses(self) -> bool {
        matches!(self, ExportFormat::Courses | ExportFormat::Both)
    }

    fn includes_points(self) -> bool {
        matches!(self, ExportFormat::Points | ExportFormat::Both)
    }
}

impl FromStr for ExportFormat {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "courses" => Ok(ExportFormat::Courses),
            "points" => Ok(ExportFormat::Points),
            "both" => Ok(ExportFormat::Both),
            other => Err(CourseError::invalid(
                "format",
                format!("'{}' is not one of courses, points, both", other),
            )),
        }
    }
}

/// One written export file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFile {
    pub file_name: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub total_courses: usize,
    pub total_points: usize,
}

/// Result of an export run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportManifest {
    pub message: String,
    pub files: Vec<ExportedFile>,
    pub stats: ExportStats,
}

/// Writes course and point CSV files into an export directory.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    config: ExportConfig,
}

impl CsvExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export every stored course (and/or its points) to CSV files.
    pub fn export(&self, store: &CourseStore, format: ExportFormat) -> Result<ExportManifest> {
        let dir = &self.config.export_dir;
        if dir.exists() && !dir.is_dir() {
            return Err(CourseError::Export {
                message: format!("{} is not a directory", dir.display()),
            });
        }

        let courses = store.all_courses_with_points()?;
        fs::create_dir_all(dir)?;

        let stamp = Utc::now().timestamp_millis();
        let mut files = Vec::new();

        if format.includes_courses() {
            let file_name = format!("courses_{}.csv", stamp);
            let file = File::create(dir.join(&file_name))?;
            write_courses_csv(file, &courses)?;
            files.push(exported(file_name));
        }
        if format.includes_points() {
            let file_name = format!("points_{}.csv", stamp);
            let file = File::create(dir.join(&file_name))?;
            write_points_csv(file, &courses)?;
            files.push(exported(file_name));
        }

        let stats = ExportStats {
            total_courses: courses.len(),
            total_points: courses.iter().map(|c| c.points.len()).sum(),
        };
        log::info!(
            "[CsvExporter] Wrote {} file(s) for {} courses, {} points",
            files.len(),
            stats.total_courses,
            stats.total_points
        );

        Ok(ExportManifest {
            message: "CSV files generated successfully".to_string(),
            files,
            stats,
        })
    }

    /// Path of an existing export file, by bare file name.
    ///
    /// Only names this exporter generates are served; any other file in the
    /// export directory is reported as not found.
    pub fn resolve_download(&self, file_name: &str) -> Result<PathBuf> {
        if file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.contains("..")
        {
            log::warn!("[CsvExporter] Rejected download name {:?}", file_name);
            return Err(CourseError::invalid("file_name", "must be a bare file name"));
        }

        let path = self.config.export_dir.join(file_name);
        if !is_export_file_name(file_name) || !path.is_file() {
            return Err(CourseError::not_found("Export file", file_name));
        }
        Ok(path)
    }

    /// Delete export files whose age has reached the retention period.
    /// Other files in the export directory are left alone.
    /// Returns the number of files removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.config.export_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let is_export = entry.file_name().to_str().is_some_and(is_export_file_name);
            if !is_export {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let age = now
                .duration_since(metadata.modified()?)
                .unwrap_or_default();
            if age >= self.config.retention {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }

        if removed > 0 {
            log::info!("[CsvExporter] Purged {} expired export file(s)", removed);
        }
        Ok(removed)
    }
}

/// True for `courses_<millis>.csv` and `points_<millis>.csv`.
fn is_export_file_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".csv") else {
        return false;
    };
    let stamp = stem
        .strip_prefix("courses_")
        .or_else(|| stem.strip_prefix("points_"));
    match stamp {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

fn exported(file_name: String) -> ExportedFile {
    ExportedFile {
        download_url: format!("{}{}", DOWNLOAD_PREFIX, file_name),
        file_name,
    }
}

/// Write one row per course.
pub fn write_courses_csv<W: Write>(out: W, courses: &[CourseWithPoints]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(COURSE_HEADERS)?;

    for CourseWithPoints { course, .. } in courses {
        let m = &course.metrics;
        writer.write_record([
            course.id.clone(),
            course.object_type.clone(),
            course.mode.to_string(),
            course.noise_level.to_string(),
            m.total_distance.to_string(),
            m.avg_speed.to_string(),
            m.total_speed_changes.to_string(),
            m.total_direction_changes.to_string(),
            m.total_altitude_changes.to_string(),
            m.starting_point.latitude.to_string(),
            m.starting_point.longitude.to_string(),
            m.ending_point.latitude.to_string(),
            m.ending_point.longitude.to_string(),
            course.created_by.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write one row per point, each course's points in chronological order.
pub fn write_points_csv<W: Write>(out: W, courses: &[CourseWithPoints]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(POINT_HEADERS)?;

    for CourseWithPoints { course, points } in courses {
        let mut points: Vec<_> = points.iter().collect();
        points.sort_by(|a, b| chronological_cmp(&a.point, &b.point));

        for p in points {
            writer.write_record([
                course.id.clone(),
                p.point_id.clone(),
                course.object_type.clone(),
                p.point.latitude.to_string(),
                p.point.longitude.to_string(),
                p.point.altitude.to_string(),
                p.point
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}
