//! Configuration for the course store and CSV exporter.
//!
//! Configuration is plain data handed to [`crate::CourseStore::open`] and
//! [`crate::CsvExporter::new`]; nothing is initialized globally.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{CourseError, Result};

/// Environment variable overriding [`StoreConfig::db_path`].
pub const ENV_DB_PATH: &str = "COURSE_DB_PATH";
/// Environment variable overriding [`StoreConfig::default_list_limit`].
pub const ENV_LIST_LIMIT: &str = "COURSE_LIST_LIMIT";
/// Environment variable overriding [`ExportConfig::export_dir`].
pub const ENV_EXPORT_DIR: &str = "COURSE_EXPORT_DIR";
/// Environment variable overriding [`ExportConfig::retention`], in seconds.
pub const ENV_EXPORT_RETENTION_SECS: &str = "COURSE_EXPORT_RETENTION_SECS";

/// Configuration for the SQLite course store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// SQLite database path. `":memory:"` opens a private in-memory database.
    /// Default: "courses.db"
    pub db_path: String,

    /// Number of courses returned by a listing without an explicit limit.
    /// Default: 50
    pub default_list_limit: usize,

    /// Upper bound applied to any requested listing limit.
    /// Default: 1000
    pub max_list_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "courses.db".to_string(),
            default_list_limit: 50,
            max_list_limit: 1000,
        }
    }
}

impl StoreConfig {
    /// In-memory store configuration (for testing).
    pub fn in_memory() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `COURSE_DB_PATH` and `COURSE_LIST_LIMIT`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = read_var(ENV_DB_PATH) {
            config.db_path = path;
        }
        if let Some(limit) = parse_var::<usize>(ENV_LIST_LIMIT)? {
            if limit == 0 {
                return Err(CourseError::Config {
                    message: format!("{} must be greater than zero", ENV_LIST_LIMIT),
                });
            }
            config.default_list_limit = limit;
        }
        Ok(config)
    }

    /// Resolve a requested listing limit against the configured bounds.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_list_limit)
            .min(self.max_list_limit)
    }
}

/// Configuration for CSV export files.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    /// Directory where export files are written and served from.
    /// Default: "temp"
    pub export_dir: PathBuf,

    /// Age after which export files are purged.
    /// Default: 60 seconds
    pub retention: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("temp"),
            retention: Duration::from_secs(60),
        }
    }
}

impl ExportConfig {
    pub fn with_dir(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `COURSE_EXPORT_DIR` and `COURSE_EXPORT_RETENTION_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(dir) = read_var(ENV_EXPORT_DIR) {
            config.export_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_var::<u64>(ENV_EXPORT_RETENTION_SECS)? {
            config.retention = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match read_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| CourseError::Config {
                message: format!("{}='{}' is not a valid number", name, raw),
            }),
    }
}
