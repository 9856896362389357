//! Unified error handling for the course-tracker library.
//!
//! The metrics core is total and never fails. Everything around it (request
//! validation, the course store, CSV export, configuration) reports failures
//! through [`CourseError`].

use thiserror::Error;

/// Unified error type for course-tracker operations.
#[derive(Debug, Error)]
pub enum CourseError {
    /// A request field is missing or out of range
    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    /// A course, point or export file does not exist
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Persistence/storage error
    #[cfg(feature = "persistence")]
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// CSV serialization error
    #[cfg(feature = "persistence")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error while exporting or serving files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export could not be produced
    #[error("Export failed: {message}")]
    Export { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CourseError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        CourseError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        CourseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for errors caused by the caller's request rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CourseError::InvalidInput { .. } | CourseError::NotFound { .. }
        )
    }
}

/// Result type alias for course-tracker operations.
pub type Result<T> = std::result::Result<T, CourseError>;

/// Extension trait for converting Option to CourseError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a not-found error.
    fn ok_or_not_found(self, entity: &'static str, id: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &'static str, id: &str) -> Result<T> {
        self.ok_or_else(|| CourseError::not_found(entity, id))
    }
}
