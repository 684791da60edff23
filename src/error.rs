//! Error types for salesload.

use thiserror::Error;

use crate::warehouse::StatementStatus;

/// The main error type for salesload operations.
#[derive(Debug, Error)]
pub enum LoadError {
    /// One or more required job arguments were absent.
    #[error("Missing required job args: {}", .0.join(", "))]
    MissingArgs(Vec<String>),

    /// A storage location could not be parsed.
    #[error("Invalid location '{input}': {message}")]
    InvalidLocation { input: String, message: String },

    /// Runtime settings file could not be read or parsed.
    #[error("Settings error: {0}")]
    Settings(String),

    /// The CSV to Parquet transform failed.
    #[error("Transform error: {0}")]
    Transform(String),

    /// The warehouse statement service rejected a call.
    #[error("Warehouse error: {0}")]
    Warehouse(String),

    /// A statement did not reach a terminal state before the deadline.
    #[error("Statement {id} still {status} after {waited_ms}ms")]
    StatementTimeout {
        id: String,
        status: StatementStatus,
        waited_ms: u128,
    },

    /// A load step finished in a non-Finished terminal state.
    #[error("{step} failed with status {status}")]
    LoadFailed {
        step: &'static str,
        status: StatementStatus,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    /// Create an invalid location error.
    pub fn location(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLocation {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Configuration problems are reported before any remote call and use a
    /// distinct code so schedulers can tell them apart from load failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingArgs(_) | Self::Settings(_) | Self::InvalidLocation { .. } => 2,
            _ => 1,
        }
    }
}

impl From<arrow::error::ArrowError> for LoadError {
    fn from(e: arrow::error::ArrowError) -> Self {
        Self::Transform(e.to_string())
    }
}

impl From<parquet::errors::ParquetError> for LoadError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Self::Transform(e.to_string())
    }
}

impl From<sqlx::Error> for LoadError {
    fn from(e: sqlx::Error) -> Self {
        Self::Warehouse(e.to_string())
    }
}

/// Result type alias for salesload operations.
pub type LoadResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadError::MissingArgs(vec!["raw_bucket".into(), "redshift_iam_role_arn".into()]);
        assert_eq!(
            err.to_string(),
            "Missing required job args: raw_bucket, redshift_iam_role_arn"
        );
    }

    #[test]
    fn test_load_failed_display() {
        let err = LoadError::LoadFailed {
            step: "COPY",
            status: StatementStatus::Aborted,
        };
        assert_eq!(err.to_string(), "COPY failed with status ABORTED");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(LoadError::MissingArgs(vec![]).exit_code(), 2);
        assert_eq!(LoadError::Transform("boom".into()).exit_code(), 1);
    }
}
