//! Error types for livequery core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failure reported by the underlying driver.
///
/// The adapter surfaces these unchanged and never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    /// Driver message.
    pub message: String,
    /// Native error code, if the driver exposes one.
    pub code: Option<i32>,
}

impl DriverError {
    /// Creates a driver error without a native code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Creates a driver error with a native code.
    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

/// A row could not be coerced into the requested record type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row}{}: {message}", column_suffix(.column))]
pub struct SchemaValidationError {
    /// Index of the offending row in the driver result.
    pub row: usize,
    /// Offending column, when the failure is column specific.
    pub column: Option<String>,
    /// Description of the failure.
    pub message: String,
}

impl SchemaValidationError {
    /// Creates an error for a whole row.
    pub fn at_row(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            column: None,
            message: message.into(),
        }
    }

    /// Creates an error for a single column.
    pub fn at_column(row: usize, column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row,
            column: Some(column.into()),
            message: message.into(),
        }
    }
}

fn column_suffix(column: &Option<String>) -> String {
    column
        .as_ref()
        .map(|c| format!(", column `{c}`"))
        .unwrap_or_default()
}

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying execution failure.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// Row-to-record coercion failure. No rows are returned.
    #[error("schema validation failed: {0}")]
    SchemaValidation(#[from] SchemaValidationError),

    /// The notifier has been shut down.
    #[error("notifier is closed")]
    NotifierClosed,

    /// The statement cannot be executed as requested.
    #[error("invalid statement: {message}")]
    InvalidStatement {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid statement error.
    pub fn invalid_statement(message: impl Into<String>) -> Self {
        Self::InvalidStatement {
            message: message.into(),
        }
    }

    /// Returns true if the error came from the driver.
    pub fn is_driver(&self) -> bool {
        matches!(self, CoreError::Driver(_))
    }

    /// Returns true if the error came from schema validation.
    pub fn is_schema_validation(&self) -> bool {
        matches!(self, CoreError::SchemaValidation(_))
    }
}
