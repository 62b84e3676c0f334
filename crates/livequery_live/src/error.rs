//! Error types for live query evaluation.

use livequery_core::{CoreError, DriverError, SchemaValidationError};
use std::any::Any;
use thiserror::Error;

/// Result type for live query evaluation.
pub type SubscriptionResult<T> = Result<T, SubscriptionQueryError>;

/// An error raised while evaluating a live query.
///
/// These are delivered to the subscriber as
/// [`LiveResultUpdate::Error`](crate::LiveResultUpdate::Error); they are
/// never returned from `subscribe`.
#[derive(Debug, Error)]
pub enum SubscriptionQueryError {
    /// The adapter failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The query function failed for another reason.
    #[error("live query failed: {0}")]
    Query(Box<dyn std::error::Error + Send + Sync>),

    /// The query function panicked.
    #[error("live query panicked: {message}")]
    Panicked {
        /// Panic message, if it was a string.
        message: String,
    },
}

impl SubscriptionQueryError {
    /// Wraps an arbitrary error.
    pub fn query(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Query(error.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked { message }
    }

    /// Returns the adapter error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            SubscriptionQueryError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DriverError> for SubscriptionQueryError {
    fn from(e: DriverError) -> Self {
        Self::Core(e.into())
    }
}

impl From<SchemaValidationError> for SubscriptionQueryError {
    fn from(e: SchemaValidationError) -> Self {
        Self::Core(e.into())
    }
}
