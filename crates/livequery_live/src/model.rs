//! Live query results and updates.

use crate::error::SubscriptionQueryError;
use livequery_core::QualifiedTablename;
use std::time::SystemTime;

/// A computed value plus the tables read to compute it.
///
/// `tablenames` may be wider than necessary but must include every table
/// that was actually read.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveResult<T> {
    /// The computed value.
    pub result: T,
    /// Tables the computation read.
    pub tablenames: Vec<QualifiedTablename>,
}

impl<T> LiveResult<T> {
    /// Creates a live result.
    pub fn new(result: T, tablenames: Vec<QualifiedTablename>) -> Self {
        Self { result, tablenames }
    }
}

/// One delivery to a live query subscriber.
#[derive(Debug)]
pub enum LiveResultUpdate<T> {
    /// The query succeeded.
    Results {
        /// Fresh query results.
        results: T,
        /// When the results were delivered.
        updated_at: SystemTime,
    },
    /// The query failed. The subscription stays active.
    Error {
        /// Why the query failed.
        error: SubscriptionQueryError,
        /// When the failure was delivered.
        updated_at: SystemTime,
    },
}

impl<T> LiveResultUpdate<T> {
    /// Returns the delivery timestamp.
    pub fn updated_at(&self) -> SystemTime {
        match self {
            LiveResultUpdate::Results { updated_at, .. } => *updated_at,
            LiveResultUpdate::Error { updated_at, .. } => *updated_at,
        }
    }

    /// Returns the results of a successful update.
    pub fn results(&self) -> Option<&T> {
        match self {
            LiveResultUpdate::Results { results, .. } => Some(results),
            LiveResultUpdate::Error { .. } => None,
        }
    }

    /// Returns the error of a failed update.
    pub fn error(&self) -> Option<&SubscriptionQueryError> {
        match self {
            LiveResultUpdate::Results { .. } => None,
            LiveResultUpdate::Error { error, .. } => Some(error),
        }
    }

    /// Returns true for failed updates.
    pub fn is_error(&self) -> bool {
        matches!(self, LiveResultUpdate::Error { .. })
    }

    /// Converts the update into a `Result`.
    pub fn into_result(self) -> Result<T, SubscriptionQueryError> {
        match self {
            LiveResultUpdate::Results { results, .. } => Ok(results),
            LiveResultUpdate::Error { error, .. } => Err(error),
        }
    }
}
