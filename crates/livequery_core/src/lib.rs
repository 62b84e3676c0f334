//! # livequery core
//!
//! Database adapter contract, change notifier and data model for livequery.
//!
//! This crate provides:
//! - `DatabaseAdapter`: a uniform async `run` / `query` / `raw` contract over
//!   callback-style, blocking or async drivers
//! - Table-level change tracking: every committed write publishes the tables
//!   it touched
//! - `EventNotifier`: the pub/sub bus carrying those notifications
//! - Field coercion and schema validation for typed queries
//!
//! ## Key Invariants
//!
//! - A notification is published only after the write committed
//! - Reads never publish
//! - A typed query either returns every row or fails
//! - `with_table_schema` never mutates the receiver

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod driver;
mod error;
mod notifier;
mod schema;
mod tablenames;
mod types;

pub use adapter::DatabaseAdapter;
pub use config::{AdapterConfig, NotifierConfig};
pub use driver::{
    BlockingConnection, BlockingDriver, CallbackConnection, CallbackDriver, Driver, ErrorCallback,
    ExecOutcome, SuccessCallback, TransactionMode,
};
pub use error::{CoreError, CoreResult, DriverError, SchemaValidationError};
pub use notifier::{
    Change, ChangeNotification, DataChangeHandler, EventNotifier, Notifier, NotifierSubscription,
};
pub use schema::{AnyRecord, FieldType, Fields, Record, Schema, SerdeSchema};
pub use tablenames::{is_read_only, TableNameExtractor};
pub use types::{
    has_intersection, BindParams, QualifiedTablename, Row, RunResult, Statement, Value,
    DEFAULT_NAMESPACE,
};
