//! Field coercion and the schema validation boundary.
//!
//! Rows read through [`DatabaseAdapter::query`](crate::DatabaseAdapter::query)
//! pass through two stages: the adapter's bound [`Fields`] coerce raw
//! driver values into their declared types, then a [`Schema`] validates the
//! resulting record and turns it into the caller's type.

use crate::error::SchemaValidationError;
use crate::types::{Row, Value};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;

/// A row after field coercion, keyed by column name.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Stored as integer `0`/`1`.
    Bool,
    /// 64-bit integer.
    Integer,
    /// Floating point; integers are widened.
    Real,
    /// UTF-8 text.
    Text,
    /// JSON document stored as text.
    Json,
    /// Raw bytes.
    Blob,
}

/// Column types of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    types: HashMap<String, FieldType>,
}

impl Fields {
    /// Creates an empty field set. Every column passes through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the type of a column.
    #[must_use]
    pub fn field(mut self, column: impl Into<String>, field_type: FieldType) -> Self {
        self.types.insert(column.into(), field_type);
        self
    }

    /// Returns the declared type of a column.
    pub fn get(&self, column: &str) -> Option<FieldType> {
        self.types.get(column).copied()
    }

    /// Number of declared columns.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no column is declared.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Coerces the `index`-th row of a result into a record.
    ///
    /// NULL is accepted for every type.
    pub fn coerce(&self, index: usize, row: &Row) -> Result<Record, SchemaValidationError> {
        let mut record = Record::new();
        for (column, value) in row.iter() {
            let coerced = match self.get(column) {
                Some(field_type) => coerce_value(field_type, value)
                    .map_err(|message| SchemaValidationError::at_column(index, column, message))?,
                None => value.to_json(),
            };
            record.insert(column.to_string(), coerced);
        }
        Ok(record)
    }
}

impl<K: Into<String>> FromIterator<(K, FieldType)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, FieldType)>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().map(|(k, t)| (k.into(), t)).collect(),
        }
    }
}

fn coerce_value(field_type: FieldType, value: &Value) -> Result<serde_json::Value, String> {
    use serde_json::Value as Json;

    match (field_type, value) {
        (_, Value::Null) => Ok(Json::Null),
        (FieldType::Bool, Value::Integer(0)) => Ok(Json::Bool(false)),
        (FieldType::Bool, Value::Integer(1)) => Ok(Json::Bool(true)),
        (FieldType::Integer, Value::Integer(v)) => Ok(Json::from(*v)),
        (FieldType::Integer, Value::Real(v))
            if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 =>
        {
            Ok(Json::from(*v as i64))
        }
        (FieldType::Real, Value::Integer(v)) => Ok(Json::from(*v as f64)),
        (FieldType::Real, Value::Real(_)) => Ok(value.to_json()),
        (FieldType::Text, Value::Text(v)) => Ok(Json::String(v.clone())),
        (FieldType::Json, Value::Text(v)) => {
            serde_json::from_str(v).map_err(|e| format!("invalid JSON: {e}"))
        }
        (FieldType::Blob, Value::Blob(v)) => Ok(Json::from(v.clone())),
        (field_type, value) => Err(format!("expected {field_type:?}, got {value:?}")),
    }
}

/// Validates a coerced record and converts it into a typed value.
pub trait Schema: Send + Sync {
    /// The typed record.
    type Output: Send;

    /// Validates the `index`-th record of a result.
    fn validate(&self, index: usize, record: Record) -> Result<Self::Output, SchemaValidationError>;
}

/// A [`Schema`] backed by `serde` deserialization.
pub struct SerdeSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeSchema<T> {
    /// Creates the schema.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SerdeSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SerdeSchema")
    }
}

impl<T: DeserializeOwned + Send> Schema for SerdeSchema<T> {
    type Output = T;

    fn validate(&self, index: usize, record: Record) -> Result<T, SchemaValidationError> {
        serde_json::from_value(serde_json::Value::Object(record))
            .map_err(|e| SchemaValidationError::at_row(index, e.to_string()))
    }
}

/// A [`Schema`] that accepts any record unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyRecord;

impl Schema for AnyRecord {
    type Output = Record;

    fn validate(&self, _index: usize, record: Record) -> Result<Record, SchemaValidationError> {
        Ok(record)
    }
}
