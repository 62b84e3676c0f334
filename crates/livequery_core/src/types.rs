//! Value types shared by the adapter, the notifier and the live query engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace used when a statement does not qualify a table.
pub const DEFAULT_NAMESPACE: &str = "main";

/// A table identified by its namespace (schema) and name.
///
/// Equality is component-wise and case sensitive; drivers that fold case
/// must do so before constructing the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedTablename {
    /// Namespace the table lives in (`main`, `temp`, or an attachment alias).
    pub namespace: String,
    /// Unqualified table name.
    pub tablename: String,
}

impl QualifiedTablename {
    /// Creates a qualified table name.
    pub fn new(namespace: impl Into<String>, tablename: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            tablename: tablename.into(),
        }
    }

    /// Parses `namespace.table` or a bare `table`.
    ///
    /// A bare name is placed in `default_namespace`.
    pub fn parse(name: &str, default_namespace: &str) -> Self {
        match name.split_once('.') {
            Some((namespace, tablename)) => Self::new(namespace, tablename),
            None => Self::new(default_namespace, name),
        }
    }

    /// Returns true if the table lives in `namespace`.
    pub fn is_in(&self, namespace: &str) -> bool {
        self.namespace == namespace
    }
}

impl fmt::Display for QualifiedTablename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.tablename)
    }
}

/// Returns true if `a` and `b` share at least one table.
pub fn has_intersection(a: &[QualifiedTablename], b: &[QualifiedTablename]) -> bool {
    a.iter().any(|table| b.contains(table))
}

/// A scalar column value as returned by SQLite-style drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Converts the value into its JSON counterpart.
    ///
    /// Blobs become arrays of bytes; non-finite reals become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(v) => serde_json::Value::from(*v),
            Value::Real(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(v) => serde_json::Value::String(v.clone()),
            Value::Blob(v) => serde_json::Value::from(v.clone()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

/// Booleans are stored as `0`/`1`, as SQLite does.
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result record: column names mapped to scalar values.
///
/// Column order is the order the driver returned them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column, consuming and returning the row.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets a column, replacing an existing value with the same name.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Returns the value of a column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Converts the row into a JSON object.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

/// Bind parameters of a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum BindParams {
    /// No parameters.
    #[default]
    None,
    /// `?` placeholders, bound in order.
    Positional(Vec<Value>),
    /// `:name` / `@name` / `$name` placeholders.
    Named(Vec<(String, Value)>),
}

impl BindParams {
    /// Number of bound values.
    pub fn len(&self) -> usize {
        match self {
            BindParams::None => 0,
            BindParams::Positional(values) => values.len(),
            BindParams::Named(values) => values.len(),
        }
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SQL text plus bind parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// SQL text, passed to the driver verbatim.
    pub sql: String,
    /// Bind parameters.
    #[serde(default)]
    pub args: BindParams,
}

impl Statement {
    /// Creates a statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: BindParams::None,
        }
    }

    /// Binds positional parameters.
    #[must_use]
    pub fn with_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args = BindParams::Positional(args.into_iter().map(Into::into).collect());
        self
    }

    /// Binds named parameters.
    #[must_use]
    pub fn with_named<I, K, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.args = BindParams::Named(
            args.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        );
        self
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

/// Outcome of a non-row-returning execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Rows inserted, updated or deleted.
    pub rows_affected: u64,
    /// Rowid of the last inserted row, if the driver reports one.
    pub last_insert_rowid: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_tablename_equality() {
        let a = QualifiedTablename::new("main", "bars");
        let b = QualifiedTablename::new("main", "bars");
        let c = QualifiedTablename::new("other", "bars");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "main.bars");
    }

    #[test]
    fn qualified_tablename_parse() {
        assert_eq!(
            QualifiedTablename::parse("bars", DEFAULT_NAMESPACE),
            QualifiedTablename::new("main", "bars")
        );
        assert_eq!(
            QualifiedTablename::parse("aux.bars", DEFAULT_NAMESPACE),
            QualifiedTablename::new("aux", "bars")
        );
    }

    #[test]
    fn intersection() {
        let a = vec![QualifiedTablename::new("main", "a")];
        let ab = vec![
            QualifiedTablename::new("main", "a"),
            QualifiedTablename::new("main", "b"),
        ];
        let b = vec![QualifiedTablename::new("main", "b")];

        assert!(has_intersection(&a, &ab));
        assert!(!has_intersection(&a, &b));
        assert!(!has_intersection(&a, &[]));
    }

    #[test]
    fn row_insert_replaces() {
        let mut row = Row::new().with("i", 0).with("name", "x");
        row.insert("i", 1);

        assert_eq!(row.len(), 2);
        assert_eq!(row.get("i"), Some(&Value::Integer(1)));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn row_to_json() {
        let row = Row::new()
            .with("i", 1)
            .with("r", 0.5)
            .with("t", "hi")
            .with("n", Value::Null);
        let json = serde_json::Value::Object(row.to_json());
        assert_eq!(
            json,
            serde_json::json!({ "i": 1, "r": 0.5, "t": "hi", "n": null })
        );
    }

    #[test]
    fn statement_builders() {
        let stmt = Statement::new("select * from bars where id = ?").with_args([1i64]);
        assert_eq!(stmt.args.len(), 1);

        let stmt = Statement::from("select 1");
        assert!(stmt.args.is_empty());
    }
}
