//! Property-based test generators using proptest.

use livequery_core::QualifiedTablename;
use proptest::prelude::*;

/// Strategy for table and namespace identifiers.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for qualified table names drawn from a small universe, so that
/// generated sets overlap often.
pub fn tablename_strategy() -> impl Strategy<Value = QualifiedTablename> {
    (
        prop::sample::select(vec!["main", "aux", "temp"]),
        prop::sample::select(vec!["bars", "foos", "items", "users", "todos"]),
    )
        .prop_map(|(ns, table)| QualifiedTablename::new(ns, table))
}

/// Strategy for arbitrary qualified table names.
pub fn any_tablename_strategy() -> impl Strategy<Value = QualifiedTablename> {
    (identifier_strategy(), identifier_strategy())
        .prop_map(|(ns, table)| QualifiedTablename::new(ns, table))
}

/// Strategy for sets of table names (possibly empty).
pub fn tablename_set_strategy(max: usize) -> impl Strategy<Value = Vec<QualifiedTablename>> {
    prop::collection::vec(tablename_strategy(), 0..=max)
}
