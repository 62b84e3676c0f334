//! A keyword-based table-name extractor for tests.
//!
//! Takes the word following `FROM`, `JOIN`, `INTO`, `UPDATE` and `TABLE` as
//! a table name. Good enough for the statements used in tests; not a SQL
//! parser.

use livequery_core::{QualifiedTablename, TableNameExtractor};

const TABLE_KEYWORDS: &[&str] = &["FROM", "JOIN", "INTO", "UPDATE", "TABLE"];

/// Extracts table names by looking at the word after table keywords.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordExtractor;

impl TableNameExtractor for KeywordExtractor {
    fn extract_table_names(&self, sql: &str, default_namespace: &str) -> Vec<QualifiedTablename> {
        let words: Vec<&str> = sql
            .split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ',' | ';'))
            .filter(|w| !w.is_empty())
            .collect();

        let mut tables = Vec::new();
        for pair in words.windows(2) {
            if TABLE_KEYWORDS.iter().any(|k| pair[0].eq_ignore_ascii_case(k)) {
                let name = pair[1].trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'));
                let table = QualifiedTablename::parse(name, default_namespace);
                if !tables.contains(&table) {
                    tables.push(table);
                }
            }
        }
        tables
    }
}
