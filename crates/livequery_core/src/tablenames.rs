//! Statement classification and the table-name extraction boundary.
//!
//! Extracting table names from SQL is delegated to a
//! [`TableNameExtractor`]. This module only classifies statements as
//! read-only or write-capable, which is decided from their keywords.

use crate::types::QualifiedTablename;

/// Extracts the tables referenced by a SQL statement.
///
/// Implementations must be pure and may over-approximate, but must never
/// omit a table the statement writes.
pub trait TableNameExtractor: Send + Sync {
    /// Returns the tables referenced by `sql`.
    ///
    /// Unqualified names are placed in `default_namespace`.
    fn extract_table_names(&self, sql: &str, default_namespace: &str) -> Vec<QualifiedTablename>;
}

impl<F> TableNameExtractor for F
where
    F: Fn(&str, &str) -> Vec<QualifiedTablename> + Send + Sync,
{
    fn extract_table_names(&self, sql: &str, default_namespace: &str) -> Vec<QualifiedTablename> {
        self(sql, default_namespace)
    }
}

const READ_ONLY_LEADERS: &[&str] = &["SELECT", "EXPLAIN", "VALUES"];
const WRITE_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "REPLACE"];

/// Returns true if `sql` cannot modify the database.
///
/// A statement is read-only when its first keyword is `SELECT`, `EXPLAIN`
/// or `VALUES`, or when it starts with `WITH` and no `INSERT`, `UPDATE`,
/// `DELETE` or `REPLACE` keyword follows. A string holding several
/// statements separated by `;` is read-only only if each of them is.
/// Comments and quoted text are ignored.
pub fn is_read_only(sql: &str) -> bool {
    let mut words = Keywords::new(sql).peekable();
    let mut statements = 0;
    while words.peek().is_some() {
        let statement: Vec<&str> = words.by_ref().take_while(|w| *w != ";").collect();
        if statement.is_empty() {
            continue;
        }
        if !statement_is_read_only(&statement) {
            return false;
        }
        statements += 1;
    }
    statements > 0
}

fn statement_is_read_only(words: &[&str]) -> bool {
    match words.split_first() {
        Some((first, _)) if READ_ONLY_LEADERS.iter().any(|k| first.eq_ignore_ascii_case(k)) => {
            true
        }
        Some((first, rest)) if first.eq_ignore_ascii_case("WITH") => !rest
            .iter()
            .any(|w| WRITE_KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k))),
        _ => false,
    }
}

/// Iterator over bare words of a SQL string, skipping comments, string
/// literals and quoted identifiers. Statement separators come out as `";"`.
struct Keywords<'a> {
    sql: &'a str,
    pos: usize,
}

impl<'a> Keywords<'a> {
    fn new(sql: &'a str) -> Self {
        Self { sql, pos: 0 }
    }

    fn skip_until(&mut self, terminator: &[u8]) {
        let rest = &self.sql.as_bytes()[self.pos..];
        match rest
            .windows(terminator.len())
            .position(|window| window == terminator)
        {
            Some(offset) => self.pos += offset + terminator.len(),
            None => self.pos = self.sql.len(),
        }
    }
}

impl<'a> Iterator for Keywords<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let bytes = self.sql.as_bytes();
        while self.pos < bytes.len() {
            let rest = &bytes[self.pos..];
            let c = bytes[self.pos];
            if rest.starts_with(b"--") {
                self.skip_until(b"\n");
            } else if rest.starts_with(b"/*") {
                self.pos += 2;
                self.skip_until(b"*/");
            } else if c == b'\'' || c == b'"' || c == b'`' {
                self.pos += 1;
                self.skip_until(&[c]);
            } else if c == b'[' {
                self.skip_until(b"]");
            } else if c == b';' {
                self.pos += 1;
                return Some(";");
            } else if c.is_ascii_alphabetic() || c == b'_' {
                let start = self.pos;
                while self.pos < bytes.len()
                    && (bytes[self.pos].is_ascii_alphanumeric() || bytes[self.pos] == b'_')
                {
                    self.pos += 1;
                }
                // Word boundaries are ASCII, so the slice is on char boundaries.
                return Some(&self.sql[start..self.pos]);
            } else {
                self.pos += 1;
            }
        }
        None
    }
}
