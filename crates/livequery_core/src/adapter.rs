//! Database adapter: the uniform transactional contract over a driver.
//!
//! The adapter is the only place that talks to a [`Driver`]. It:
//! - runs statements in transactions of the right [`TransactionMode`]
//! - coerces and validates rows for typed queries
//! - publishes a change notification for the written tables after every
//!   committed write made through [`run`](DatabaseAdapter::run) or
//!   [`run_in_transaction`](DatabaseAdapter::run_in_transaction)
//!
//! Reads never publish. `raw` never publishes, even for writes.

use crate::config::AdapterConfig;
use crate::driver::{Driver, ExecOutcome, TransactionMode};
use crate::error::{CoreError, CoreResult};
use crate::notifier::{Change, Notifier};
use crate::schema::{Fields, Schema};
use crate::tablenames::{is_read_only, TableNameExtractor};
use crate::types::{QualifiedTablename, Row, RunResult, Statement};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Uniform asynchronous access to a transactional database.
///
/// Cloning is cheap: clones share the driver, notifier and extractor.
/// [`with_table_schema`](Self::with_table_schema) derives a clone bound to
/// different [`Fields`] without touching the original.
pub struct DatabaseAdapter<D> {
    driver: Arc<D>,
    notifier: Arc<dyn Notifier>,
    extractor: Arc<dyn TableNameExtractor>,
    config: Arc<AdapterConfig>,
    fields: Option<Arc<Fields>>,
}

impl<D> Clone for DatabaseAdapter<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            notifier: Arc::clone(&self.notifier),
            extractor: Arc::clone(&self.extractor),
            config: Arc::clone(&self.config),
            fields: self.fields.clone(),
        }
    }
}

impl<D: Driver> DatabaseAdapter<D> {
    /// Creates an adapter over `driver`.
    pub fn new<E>(
        driver: D,
        notifier: Arc<dyn Notifier>,
        extractor: E,
        config: AdapterConfig,
    ) -> Self
    where
        E: TableNameExtractor + 'static,
    {
        Self {
            driver: Arc::new(driver),
            notifier,
            extractor: Arc::new(extractor),
            config: Arc::new(config),
            fields: None,
        }
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Returns the notifier writes are published to.
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Returns the underlying driver.
    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// Returns the fields bound to this adapter, if any.
    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_deref()
    }

    /// Returns an adapter bound to `fields` for subsequent queries.
    ///
    /// The receiver is left unchanged; both adapters share the connection.
    #[must_use]
    pub fn with_table_schema(&self, fields: Fields) -> Self {
        Self {
            fields: Some(Arc::new(fields)),
            ..self.clone()
        }
    }

    /// Returns the tables referenced by `statement`, de-duplicated in
    /// first-seen order.
    pub fn table_names(&self, statement: &Statement) -> Vec<QualifiedTablename> {
        let mut tables = Vec::new();
        for table in self
            .extractor
            .extract_table_names(&statement.sql, &self.config.default_namespace)
        {
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
        tables
    }

    /// Executes a statement expected to modify the database.
    ///
    /// After commit, publishes the tables the statement references. A
    /// read-only statement publishes nothing. On failure nothing is
    /// published.
    pub async fn run(&self, statement: &Statement) -> CoreResult<RunResult> {
        let mode = mode_for(statement);
        let outcomes = self.execute(vec![statement.clone()], mode).await?;
        let result = outcomes
            .first()
            .map(ExecOutcome::run_result)
            .unwrap_or_default();

        if !mode.is_read_only() {
            self.publish(self.table_names(statement));
        }
        Ok(result)
    }

    /// Executes several statements in one transaction.
    ///
    /// Affected row counts are summed; the insert rowid is the last one
    /// reported. After commit, publishes the union of the tables of every
    /// write statement, once.
    pub async fn run_in_transaction(&self, statements: &[Statement]) -> CoreResult<RunResult> {
        if statements.is_empty() {
            return Ok(RunResult::default());
        }

        let writes: Vec<&Statement> = statements.iter().filter(|s| !is_read_only(&s.sql)).collect();
        let mode = if writes.is_empty() {
            TransactionMode::ReadOnly
        } else {
            TransactionMode::ReadWrite
        };

        let outcomes = self.execute(statements.to_vec(), mode).await?;
        let mut result = RunResult::default();
        for outcome in &outcomes {
            result.rows_affected += outcome.rows_affected;
            if outcome.last_insert_rowid.is_some() {
                result.last_insert_rowid = outcome.last_insert_rowid;
            }
        }

        if !mode.is_read_only() {
            let mut tables: Vec<QualifiedTablename> = Vec::new();
            for statement in writes {
                for table in self.table_names(statement) {
                    if !tables.contains(&table) {
                        tables.push(table);
                    }
                }
            }
            self.publish(tables);
        }
        Ok(result)
    }

    /// Executes a read and converts each row with `schema`.
    ///
    /// Rows are first coerced with the bound [`Fields`]. If any row fails,
    /// the whole call fails and no rows are returned.
    pub async fn query<S: Schema>(
        &self,
        statement: &Statement,
        schema: &S,
    ) -> CoreResult<Vec<S::Output>> {
        let rows = self.rows(statement).await?;
        let empty = Fields::new();
        let fields = self.fields.as_deref().unwrap_or(&empty);

        rows.iter()
            .enumerate()
            .map(|(index, row)| {
                let record = fields.coerce(index, row)?;
                schema.validate(index, record).map_err(CoreError::from)
            })
            .collect()
    }

    /// Executes a statement and returns its rows verbatim.
    ///
    /// Never publishes a change notification.
    pub async fn raw(&self, statement: &Statement) -> CoreResult<Vec<Row>> {
        self.rows(statement).await
    }

    async fn rows(&self, statement: &Statement) -> CoreResult<Vec<Row>> {
        let outcomes = self
            .execute(vec![statement.clone()], mode_for(statement))
            .await?;
        Ok(outcomes.into_iter().next().map(|o| o.rows).unwrap_or_default())
    }

    async fn execute(
        &self,
        statements: Vec<Statement>,
        mode: TransactionMode,
    ) -> CoreResult<Vec<ExecOutcome>> {
        trace!(count = statements.len(), ?mode, "executing transaction");
        self.driver
            .execute(statements, mode)
            .await
            .map_err(CoreError::from)
    }

    fn publish(&self, tables: Vec<QualifiedTablename>) {
        if tables.is_empty() && !self.config.notify_empty_writes {
            trace!("write touched no recognizable table");
            return;
        }

        debug!(db_name = %self.config.db_name, ?tables, "publishing committed write");
        let changes = tables.into_iter().map(Change::table).collect();
        if let Err(e) = self.notifier.data_changed(&self.config.db_name, changes) {
            // The write is committed; failing the call would invite a retry.
            warn!(db_name = %self.config.db_name, error = %e, "could not publish data change");
        }
    }
}

fn mode_for(statement: &Statement) -> TransactionMode {
    if is_read_only(&statement.sql) {
        TransactionMode::ReadOnly
    } else {
        TransactionMode::ReadWrite
    }
}
