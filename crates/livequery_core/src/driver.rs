//! Driver boundary.
//!
//! Native drivers come in different calling conventions. The adapter only
//! speaks the asynchronous [`Driver`] contract; [`CallbackDriver`] and
//! [`BlockingDriver`] translate callback-style and synchronous connections
//! into it.

use crate::error::DriverError;
use crate::types::{Row, RunResult, Statement};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Whether a transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// The transaction only reads.
    ReadOnly,
    /// The transaction may write.
    ReadWrite,
}

impl TransactionMode {
    /// Returns true for read-only transactions.
    pub fn is_read_only(&self) -> bool {
        matches!(self, TransactionMode::ReadOnly)
    }
}

/// Result of executing one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutcome {
    /// Returned rows, in driver order.
    pub rows: Vec<Row>,
    /// Rows inserted, updated or deleted.
    pub rows_affected: u64,
    /// Rowid of the last inserted row, if any.
    pub last_insert_rowid: Option<i64>,
}

impl ExecOutcome {
    /// Creates an outcome that only carries rows.
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Creates an outcome for a write.
    pub fn write(rows_affected: u64, last_insert_rowid: Option<i64>) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
            last_insert_rowid,
        }
    }

    /// Returns the write summary of this outcome.
    pub fn run_result(&self) -> RunResult {
        RunResult {
            rows_affected: self.rows_affected,
            last_insert_rowid: self.last_insert_rowid,
        }
    }
}

/// Asynchronous transactional driver.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Executes `statements` in a single transaction.
    ///
    /// Resolves after the transaction has committed, with one outcome per
    /// statement. On error the transaction is rolled back.
    async fn execute(
        &self,
        statements: Vec<Statement>,
        mode: TransactionMode,
    ) -> Result<Vec<ExecOutcome>, DriverError>;
}

#[async_trait]
impl<D: Driver + ?Sized> Driver for Arc<D> {
    async fn execute(
        &self,
        statements: Vec<Statement>,
        mode: TransactionMode,
    ) -> Result<Vec<ExecOutcome>, DriverError> {
        (**self).execute(statements, mode).await
    }
}

/// Called once with the outcomes of a committed transaction.
pub type SuccessCallback = Box<dyn FnOnce(Vec<ExecOutcome>) + Send>;

/// Called once with the failure of a rolled back transaction.
pub type ErrorCallback = Box<dyn FnOnce(DriverError) + Send>;

/// A connection that reports completion through callbacks.
///
/// Exactly one of the callbacks should be invoked, from any thread, either
/// before or after `transaction` returns.
pub trait CallbackConnection: Send + Sync + 'static {
    /// Starts a transaction over `statements`.
    fn transaction(
        &self,
        statements: Vec<Statement>,
        mode: TransactionMode,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    );
}

/// [`Driver`] over a [`CallbackConnection`].
///
/// A connection that drops both callbacks without calling either fails the
/// call with a [`DriverError`].
pub struct CallbackDriver<C> {
    conn: Arc<C>,
}

impl<C: CallbackConnection> CallbackDriver<C> {
    /// Wraps a callback-style connection.
    pub fn new(conn: C) -> Self {
        Self {
            conn: Arc::new(conn),
        }
    }

    /// Wraps a shared callback-style connection.
    pub fn from_arc(conn: Arc<C>) -> Self {
        Self { conn }
    }

    /// Returns the wrapped connection.
    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }
}

type Completion = Arc<Mutex<Option<oneshot::Sender<Result<Vec<ExecOutcome>, DriverError>>>>>;

fn complete(slot: &Completion, result: Result<Vec<ExecOutcome>, DriverError>) {
    if let Some(tx) = slot.lock().take() {
        // The caller may have stopped waiting.
        let _ = tx.send(result);
    }
}

#[async_trait]
impl<C: CallbackConnection> Driver for CallbackDriver<C> {
    async fn execute(
        &self,
        statements: Vec<Statement>,
        mode: TransactionMode,
    ) -> Result<Vec<ExecOutcome>, DriverError> {
        let (tx, rx) = oneshot::channel();
        let on_success_slot: Completion = Arc::new(Mutex::new(Some(tx)));
        let on_error_slot = Arc::clone(&on_success_slot);

        self.conn.transaction(
            statements,
            mode,
            Box::new(move |outcomes| complete(&on_success_slot, Ok(outcomes))),
            Box::new(move |error| complete(&on_error_slot, Err(error))),
        );

        rx.await
            .map_err(|_| DriverError::new("connection dropped its callbacks without completing"))?
    }
}

/// A connection with a synchronous API.
pub trait BlockingConnection: Send + 'static {
    /// Executes `statements` in one transaction, blocking until commit.
    fn transaction(
        &mut self,
        statements: &[Statement],
        mode: TransactionMode,
    ) -> Result<Vec<ExecOutcome>, DriverError>;
}

/// [`Driver`] over a [`BlockingConnection`].
///
/// Calls run on Tokio's blocking pool, one at a time.
pub struct BlockingDriver<C> {
    conn: Arc<Mutex<C>>,
}

impl<C: BlockingConnection> BlockingDriver<C> {
    /// Wraps a blocking connection.
    pub fn new(conn: C) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

#[async_trait]
impl<C: BlockingConnection> Driver for BlockingDriver<C> {
    async fn execute(
        &self,
        statements: Vec<Statement>,
        mode: TransactionMode,
    ) -> Result<Vec<ExecOutcome>, DriverError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || conn.lock().transaction(&statements, mode))
            .await
            .map_err(|e| DriverError::new(format!("blocking driver task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    /// Completes on another thread after a short delay.
    struct ThreadedConnection;

    impl CallbackConnection for ThreadedConnection {
        fn transaction(
            &self,
            statements: Vec<Statement>,
            _mode: TransactionMode,
            on_success: SuccessCallback,
            on_error: ErrorCallback,
        ) {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                if statements.iter().any(|s| s.sql.contains("fail")) {
                    on_error(DriverError::with_code("forced failure", 1));
                } else {
                    on_success(statements.iter().map(|_| ExecOutcome::write(1, None)).collect());
                }
            });
        }
    }

    /// Never calls back.
    struct SilentConnection;

    impl CallbackConnection for SilentConnection {
        fn transaction(
            &self,
            _statements: Vec<Statement>,
            _mode: TransactionMode,
            _on_success: SuccessCallback,
            _on_error: ErrorCallback,
        ) {
        }
    }

    #[derive(Default)]
    struct LoggingConnection {
        log: Vec<String>,
    }

    impl BlockingConnection for LoggingConnection {
        fn transaction(
            &mut self,
            statements: &[Statement],
            _mode: TransactionMode,
        ) -> Result<Vec<ExecOutcome>, DriverError> {
            self.log.extend(statements.iter().map(|s| s.sql.clone()));
            Ok(vec![ExecOutcome::write(self.log.len() as u64, Some(7))])
        }
    }

    #[tokio::test]
    async fn callback_driver_success() {
        let driver = CallbackDriver::new(ThreadedConnection);
        let outcomes = driver
            .execute(
                vec![Statement::new("update a"), Statement::new("update b")],
                TransactionMode::ReadWrite,
            )
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn callback_driver_error() {
        let driver = CallbackDriver::new(ThreadedConnection);
        let err = driver
            .execute(vec![Statement::new("fail")], TransactionMode::ReadWrite)
            .await
            .unwrap_err();
        assert_eq!(err.code, Some(1));
    }

    #[tokio::test]
    async fn callback_driver_dropped_callbacks() {
        let driver = CallbackDriver::new(SilentConnection);
        let result = driver
            .execute(vec![Statement::new("select 1")], TransactionMode::ReadOnly)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn blocking_driver_runs_on_pool() {
        let driver = BlockingDriver::new(LoggingConnection::default());
        let first = driver
            .execute(vec![Statement::new("insert 1")], TransactionMode::ReadWrite)
            .await
            .unwrap();
        let second = driver
            .execute(vec![Statement::new("insert 2")], TransactionMode::ReadWrite)
            .await
            .unwrap();

        assert_eq!(first[0].run_result().rows_affected, 1);
        assert_eq!(second[0].run_result().rows_affected, 2);
        assert_eq!(second[0].last_insert_rowid, Some(7));
    }
}
