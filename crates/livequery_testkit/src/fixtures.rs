//! Test fixtures: a mock connection, a recording notifier and helpers that
//! wire them into a [`DatabaseAdapter`].

use crate::extractor::KeywordExtractor;
use livequery_core::{
    is_read_only, AdapterConfig, CallbackConnection, CallbackDriver, Change, ChangeNotification,
    CoreResult, DataChangeHandler, DatabaseAdapter, DriverError, ErrorCallback, EventNotifier,
    ExecOutcome, Notifier, NotifierConfig, NotifierSubscription, QualifiedTablename, Row,
    Statement, SuccessCallback, TransactionMode,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// The adapter type produced by [`init_testable`].
pub type TestAdapter = DatabaseAdapter<CallbackDriver<MockConnection>>;

/// A transaction as seen by [`MockConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTransaction {
    /// Statements of the transaction.
    pub statements: Vec<Statement>,
    /// Requested mode.
    pub mode: TransactionMode,
}

/// A callback-style connection that executes nothing.
///
/// Read statements return the configured rows (`[{i: 0}]` by default);
/// writes report one affected row. Completion happens synchronously unless
/// a delay is set, in which case callbacks fire from another thread.
pub struct MockConnection {
    name: String,
    rows: Mutex<Vec<Row>>,
    transactions: Mutex<Vec<RecordedTransaction>>,
    fail_next: Mutex<Option<DriverError>>,
    delay: Mutex<Option<Duration>>,
}

impl MockConnection {
    /// Creates a mock connection for the named database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Mutex::new(vec![Row::new().with("i", 0)]),
            transactions: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            delay: Mutex::new(None),
        }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the rows returned by subsequent reads.
    pub fn set_rows(&self, rows: Vec<Row>) {
        *self.rows.lock() = rows;
    }

    /// Makes the next transaction fail with `error`.
    pub fn fail_next(&self, error: DriverError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Delays completion of subsequent transactions.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Returns every transaction received so far.
    pub fn transactions(&self) -> Vec<RecordedTransaction> {
        self.transactions.lock().clone()
    }

    fn outcomes(&self, statements: &[Statement]) -> Vec<ExecOutcome> {
        let rows = self.rows.lock().clone();
        statements
            .iter()
            .map(|s| {
                if is_read_only(&s.sql) {
                    ExecOutcome::rows(rows.clone())
                } else {
                    ExecOutcome::write(1, None)
                }
            })
            .collect()
    }
}

impl CallbackConnection for MockConnection {
    fn transaction(
        &self,
        statements: Vec<Statement>,
        mode: TransactionMode,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) {
        let result = match self.fail_next.lock().take() {
            Some(error) => Err(error),
            None => Ok(self.outcomes(&statements)),
        };
        self.transactions
            .lock()
            .push(RecordedTransaction { statements, mode });

        let complete = move || match result {
            Ok(outcomes) => on_success(outcomes),
            Err(error) => on_error(error),
        };
        match *self.delay.lock() {
            Some(delay) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    complete();
                });
            }
            None => complete(),
        }
    }
}

/// A [`Notifier`] that records every published notification before
/// handing it to an [`EventNotifier`].
pub struct RecordingNotifier {
    inner: EventNotifier,
    notifications: Mutex<Vec<ChangeNotification>>,
}

impl RecordingNotifier {
    /// Creates a recording notifier for the named database.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            inner: EventNotifier::new(NotifierConfig::new(db_name)),
            notifications: Mutex::new(Vec::new()),
        }
    }

    /// Returns the notifications published so far.
    pub fn notifications(&self) -> Vec<ChangeNotification> {
        self.notifications.lock().clone()
    }

    /// Returns the resolved tables of every published notification.
    pub fn published_tables(&self) -> Vec<Vec<QualifiedTablename>> {
        self.notifications()
            .iter()
            .map(|n| self.inner.alias(n))
            .collect()
    }

    /// Returns the wrapped notifier.
    pub fn inner(&self) -> &EventNotifier {
        &self.inner
    }
}

impl Notifier for RecordingNotifier {
    fn subscribe_to_data_changes(&self, handler: DataChangeHandler) -> NotifierSubscription {
        self.inner.subscribe_to_data_changes(handler)
    }

    fn alias(&self, notification: &ChangeNotification) -> Vec<QualifiedTablename> {
        self.inner.alias(notification)
    }

    fn data_changed(&self, db_name: &str, changes: Vec<Change>) -> CoreResult<()> {
        self.notifications.lock().push(ChangeNotification {
            db_name: db_name.to_string(),
            changes: changes.clone(),
        });
        self.inner.data_changed(db_name, changes)
    }
}

/// Creates a mock connection, a recording notifier and an adapter wired to
/// both, using [`KeywordExtractor`] for table names.
///
/// Must be called from within a Tokio runtime.
pub fn init_testable(
    db_name: &str,
) -> (Arc<MockConnection>, Arc<RecordingNotifier>, TestAdapter) {
    let conn = Arc::new(MockConnection::new(db_name));
    let notifier = Arc::new(RecordingNotifier::new(db_name));
    let adapter = DatabaseAdapter::new(
        CallbackDriver::from_arc(Arc::clone(&conn)),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        KeywordExtractor,
        AdapterConfig::new(db_name),
    );
    (conn, notifier, adapter)
}

/// Shorthand for a table in the `main` namespace.
pub fn main_table(tablename: &str) -> QualifiedTablename {
    QualifiedTablename::new(livequery_core::DEFAULT_NAMESPACE, tablename)
}
