//! Change notifier for observing committed writes.
//!
//! The notifier is a pub/sub bus that carries "these tables may have
//! changed" signals from the [`DatabaseAdapter`](crate::DatabaseAdapter) to
//! live queries. Notifications are opaque to subscribers: they resolve them
//! into concrete tables with [`Notifier::alias`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use livequery_core::{EventNotifier, Notifier, NotifierConfig};
//!
//! let notifier = EventNotifier::new(NotifierConfig::new("app.db"));
//! let sub = notifier.subscribe_to_data_changes(Arc::new(move |notification| {
//!     println!("changed: {:?}", notifier.alias(notification));
//! }));
//!
//! // ...
//! sub.unsubscribe();
//! ```

use crate::config::NotifierConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::{QualifiedTablename, DEFAULT_NAMESPACE};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// A single changed table, optionally narrowed to specific rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// The table that changed, in the namespace of the reporting database.
    pub qualified_tablename: QualifiedTablename,
    /// Rowids that changed, when known.
    pub rowids: Option<Vec<i64>>,
}

impl Change {
    /// Creates a table-level change.
    pub fn table(qualified_tablename: QualifiedTablename) -> Self {
        Self {
            qualified_tablename,
            rowids: None,
        }
    }

    /// Creates a change narrowed to specific rows.
    pub fn rows(qualified_tablename: QualifiedTablename, rowids: Vec<i64>) -> Self {
        Self {
            qualified_tablename,
            rowids: Some(rowids),
        }
    }
}

/// A "tables potentially changed" signal.
///
/// Subscribers should not inspect the payload directly; resolve it with
/// [`Notifier::alias`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Name of the database that reported the changes.
    pub db_name: String,
    /// Changed tables.
    pub changes: Vec<Change>,
}

impl ChangeNotification {
    /// Creates a notification covering whole tables.
    pub fn for_tables(db_name: impl Into<String>, tables: Vec<QualifiedTablename>) -> Self {
        Self {
            db_name: db_name.into(),
            changes: tables.into_iter().map(Change::table).collect(),
        }
    }
}

/// Callback invoked once per published notification.
pub type DataChangeHandler = Arc<dyn Fn(&ChangeNotification) + Send + Sync>;

/// Registration returned by [`Notifier::subscribe_to_data_changes`].
///
/// Dropping the value does not unsubscribe.
#[must_use = "the handler stays registered until `unsubscribe` is called"]
pub struct NotifierSubscription {
    unsubscribe: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl NotifierSubscription {
    /// Creates a subscription that runs `f` on the first `unsubscribe` call.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            unsubscribe: Mutex::new(Some(Box::new(f))),
        }
    }

    /// Deregisters the handler. Calls after the first are no-ops.
    ///
    /// Safe to call from inside the handler itself.
    pub fn unsubscribe(&self) {
        let f = self.unsubscribe.lock().take();
        if let Some(f) = f {
            f();
        }
    }

    /// Returns true once `unsubscribe` has been called.
    pub fn is_unsubscribed(&self) -> bool {
        self.unsubscribe.lock().is_none()
    }
}

impl std::fmt::Debug for NotifierSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierSubscription")
            .field("unsubscribed", &self.is_unsubscribed())
            .finish()
    }
}

/// A process-wide bus for data change notifications.
pub trait Notifier: Send + Sync {
    /// Registers `handler` for every notification published from now on.
    ///
    /// Handlers are called in publish order. They may run after the
    /// publishing call has returned.
    fn subscribe_to_data_changes(&self, handler: DataChangeHandler) -> NotifierSubscription;

    /// Resolves a notification into the tables it covers.
    ///
    /// Pure: the same notification and attachment state always yield the
    /// same tables, and resolving has no side effects.
    fn alias(&self, notification: &ChangeNotification) -> Vec<QualifiedTablename>;

    /// Publishes a notification for `changes` reported by `db_name`.
    fn data_changed(&self, db_name: &str, changes: Vec<Change>) -> CoreResult<()>;
}

#[derive(Default)]
struct HandlerRegistry {
    handlers: RwLock<BTreeMap<u64, DataChangeHandler>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    fn register(&self, handler: DataChangeHandler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers.write().insert(id, handler);
        id
    }

    fn deregister(&self, id: u64) -> bool {
        self.handlers.write().remove(&id).is_some()
    }

    fn is_registered(&self, id: u64) -> bool {
        self.handlers.read().contains_key(&id)
    }

    fn snapshot(&self) -> Vec<(u64, DataChangeHandler)> {
        self.handlers
            .read()
            .iter()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect()
    }

    fn len(&self) -> usize {
        self.handlers.read().len()
    }

    fn clear(&self) {
        self.handlers.write().clear();
    }
}

/// The default [`Notifier`].
///
/// Published notifications are queued and delivered by a dispatcher task on
/// the Tokio runtime, one notification at a time, to a snapshot of the
/// handlers registered when delivery starts. A handler that panics is
/// logged and skipped; the remaining handlers still run.
///
/// Tables in the `main` namespace of an attached database are reported under
/// the attachment alias.
pub struct EventNotifier {
    config: NotifierConfig,
    registry: Arc<HandlerRegistry>,
    /// Attached database name -> alias.
    attached: RwLock<HashMap<String, String>>,
    sender: Mutex<Option<mpsc::UnboundedSender<ChangeNotification>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl EventNotifier {
    /// Creates a notifier and starts its dispatcher.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new(config: NotifierConfig) -> Self {
        let registry = Arc::new(HandlerRegistry::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(Arc::clone(&registry), rx));

        debug!(db_name = %config.db_name, "notifier started");
        Self {
            config,
            registry,
            attached: RwLock::new(HashMap::new()),
            sender: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Returns the notifier configuration.
    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Records that `db_name` is attached under `alias`.
    pub fn attach(&self, db_name: impl Into<String>, alias: impl Into<String>) {
        self.attached.write().insert(db_name.into(), alias.into());
    }

    /// Forgets the attachment registered under `alias`.
    ///
    /// Returns true if an attachment was removed.
    pub fn detach(&self, alias: &str) -> bool {
        let mut attached = self.attached.write();
        let before = attached.len();
        attached.retain(|_, a| a != alias);
        attached.len() != before
    }

    /// Returns the alias `db_name` is attached under.
    pub fn alias_of(&self, db_name: &str) -> Option<String> {
        self.attached.read().get(db_name).cloned()
    }

    /// Publishes an already built notification.
    pub fn publish(&self, notification: ChangeNotification) -> CoreResult<()> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(CoreError::NotifierClosed)?;
        trace!(
            db_name = %notification.db_name,
            changes = notification.changes.len(),
            "publishing data change"
        );
        sender
            .send(notification)
            .map_err(|_| CoreError::NotifierClosed)
    }

    /// Returns the number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Returns true if the notifier has been shut down.
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stops accepting notifications and drops every handler.
    ///
    /// Notifications already queued are discarded.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        self.registry.clear();
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            dispatcher.abort();
        }
        debug!(db_name = %self.config.db_name, "notifier shut down");
    }
}

impl Notifier for EventNotifier {
    fn subscribe_to_data_changes(&self, handler: DataChangeHandler) -> NotifierSubscription {
        let id = self.registry.register(handler);
        let registry = Arc::downgrade(&self.registry);
        trace!(id, "data change handler registered");
        NotifierSubscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.deregister(id);
                trace!(id, "data change handler deregistered");
            }
        })
    }

    fn alias(&self, notification: &ChangeNotification) -> Vec<QualifiedTablename> {
        let alias = if notification.db_name == self.config.db_name {
            None
        } else {
            self.alias_of(&notification.db_name)
        };

        let mut tables: Vec<QualifiedTablename> = Vec::with_capacity(notification.changes.len());
        for change in &notification.changes {
            let table = match &alias {
                Some(alias) if change.qualified_tablename.is_in(DEFAULT_NAMESPACE) => {
                    QualifiedTablename::new(alias.clone(), change.qualified_tablename.tablename.clone())
                }
                _ => change.qualified_tablename.clone(),
            };
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
        tables
    }

    fn data_changed(&self, db_name: &str, changes: Vec<Change>) -> CoreResult<()> {
        self.publish(ChangeNotification {
            db_name: db_name.to_string(),
            changes,
        })
    }
}

impl Drop for EventNotifier {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get_mut().take() {
            dispatcher.abort();
        }
    }
}

async fn dispatch(
    registry: Arc<HandlerRegistry>,
    mut rx: mpsc::UnboundedReceiver<ChangeNotification>,
) {
    while let Some(notification) = rx.recv().await {
        for (id, handler) in registry.snapshot() {
            // An earlier handler may have unsubscribed this one.
            if !registry.is_registered(id) {
                continue;
            }
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| handler(&notification)));
            if delivered.is_err() {
                warn!(id, db_name = %notification.db_name, "data change handler panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn bars() -> QualifiedTablename {
        QualifiedTablename::new("main", "bars")
    }

    fn channel_handler() -> (DataChangeHandler, mpsc::UnboundedReceiver<ChangeNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: DataChangeHandler = Arc::new(move |n: &ChangeNotification| {
            let _ = tx.send(n.clone());
        });
        (handler, rx)
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<ChangeNotification>) -> ChangeNotification {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let notifier = EventNotifier::new(NotifierConfig::new("test.db"));
        let (handler, mut rx) = channel_handler();
        let _sub = notifier.subscribe_to_data_changes(handler);

        notifier
            .data_changed("test.db", vec![Change::table(bars())])
            .unwrap();

        let received = recv(&mut rx).await;
        assert_eq!(notifier.alias(&received), vec![bars()]);
    }

    #[tokio::test]
    async fn delivery_preserves_publish_order() {
        let notifier = EventNotifier::new(NotifierConfig::new("test.db"));
        let (handler, mut rx) = channel_handler();
        let _sub = notifier.subscribe_to_data_changes(handler);

        for i in 0..10 {
            notifier
                .data_changed("test.db", vec![Change::rows(bars(), vec![i])])
                .unwrap();
        }

        for i in 0..10 {
            let received = recv(&mut rx).await;
            assert_eq!(received.changes[0].rowids, Some(vec![i]));
        }
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let notifier = EventNotifier::new(NotifierConfig::default());
        let (handler, _rx) = channel_handler();
        let sub = notifier.subscribe_to_data_changes(handler);
        assert_eq!(notifier.subscriber_count(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(sub.is_unsubscribed());
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_block_others() {
        let notifier = EventNotifier::new(NotifierConfig::new("test.db"));
        let _bad = notifier.subscribe_to_data_changes(Arc::new(|_: &ChangeNotification| {
            panic!("handler failure");
        }));
        let (handler, mut rx) = channel_handler();
        let _good = notifier.subscribe_to_data_changes(handler);

        notifier
            .data_changed("test.db", vec![Change::table(bars())])
            .unwrap();
        notifier
            .data_changed("test.db", vec![Change::table(bars())])
            .unwrap();

        recv(&mut rx).await;
        recv(&mut rx).await;
    }

    #[tokio::test]
    async fn reentrant_unsubscribe() {
        let notifier = Arc::new(EventNotifier::new(NotifierConfig::new("test.db")));
        let slot: Arc<Mutex<Option<NotifierSubscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let handler_slot = Arc::clone(&slot);
        let handler_calls = Arc::clone(&calls);
        let sub = notifier.subscribe_to_data_changes(Arc::new(move |_: &ChangeNotification| {
            handler_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = handler_slot.lock().as_ref() {
                sub.unsubscribe();
            }
        }));
        *slot.lock() = Some(sub);

        let (probe, mut rx) = channel_handler();
        let _probe = notifier.subscribe_to_data_changes(probe);

        notifier.data_changed("test.db", vec![Change::table(bars())]).unwrap();
        notifier.data_changed("test.db", vec![Change::table(bars())]).unwrap();
        recv(&mut rx).await;
        recv(&mut rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn alias_resolves_attached_databases() {
        let notifier = EventNotifier::new(NotifierConfig::new("test.db"));
        notifier.attach("other.db", "other");

        let notification = ChangeNotification {
            db_name: "other.db".into(),
            changes: vec![
                Change::table(QualifiedTablename::new("main", "foo")),
                Change::table(QualifiedTablename::new("temp", "bar")),
            ],
        };
        assert_eq!(
            notifier.alias(&notification),
            vec![
                QualifiedTablename::new("other", "foo"),
                QualifiedTablename::new("temp", "bar"),
            ]
        );

        assert!(notifier.detach("other"));
        assert!(!notifier.detach("other"));
        assert_eq!(
            notifier.alias(&notification)[0],
            QualifiedTablename::new("main", "foo")
        );
    }

    #[tokio::test]
    async fn alias_deduplicates() {
        let notifier = EventNotifier::new(NotifierConfig::new("test.db"));
        let notification = ChangeNotification {
            db_name: "test.db".into(),
            changes: vec![
                Change::rows(bars(), vec![1]),
                Change::rows(bars(), vec![2]),
            ],
        };
        assert_eq!(notifier.alias(&notification), vec![bars()]);
    }

    #[tokio::test]
    async fn publish_after_shutdown_fails() {
        let notifier = EventNotifier::new(NotifierConfig::new("test.db"));
        notifier.shutdown();

        assert!(notifier.is_closed());
        let result = notifier.data_changed("test.db", vec![Change::table(bars())]);
        assert!(matches!(result, Err(CoreError::NotifierClosed)));
    }
}
