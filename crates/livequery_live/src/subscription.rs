//! Live query subscriptions.
//!
//! A subscription evaluates its live query once right away and again every
//! time the notifier reports a change to one of the query's tables.
//!
//! ## Lifecycle
//!
//! ```text
//! subscribe ──► Active ──unsubscribe──► Cancelled
//!                 │  ▲
//!                 ▼  │ re-evaluate on intersecting change
//!               deliver
//! ```
//!
//! ## Dependency set
//!
//! The tables a subscription reacts to are the ones passed to
//! [`create_query_result_subscribe_function`]; when none were passed, they
//! are taken from the first successful evaluation and never change
//! afterwards. Until then no change triggers a re-evaluation.
//!
//! ## Overlapping evaluations
//!
//! Evaluations are not serialized. When changes arrive faster than the
//! query resolves, evaluations overlap and are delivered in the order they
//! resolve. Deliveries to one handler never run concurrently.
//!
//! ## Ownership
//!
//! The notifier keeps a subscription alive until it is unsubscribed; a
//! subscription only holds the notifier weakly. Dropping the notifier
//! releases every subscription registered with it.

use crate::error::{SubscriptionQueryError, SubscriptionResult};
use crate::model::{LiveResult, LiveResultUpdate};
use futures::future::BoxFuture;
use futures::FutureExt;
use livequery_core::{
    has_intersection, ChangeNotification, DataChangeHandler, Notifier, NotifierSubscription,
    QualifiedTablename,
};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;
use tracing::{debug, trace, warn};

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback receiving live query updates.
pub type LiveResultHandler<T> = Arc<dyn Fn(LiveResultUpdate<T>) + Send + Sync>;

type LiveQueryFn<T> =
    Arc<dyn Fn() -> BoxFuture<'static, SubscriptionResult<LiveResult<T>>> + Send + Sync>;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Builds a subscribe function for `live_query`.
///
/// Each call to [`LiveResultSubscribeFunction::subscribe`] starts an
/// independent subscription. `relevant_tablenames`, when given, replaces
/// the tables reported by the query as the dependency set.
///
/// # Example
///
/// ```rust,ignore
/// let subscribe = create_query_result_subscribe_function(
///     notifier,
///     move || {
///         let adapter = adapter.clone();
///         async move {
///             let stmt = Statement::new("select * from bars");
///             let rows = adapter.raw(&stmt).await?;
///             Ok::<_, CoreError>(LiveResult::new(rows, adapter.table_names(&stmt)))
///         }
///     },
///     None,
/// );
/// let subscription = subscribe.subscribe(|update| println!("{update:?}"));
/// ```
pub fn create_query_result_subscribe_function<T, F, Fut, E>(
    notifier: Arc<dyn Notifier>,
    live_query: F,
    relevant_tablenames: Option<Vec<QualifiedTablename>>,
) -> LiveResultSubscribeFunction<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<LiveResult<T>, E>> + Send + 'static,
    E: Into<SubscriptionQueryError> + Send + 'static,
{
    let query: LiveQueryFn<T> = Arc::new(move || {
        let evaluation = live_query();
        async move { evaluation.await.map_err(Into::into) }.boxed()
    });

    LiveResultSubscribeFunction {
        notifier,
        query,
        relevant_tablenames,
    }
}

/// Starts subscriptions to a live query. See
/// [`create_query_result_subscribe_function`].
pub struct LiveResultSubscribeFunction<T> {
    notifier: Arc<dyn Notifier>,
    query: LiveQueryFn<T>,
    relevant_tablenames: Option<Vec<QualifiedTablename>>,
}

impl<T> Clone for LiveResultSubscribeFunction<T> {
    fn clone(&self) -> Self {
        Self {
            notifier: Arc::clone(&self.notifier),
            query: Arc::clone(&self.query),
            relevant_tablenames: self.relevant_tablenames.clone(),
        }
    }
}

impl<T: Send + 'static> LiveResultSubscribeFunction<T> {
    /// Subscribes `handler` to the query results.
    ///
    /// The first evaluation starts immediately; its result (or error) is
    /// the first delivery. Query errors are delivered, never returned.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<H>(&self, handler: H) -> LiveSubscription
    where
        H: Fn(LiveResultUpdate<T>) + Send + Sync + 'static,
    {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(ActiveSubscription {
            id,
            notifier: Arc::downgrade(&self.notifier),
            query: Arc::clone(&self.query),
            handler: Arc::new(handler),
            cancelled: AtomicBool::new(false),
            relevant_tablenames: Mutex::new(self.relevant_tablenames.clone()),
            delivery: Mutex::new(()),
            registration: Mutex::new(None),
        });

        let on_change = Arc::clone(&active);
        let data_change_handler: DataChangeHandler =
            Arc::new(move |notification: &ChangeNotification| {
                on_change.on_data_change(notification)
            });
        let registration = self.notifier.subscribe_to_data_changes(data_change_handler);
        *active.registration.lock() = Some(registration);

        debug!(id, "live query subscribed");
        active.update();

        LiveSubscription {
            id,
            control: active,
        }
    }
}

/// State of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Receiving updates.
    Active,
    /// Unsubscribed. Terminal.
    Cancelled,
}

/// Handle to an active subscription.
///
/// Dropping the handle does not unsubscribe. Clones control the same
/// subscription.
#[derive(Clone)]
#[must_use = "the subscription keeps delivering until `unsubscribe` is called"]
pub struct LiveSubscription {
    id: SubscriptionId,
    control: Arc<dyn SubscriptionControl>,
}

impl LiveSubscription {
    /// Returns the subscription ID.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stops all further deliveries, including those of evaluations
    /// already in flight. A delivery already running on another thread
    /// completes; `unsubscribe` does not wait for it.
    ///
    /// Idempotent, and safe to call from inside any handler.
    pub fn unsubscribe(&self) {
        self.control.cancel();
    }

    /// Returns true once unsubscribed.
    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Returns the subscription state.
    pub fn status(&self) -> SubscriptionStatus {
        if self.is_cancelled() {
            SubscriptionStatus::Cancelled
        } else {
            SubscriptionStatus::Active
        }
    }

    /// Returns the dependency set, once known.
    pub fn relevant_tablenames(&self) -> Option<Vec<QualifiedTablename>> {
        self.control.relevant_tablenames()
    }
}

impl std::fmt::Debug for LiveSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSubscription")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

trait SubscriptionControl: Send + Sync {
    fn cancel(&self);
    fn is_cancelled(&self) -> bool;
    fn relevant_tablenames(&self) -> Option<Vec<QualifiedTablename>>;
}

struct ActiveSubscription<T> {
    id: SubscriptionId,
    notifier: Weak<dyn Notifier>,
    query: LiveQueryFn<T>,
    handler: LiveResultHandler<T>,
    cancelled: AtomicBool,
    /// Set at most once.
    relevant_tablenames: Mutex<Option<Vec<QualifiedTablename>>>,
    /// Serializes deliveries. Never taken by `cancel`.
    delivery: Mutex<()>,
    registration: Mutex<Option<NotifierSubscription>>,
}

impl<T: Send + 'static> ActiveSubscription<T> {
    /// Evaluates the query in a new task and delivers the outcome.
    fn update(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let started = panic::catch_unwind(AssertUnwindSafe(|| (this.query)()));
            let outcome = match started {
                Ok(evaluation) => AssertUnwindSafe(evaluation)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(SubscriptionQueryError::from_panic(payload))),
                Err(payload) => Err(SubscriptionQueryError::from_panic(payload)),
            };
            this.deliver(outcome);
        });
    }

    fn deliver(&self, outcome: SubscriptionResult<LiveResult<T>>) {
        let _delivery = self.delivery.lock();
        if self.cancelled.load(Ordering::Acquire) {
            debug!(id = self.id, "dropping result of cancelled live query");
            return;
        }
        if let Ok(live) = &outcome {
            let mut relevant = self.relevant_tablenames.lock();
            if relevant.is_none() {
                trace!(id = self.id, tables = ?live.tablenames, "dependency set fixed");
                *relevant = Some(live.tablenames.clone());
            }
        }

        let updated_at = SystemTime::now();
        let update = match outcome {
            Ok(live) => LiveResultUpdate::Results {
                results: live.result,
                updated_at,
            },
            Err(error) => {
                debug!(id = self.id, %error, "live query failed");
                LiveResultUpdate::Error { error, updated_at }
            }
        };

        if panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(update))).is_err() {
            warn!(id = self.id, "live query handler panicked");
        }
    }

    fn on_data_change(self: &Arc<Self>, notification: &ChangeNotification) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        let Some(relevant) = self.relevant_tablenames.lock().clone() else {
            trace!(id = self.id, "change before dependency set is known");
            return;
        };
        let Some(notifier) = self.notifier.upgrade() else {
            return;
        };

        let changed = notifier.alias(notification);
        if has_intersection(&relevant, &changed) {
            trace!(id = self.id, ?changed, "re-evaluating live query");
            self.update();
        }
    }
}

impl<T: Send + 'static> SubscriptionControl for ActiveSubscription<T> {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let registration = self.registration.lock().take();
        if let Some(registration) = registration {
            registration.unsubscribe();
        }
        debug!(id = self.id, "live query unsubscribed");
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn relevant_tablenames(&self) -> Option<Vec<QualifiedTablename>> {
        self.relevant_tablenames.lock().clone()
    }
}
