//! # livequery live
//!
//! Live query subscription engine for livequery.
//!
//! A live query is an async function returning its result together with
//! the tables it read. Subscribing to it delivers the current result right
//! away and a fresh one whenever the [`Notifier`](livequery_core::Notifier)
//! reports a write to one of those tables.
//!
//! ## Key Invariants
//!
//! - Every subscription gets an initial delivery (unless cancelled first)
//! - Only changes intersecting the dependency set trigger re-evaluation
//! - Query failures are delivered as updates; the subscription stays active
//! - Nothing is delivered after `unsubscribe`, not even in-flight results

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod model;
mod subscription;

pub use error::{SubscriptionQueryError, SubscriptionResult};
pub use model::{LiveResult, LiveResultUpdate};
pub use subscription::{
    create_query_result_subscribe_function, LiveResultHandler, LiveResultSubscribeFunction,
    LiveSubscription, SubscriptionId, SubscriptionStatus,
};
