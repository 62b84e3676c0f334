//! # livequery testkit
//!
//! Test utilities for livequery.
//!
//! This crate provides:
//! - A callback-style mock connection and a recording notifier
//! - A keyword-based table-name extractor for tests
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use livequery_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn writes_notify() {
//!     let (conn, notifier, adapter) = init_testable("test.db");
//!     adapter.run(&"update bars set i = 1".into()).await.unwrap();
//!     // ... assert on notifier.notifications()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod extractor;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::extractor::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use extractor::*;
pub use fixtures::*;
pub use generators::*;
