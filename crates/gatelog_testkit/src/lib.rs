//! # gatelog testkit
//!
//! Test utilities for gatelog.
//!
//! This crate provides:
//! - Record fixtures and temporary file stores
//! - An in-memory remote authority usable directly as a gateway or behind
//!   the HTTP loopback client
//! - A store wrapper that fails writes on demand
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gatelog_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn pushes_pending_entries() {
//!     let authority = Arc::new(InMemoryAuthority::new());
//!     let store = Arc::new(InMemoryRecordStore::with_records(vec![personnel("Asha")]));
//!     let engine = ReconciliationEngine::new(SyncConfig::default(), authority.clone(), store);
//!     assert!(engine.run(RunRequest::manual()).await.is_completed());
//!     assert_eq!(authority.len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod authority;
pub mod faulty;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::authority::*;
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use authority::*;
pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
