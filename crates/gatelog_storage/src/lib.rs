//! # gatelog storage
//!
//! Local record store for gatelog.
//!
//! The store is the single source of truth for checkpoint records on a
//! device. It holds records keyed by id plus a small app-state side table
//! (for example the sync watermark), and notifies subscribers after every
//! successful write.
//!
//! ## Available Stores
//!
//! - [`InMemoryRecordStore`] - For testing and ephemeral sessions
//! - [`FileRecordStore`] - Durable, checksummed snapshots in a locked directory

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod file;
mod memory;
mod snapshot;
mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use file::FileRecordStore;
pub use memory::InMemoryRecordStore;
pub use store::{RecordStore, StoreRevision};
