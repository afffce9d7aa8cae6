//! # gatelog core
//!
//! Record model for offline checkpoint logging.
//!
//! This crate provides:
//! - [`RecordId`], a client-generated 128-bit identifier
//! - [`Record`], the synchronizable unit, with its tagged [`EntryPayload`]
//! - [`Watermark`], the lower bound for incremental pulls
//!
//! Every invariant of the model is checked when a record is constructed,
//! including on deserialization, so an invalid record never reaches a store.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod payload;
mod record;
mod watermark;

pub use error::{CoreError, CoreResult};
pub use id::RecordId;
pub use payload::{EntryPayload, EntryType};
pub use record::{sort_for_display, Record, RecordParts, RecordStatus};
pub use watermark::{Watermark, WATERMARK_KEY};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
