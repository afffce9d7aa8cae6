//! # gatelog sync engine
//!
//! Offline-first reconciliation between a local record store and a remote
//! authority.
//!
//! This crate provides:
//! - The reconciliation state machine (push → acknowledge → pull → merge →
//!   advance watermark)
//! - Pending-set tracking derived from the store
//! - A scheduler for manual, reconnect and periodic runs with backoff
//! - A gateway abstraction with an HTTP implementation
//!
//! ## Architecture
//!
//! The engine implements a **push-then-pull** model:
//! 1. Push every pending record
//! 2. Clear `pending` on records the authority confirmed
//! 3. Pull everything changed since the watermark
//! 4. Merge, with the server winning every conflict
//! 5. Advance the watermark
//!
//! ## Key Invariants
//!
//! - Server is authoritative
//! - A record leaves the pending set only on explicit confirmation
//! - At most one run at a time
//! - The watermark never moves backwards
//! - Every partial run is safe to repeat

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod http;
mod merge;
mod pending;
mod scheduler;
mod state;
mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RetryConfig, SyncConfig};
pub use error::{FailureKind, SyncError, SyncResult};
pub use http::{
    HttpClient, HttpGateway, HttpMethod, HttpRequest, HttpResponse, LoopbackClient,
    LoopbackServer,
};
pub use merge::{merge_pulled, MergePlan};
pub use pending::{pending, PendingSet, PendingTracker};
pub use scheduler::SyncScheduler;
pub use state::{
    EngineState, ReconciliationEngine, RunRequest, SkipReason, SyncOutcome, SyncStats, Trigger,
};
pub use transport::{MockGateway, SyncGateway};
