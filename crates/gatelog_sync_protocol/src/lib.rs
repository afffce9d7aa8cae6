//! # gatelog sync protocol
//!
//! Wire messages exchanged with the remote sync gateway.
//!
//! This crate provides:
//! - [`PushRequest`] / [`PushResponse`] and per-record push resolution
//! - [`PullRequest`] / [`PullResponse`]
//! - JSON encoding through [`WireMessage`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    PullRequest, PullResponse, PushRequest, PushResolution, PushResponse, WireMessage, PULL_PATH,
    PUSH_PATH,
};
