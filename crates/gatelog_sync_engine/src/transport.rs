//! Gateway abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use gatelog_sync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// The remote authority's sync endpoints.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process authority, mock for testing).
///
/// Implementations classify their own failures: unreachable or timed-out
/// requests are retryable [`SyncError::Transport`] / [`SyncError::Timeout`],
/// refused credentials are [`SyncError::AuthenticationFailed`], and bodies
/// that cannot be decoded are [`SyncError::Protocol`].
#[async_trait]
pub trait SyncGateway: Send + Sync {
    /// Submits records to the authority.
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Fetches records changed since the request's watermark.
    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Returns false when the gateway knows it cannot reach the authority.
    fn is_connected(&self) -> bool {
        true
    }
}

/// A scripted gateway for testing.
#[derive(Debug)]
pub struct MockGateway {
    connected: AtomicBool,
    push_response: Mutex<Option<PushResponse>>,
    pull_response: Mutex<Option<PullResponse>>,
    push_failure: Mutex<Option<String>>,
    pull_failure: Mutex<Option<String>>,
    pushes: Mutex<Vec<PushRequest>>,
    pulls: Mutex<Vec<PullRequest>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    /// Creates a new mock gateway.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            push_response: Mutex::new(None),
            pull_response: Mutex::new(None),
            push_failure: Mutex::new(None),
            pull_failure: Mutex::new(None),
            pushes: Mutex::new(Vec::new()),
            pulls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the push response.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Sets the pull response.
    pub fn set_pull_response(&self, response: PullResponse) {
        *self.pull_response.lock() = Some(response);
    }

    /// Makes every push fail with a retryable transport error.
    pub fn fail_push(&self, message: impl Into<String>) {
        *self.push_failure.lock() = Some(message.into());
    }

    /// Makes every pull fail with a retryable transport error.
    pub fn fail_pull(&self, message: impl Into<String>) {
        *self.pull_failure.lock() = Some(message.into());
    }

    /// Clears scripted failures.
    pub fn heal(&self) {
        *self.push_failure.lock() = None;
        *self.pull_failure.lock() = None;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every push request received so far.
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    /// Returns every pull request received so far.
    pub fn pulls(&self) -> Vec<PullRequest> {
        self.pulls.lock().clone()
    }
}

#[async_trait]
impl SyncGateway for MockGateway {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.pushes.lock().push(request.clone());
        if let Some(message) = self.push_failure.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }
        self.push_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::ServerError("no mock push response set".into()))
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.pulls.lock().push(*request);
        if let Some(message) = self.pull_failure.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }
        Ok(self
            .pull_response
            .lock()
            .clone()
            .unwrap_or_else(PullResponse::empty))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
