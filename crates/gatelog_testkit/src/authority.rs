//! An in-memory remote authority.
//!
//! Behaves like the real sync service: pushes upsert records and stamp them
//! with a server modification time, pulls return everything modified at or
//! after `since`. Failure modes can be switched on per test.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatelog_core::{Record, RecordId};
use gatelog_sync_engine::{
    Clock, HttpMethod, HttpRequest, HttpResponse, LoopbackServer, SyncError, SyncGateway,
    SyncResult, SystemClock,
};
use gatelog_sync_protocol::{
    PullRequest, PullResponse, PushRequest, PushResponse, WireMessage, PULL_PATH, PUSH_PATH,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Stored {
    record: Record,
    modified_at: DateTime<Utc>,
}

/// A scriptable stand-in for the remote sync service.
pub struct InMemoryAuthority {
    clock: Arc<dyn Clock>,
    records: RwLock<BTreeMap<RecordId, Stored>>,
    rejected: RwLock<HashSet<RecordId>>,
    token: RwLock<Option<String>>,
    unreachable: AtomicBool,
    report_as_of: AtomicBool,
    push_delay: RwLock<Option<Duration>>,
    push_calls: AtomicUsize,
    pull_calls: AtomicUsize,
}

impl Default for InMemoryAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthority {
    /// Creates an empty authority on the system clock.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            records: RwLock::new(BTreeMap::new()),
            rejected: RwLock::new(HashSet::new()),
            token: RwLock::new(None),
            unreachable: AtomicBool::new(false),
            report_as_of: AtomicBool::new(true),
            push_delay: RwLock::new(None),
            push_calls: AtomicUsize::new(0),
            pull_calls: AtomicUsize::new(0),
        }
    }

    /// Replaces the clock used to stamp modifications.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Stores `record` as if another device had pushed it.
    pub fn insert_remote(&self, record: Record) {
        let stored = Stored {
            record: record.into_synced(),
            modified_at: self.clock.now(),
        };
        self.records.write().insert(stored.record.id(), stored);
    }

    /// Rejects every future push of `id`.
    pub fn reject(&self, id: RecordId) {
        self.rejected.write().insert(id);
    }

    /// Stops rejecting `id`.
    pub fn accept(&self, id: RecordId) {
        self.rejected.write().remove(&id);
    }

    /// Requires `token` as bearer on loopback requests.
    pub fn require_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Makes every call fail as if the network were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Controls whether pull responses carry `asOf`.
    pub fn set_report_as_of(&self, report: bool) {
        self.report_as_of.store(report, Ordering::SeqCst);
    }

    /// Delays every push by `delay`.
    pub fn set_push_delay(&self, delay: Option<Duration>) {
        *self.push_delay.write() = delay;
    }

    /// Returns the stored record with `id`.
    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.records.read().get(&id).map(|s| s.record.clone())
    }

    /// Returns every stored record.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .read()
            .values()
            .map(|s| s.record.clone())
            .collect()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of push calls received.
    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    /// Number of pull calls received.
    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    /// Applies a push and builds the response.
    pub fn handle_push(&self, request: PushRequest) -> PushResponse {
        let now = self.clock.now();
        let rejected_set = self.rejected.read().clone();
        let mut records = self.records.write();
        let mut rejected = Vec::new();
        let mut accepted = 0u32;
        for record in request.entries {
            if rejected_set.contains(&record.id()) {
                rejected.push(record.id());
                continue;
            }
            records.insert(
                record.id(),
                Stored {
                    record: record.into_synced(),
                    modified_at: now,
                },
            );
            accepted += 1;
        }

        if rejected.is_empty() {
            PushResponse::accepted(accepted)
        } else {
            PushResponse::with_rejections(accepted, &rejected).with_message("validation failed")
        }
    }

    /// Answers a pull with every record modified at or after `since`.
    pub fn handle_pull(&self, request: PullRequest) -> PullResponse {
        let now = self.clock.now();
        let entries: Vec<Record> = self
            .records
            .read()
            .values()
            .filter(|s| request.since.map_or(true, |since| s.modified_at >= since))
            .map(|s| s.record.clone())
            .collect();
        let response = PullResponse::new(entries);
        if self.report_as_of.load(Ordering::SeqCst) {
            response.with_as_of(now)
        } else {
            response
        }
    }

    fn check_reachable(&self) -> SyncResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(SyncError::transport_retryable("authority unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SyncGateway for InMemoryAuthority {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.push_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable()?;
        Ok(self.handle_push(request.clone()))
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self.handle_pull(*request))
    }
}

impl LoopbackServer for InMemoryAuthority {
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        if self.unreachable.load(Ordering::SeqCst) {
            return HttpResponse::status(503, "service unavailable");
        }
        if let Some(required) = self.token.read().as_deref() {
            if request.bearer.as_deref() != Some(required) {
                return HttpResponse::status(401, "invalid token");
            }
        }

        let path = request.path();
        let (route, query) = path.split_once('?').unwrap_or((path, ""));
        let body = match (request.method, route) {
            (HttpMethod::Post, PUSH_PATH) => {
                self.push_calls.fetch_add(1, Ordering::SeqCst);
                match PushRequest::decode(&request.body) {
                    Ok(push) => self.handle_push(push).encode(),
                    Err(e) => return HttpResponse::status(400, e.to_string()),
                }
            }
            (HttpMethod::Get, PULL_PATH) => {
                self.pull_calls.fetch_add(1, Ordering::SeqCst);
                match PullRequest::from_query(query) {
                    Ok(pull) => self.handle_pull(pull).encode(),
                    Err(e) => return HttpResponse::status(400, e.to_string()),
                }
            }
            _ => return HttpResponse::status(404, "not found"),
        };

        match body {
            Ok(body) => HttpResponse::ok(body),
            Err(e) => HttpResponse::status(500, e.to_string()),
        }
    }
}
