//! Reconciliation engine state machine.

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{FailureKind, SyncError, SyncResult};
use crate::merge::merge_pulled;
use crate::pending::pending;
use crate::transport::SyncGateway;
use chrono::{DateTime, Utc};
use gatelog_core::{Record, RecordId, Watermark, WATERMARK_KEY};
use gatelog_storage::RecordStore;
use gatelog_sync_protocol::{PullRequest, PushRequest};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The current state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No run in progress.
    Idle,
    /// A run is in progress.
    Running,
}

impl EngineState {
    /// Returns true if a run is in progress.
    pub fn is_running(&self) -> bool {
        matches!(self, EngineState::Running)
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The user asked for a sync.
    Manual,
    /// Connectivity came back.
    Reconnect,
    /// The periodic timer fired.
    Periodic,
}

impl Trigger {
    /// Forced runs pull even when nothing is pending.
    pub fn is_forced(self) -> bool {
        !matches!(self, Trigger::Periodic)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Manual => "manual",
            Trigger::Reconnect => "reconnect",
            Trigger::Periodic => "periodic",
        };
        f.write_str(name)
    }
}

/// A request to run one reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    /// What started the run.
    pub trigger: Trigger,
    /// Restricts the push phase to this record.
    pub record: Option<RecordId>,
}

impl RunRequest {
    /// A manual run over the whole pending set.
    pub fn manual() -> Self {
        Self {
            trigger: Trigger::Manual,
            record: None,
        }
    }

    /// A manual run that pushes only `id`.
    pub fn manual_record(id: RecordId) -> Self {
        Self {
            trigger: Trigger::Manual,
            record: Some(id),
        }
    }

    /// A run fired by regained connectivity.
    pub fn reconnect() -> Self {
        Self {
            trigger: Trigger::Reconnect,
            record: None,
        }
    }

    /// A run fired by the periodic timer.
    pub fn periodic() -> Self {
        Self {
            trigger: Trigger::Periodic,
            record: None,
        }
    }
}

/// Why a run did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run was in progress.
    AlreadyRunning,
    /// The device is offline or the gateway is unreachable.
    Offline,
    /// A non-forced run found nothing to push.
    NothingPending,
}

/// Result of one `run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The run did nothing. Never published as the last outcome.
    Skipped(SkipReason),
    /// Every pushed record was accepted and the pull was merged.
    Success {
        /// Records the authority accepted.
        accepted: usize,
        /// Records received in the pull.
        pulled: usize,
    },
    /// Some pushed records stay pending; the pull was merged.
    PartialSuccess {
        /// Records the authority accepted.
        accepted: usize,
        /// Records that stay pending.
        rejected: usize,
        /// Ids of the records that stay pending.
        rejected_ids: Vec<RecordId>,
        /// Records received in the pull.
        pulled: usize,
    },
    /// The run stopped early.
    Failed {
        /// Failure class.
        kind: FailureKind,
        /// Human-readable reason.
        message: String,
        /// Records already acknowledged before the failure.
        accepted: usize,
        /// Whether retrying later may help.
        retryable: bool,
    },
}

impl SyncOutcome {
    /// Returns true for a skipped run.
    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped(_))
    }

    /// Returns true if the run reached the end of the cycle.
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Success { .. } | SyncOutcome::PartialSuccess { .. }
        )
    }

    /// Returns the failure class of a failed run.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            SyncOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true if the run failed in a way that may clear up on its own.
    pub fn is_retryable_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed { retryable: true, .. })
    }

    /// Builds the outcome for an error.
    pub fn failed(error: &SyncError, accepted: usize) -> Self {
        SyncOutcome::Failed {
            kind: error.failure_kind(),
            message: error.to_string(),
            accepted,
            retryable: error.is_retryable(),
        }
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that reached the end of the cycle.
    pub cycles_completed: u64,
    /// Runs that failed.
    pub cycles_failed: u64,
    /// Records accepted by the authority.
    pub records_accepted: u64,
    /// Records rejected or left unconfirmed by the authority.
    pub records_rejected: u64,
    /// Records received in pulls.
    pub records_pulled: u64,
    /// End of the last completed run.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Marks the engine running until dropped.
struct RunGuard<'a> {
    state: &'a watch::Sender<EngineState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(EngineState::Idle);
    }
}

/// An error plus how far the run got.
struct RunFailure {
    error: SyncError,
    accepted: usize,
}

impl RunFailure {
    fn after<E: Into<SyncError>>(accepted: usize) -> impl FnOnce(E) -> Self {
        move |e| Self {
            error: e.into(),
            accepted,
        }
    }
}

/// Reconciles the local store with the remote authority.
///
/// One run pushes the pending set, applies the per-record push outcome,
/// pulls everything changed since the watermark, merges it with the server
/// winning every conflict, and advances the watermark. At most one run is in
/// progress at a time; a concurrent call returns
/// [`SkipReason::AlreadyRunning`] without touching anything.
///
/// A pushed record left pending holds the watermark back unless the pull
/// returned the server's copy of it. A record the authority rejects on every
/// push and never stores therefore pins the watermark, and every run re-pulls
/// the same window until the record is fixed or the authority accepts it.
///
/// Each phase commits before the next begins. A failure leaves earlier
/// commits in place and everything later untouched, so every partial run is
/// safe to repeat.
pub struct ReconciliationEngine<G: SyncGateway, S: RecordStore> {
    config: SyncConfig,
    gateway: Arc<G>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<EngineState>,
    outcome: watch::Sender<Option<SyncOutcome>>,
    online: watch::Sender<bool>,
    authenticated: watch::Sender<bool>,
    stats: RwLock<SyncStats>,
}

impl<G: SyncGateway, S: RecordStore> ReconciliationEngine<G, S> {
    /// Creates a new engine.
    ///
    /// The engine starts idle, online and authenticated.
    pub fn new(config: SyncConfig, gateway: Arc<G>, store: Arc<S>) -> Self {
        Self {
            config,
            gateway,
            store,
            clock: Arc::new(SystemClock),
            state: watch::channel(EngineState::Idle).0,
            outcome: watch::channel(None).0,
            online: watch::channel(true).0,
            authenticated: watch::channel(true).0,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the gateway.
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Gets the current state.
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Outcome of the last run that was not skipped.
    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.outcome.borrow().clone()
    }

    /// Subscribes to published outcomes.
    pub fn subscribe_outcome(&self) -> watch::Receiver<Option<SyncOutcome>> {
        self.outcome.subscribe()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Reports device connectivity.
    pub fn set_online(&self, online: bool) {
        self.online.send_replace(online);
    }

    /// Returns the last reported connectivity.
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Subscribes to connectivity changes.
    pub fn subscribe_online(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Reports whether the gateway holds valid credentials.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.send_replace(authenticated);
    }

    /// Returns the last reported authentication state.
    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    /// Subscribes to authentication changes.
    pub fn subscribe_authenticated(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    /// Reads the stored watermark.
    ///
    /// An unreadable value is treated as absent, which means the next pull
    /// asks for the full history.
    pub async fn watermark(&self) -> SyncResult<Option<Watermark>> {
        let raw = self.store.get_app_state(WATERMARK_KEY).await?;
        Ok(raw.and_then(|value| {
            let decoded = Watermark::decode(&value);
            if decoded.is_none() {
                warn!(%value, "ignoring unreadable watermark");
            }
            decoded
        }))
    }

    fn begin(&self) -> Option<RunGuard<'_>> {
        let started = self.state.send_if_modified(|state| {
            if state.is_running() {
                false
            } else {
                *state = EngineState::Running;
                true
            }
        });
        started.then(|| RunGuard { state: &self.state })
    }

    /// Runs one reconciliation cycle.
    pub async fn run(&self, request: RunRequest) -> SyncOutcome {
        let Some(_guard) = self.begin() else {
            debug!(trigger = %request.trigger, "sync already running");
            return SyncOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        let start = Instant::now();
        let outcome = match self.reconcile(request).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                if matches!(failure.error, SyncError::AuthenticationFailed(_)) {
                    self.set_authenticated(false);
                }
                SyncOutcome::failed(&failure.error, failure.accepted)
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            SyncOutcome::Skipped(reason) => {
                debug!(trigger = %request.trigger, ?reason, "sync skipped");
                return outcome;
            }
            SyncOutcome::Success { accepted, pulled } => {
                info!(trigger = %request.trigger, accepted, pulled, elapsed_ms, "sync completed");
            }
            SyncOutcome::PartialSuccess {
                accepted,
                rejected,
                pulled,
                ..
            } => {
                warn!(
                    trigger = %request.trigger,
                    accepted,
                    rejected,
                    pulled,
                    elapsed_ms,
                    "sync completed with records left pending"
                );
            }
            SyncOutcome::Failed {
                kind,
                message,
                accepted,
                ..
            } => {
                warn!(trigger = %request.trigger, %kind, accepted, elapsed_ms, error = %message, "sync failed");
            }
        }

        self.record(&outcome);
        self.outcome.send_replace(Some(outcome.clone()));
        outcome
    }

    /// Pushes `id` alone, then pulls.
    pub async fn sync_record(&self, id: RecordId) -> SyncOutcome {
        self.run(RunRequest::manual_record(id)).await
    }

    fn record(&self, outcome: &SyncOutcome) {
        let mut stats = self.stats.write();
        match outcome {
            SyncOutcome::Skipped(_) => {}
            SyncOutcome::Success { accepted, pulled } => {
                stats.cycles_completed += 1;
                stats.records_accepted += *accepted as u64;
                stats.records_pulled += *pulled as u64;
                stats.last_sync_time = Some(self.clock.now());
                stats.last_error = None;
            }
            SyncOutcome::PartialSuccess {
                accepted,
                rejected,
                pulled,
                ..
            } => {
                stats.cycles_completed += 1;
                stats.records_accepted += *accepted as u64;
                stats.records_rejected += *rejected as u64;
                stats.records_pulled += *pulled as u64;
                stats.last_sync_time = Some(self.clock.now());
                stats.last_error = None;
            }
            SyncOutcome::Failed {
                message, accepted, ..
            } => {
                stats.cycles_failed += 1;
                stats.records_accepted += *accepted as u64;
                stats.last_error = Some(message.clone());
            }
        }
    }

    async fn reconcile(&self, request: RunRequest) -> Result<SyncOutcome, RunFailure> {
        if !self.is_online() || !self.gateway.is_connected() {
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }

        let records = self.store.get_all().await.map_err(RunFailure::after(0))?;
        let mut batch = pending(&records);
        if let Some(id) = request.record {
            batch.retain(|r| r.id() == id);
        }
        if batch.is_empty() && !request.trigger.is_forced() {
            return Ok(SyncOutcome::Skipped(SkipReason::NothingPending));
        }
        info!(trigger = %request.trigger, pending = batch.len(), "sync started");

        // Push
        let mut accepted = 0;
        let mut held_back = Vec::new();
        if !batch.is_empty() {
            let push = PushRequest::new(batch);
            let response = self
                .gateway
                .push(&push)
                .await
                .map_err(RunFailure::after(0))?;
            let resolution = response.resolve(&push.ids());
            if !resolution.consistent {
                warn!(
                    submitted = push.entries.len(),
                    reported_accepted = response.accepted,
                    reported_rejected = response.rejected,
                    "push response does not match submission"
                );
            }
            accepted = resolution.accepted.len();
            let acked = self
                .acknowledge(&push.entries, &resolution.accepted)
                .await
                .map_err(RunFailure::after(0))?;
            debug!(accepted, acked, "push outcome applied");
            held_back = resolution.still_pending();
        }

        // Pull
        let since = self.watermark().await.map_err(RunFailure::after(accepted))?;
        let issued_at = self.clock.now();
        let response = self
            .gateway
            .pull(&PullRequest::new(since.map(Watermark::at)))
            .await
            .map_err(RunFailure::after(accepted))?;
        response.validate().map_err(RunFailure::after(accepted))?;
        let pulled = response.entries.len();
        let as_of = response.as_of;
        let pulled_ids: HashSet<RecordId> = response.entries.iter().map(Record::id).collect();

        // Merge, then advance the watermark. A crash in between only means
        // the same records are pulled again.
        let local = self.store.get_all().await.map_err(RunFailure::after(accepted))?;
        let plan = merge_pulled(&local, response.entries);
        debug!(
            inserted = plan.inserted,
            overwritten = plan.overwritten,
            unchanged = plan.unchanged,
            "merging pulled records"
        );
        if !plan.is_noop() {
            self.store
                .put_many(plan.writes)
                .await
                .map_err(RunFailure::after(accepted))?;
        }

        // Records left pending hold the watermark back, so the next run
        // pulls the same window again. A pulled server copy resolves them.
        let unresolved = held_back
            .iter()
            .filter(|id| !pulled_ids.contains(id))
            .count();
        let candidate = as_of.map_or(issued_at, |as_of| as_of.min(issued_at));
        let next = Watermark::advance(since, candidate);
        if unresolved > 0 {
            debug!(pending = unresolved, "watermark held back");
        } else if since != Some(next) {
            self.store
                .set_app_state(WATERMARK_KEY, next.encode())
                .await
                .map_err(RunFailure::after(accepted))?;
            debug!(watermark = %next, "watermark advanced");
        }

        Ok(if held_back.is_empty() {
            SyncOutcome::Success { accepted, pulled }
        } else {
            SyncOutcome::PartialSuccess {
                accepted,
                rejected: held_back.len(),
                rejected_ids: held_back,
                pulled,
            }
        })
    }

    /// Clears `pending` on accepted records that still hold the pushed content.
    ///
    /// The store compares and flips in one write, so a record edited while
    /// the push was in flight keeps its newer content and stays pending.
    /// Returns the number of records flipped.
    async fn acknowledge(&self, pushed: &[Record], accepted: &[RecordId]) -> SyncResult<usize> {
        if accepted.is_empty() {
            return Ok(0);
        }
        let accepted: HashSet<RecordId> = accepted.iter().copied().collect();
        let sent: Vec<Record> = pushed
            .iter()
            .filter(|r| accepted.contains(&r.id()))
            .cloned()
            .collect();
        let expected = sent.len();

        let flipped = self.store.acknowledge(sent).await?.len();
        if flipped < expected {
            debug!(
                skipped = expected - flipped,
                "records changed during push stay pending"
            );
        }
        Ok(flipped)
    }
}
