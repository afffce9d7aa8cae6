//! Background triggering of reconciliation runs.

use crate::error::SyncError;
use crate::pending::{PendingSet, PendingTracker};
use crate::state::{ReconciliationEngine, RunRequest, SyncOutcome};
use crate::transport::SyncGateway;
use gatelog_core::RecordId;
use gatelog_storage::RecordStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info};

/// Drives an engine from manual, reconnect and periodic triggers.
///
/// The periodic timer is armed only while the device is online, the gateway
/// is authenticated and something is pending. After a retryable failure the
/// next tick is brought forward following the configured backoff.
///
/// Every run executes in its own task. Dropping the scheduler stops future
/// triggers but never cuts a run short.
pub struct SyncScheduler<G: SyncGateway + 'static, S: RecordStore + 'static> {
    engine: Arc<ReconciliationEngine<G, S>>,
    tracker: Arc<PendingTracker>,
    armed: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl<G: SyncGateway + 'static, S: RecordStore + 'static> SyncScheduler<G, S> {
    /// Starts scheduling runs of `engine`.
    pub fn spawn(engine: Arc<ReconciliationEngine<G, S>>, tracker: Arc<PendingTracker>) -> Self {
        let (armed_tx, armed) = watch::channel(false);
        let task = tokio::spawn(drive(Arc::clone(&engine), tracker.subscribe(), armed_tx));
        Self {
            engine,
            tracker,
            armed,
            task,
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<ReconciliationEngine<G, S>> {
        &self.engine
    }

    /// Returns the current pending set.
    pub fn pending(&self) -> PendingSet {
        self.tracker.current()
    }

    /// Runs a manual sync, optionally restricted to one record.
    ///
    /// Returns [`SyncOutcome::Skipped`] if a run is already in progress.
    pub async fn run_sync(&self, record: Option<RecordId>) -> SyncOutcome {
        let request = match record {
            Some(id) => RunRequest::manual_record(id),
            None => RunRequest::manual(),
        };
        run_detached(&self.engine, request).await
    }

    /// Reports device connectivity. Going from offline to online fires a
    /// reconnect run.
    pub fn set_online(&self, online: bool) {
        self.engine.set_online(online);
    }

    /// Reports whether the gateway holds valid credentials.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.engine.set_authenticated(authenticated);
    }

    /// Returns true while the periodic timer is armed.
    pub fn is_armed(&self) -> bool {
        *self.armed.borrow()
    }

    /// Subscribes to timer arming changes.
    pub fn subscribe_armed(&self) -> watch::Receiver<bool> {
        self.armed.clone()
    }

    /// Stops scheduling. A run in progress completes on its own.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl<G: SyncGateway + 'static, S: RecordStore + 'static> Drop for SyncScheduler<G, S> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_detached<G, S>(
    engine: &Arc<ReconciliationEngine<G, S>>,
    request: RunRequest,
) -> SyncOutcome
where
    G: SyncGateway + 'static,
    S: RecordStore + 'static,
{
    let engine = Arc::clone(engine);
    match tokio::spawn(async move { engine.run(request).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(trigger = %request.trigger, error = %e, "sync task died");
            SyncOutcome::failed(&SyncError::Internal(e.to_string()), 0)
        }
    }
}

async fn drive<G, S>(
    engine: Arc<ReconciliationEngine<G, S>>,
    mut pending: watch::Receiver<PendingSet>,
    armed_tx: watch::Sender<bool>,
) where
    G: SyncGateway + 'static,
    S: RecordStore + 'static,
{
    let mut online = engine.subscribe_online();
    let mut authenticated = engine.subscribe_authenticated();
    let interval = engine.config().sync_interval;
    let retry = engine.config().retry.clone();

    let mut was_online = *online.borrow_and_update();
    let mut failures = 0u32;
    let mut next_tick: Option<Instant> = None;

    loop {
        let armed = *online.borrow() && *authenticated.borrow() && !pending.borrow().is_empty();
        if !armed {
            next_tick = None;
            failures = 0;
        } else if next_tick.is_none() {
            next_tick = Some(Instant::now() + interval);
        }
        armed_tx.send_if_modified(|current| {
            let changed = *current != armed;
            *current = armed;
            changed
        });
        let deadline = next_tick.unwrap_or_else(Instant::now);

        let outcome = tokio::select! {
            () = time::sleep_until(deadline), if next_tick.is_some() => {
                next_tick = None;
                run_detached(&engine, RunRequest::periodic()).await
            }
            changed = pending.changed() => {
                if changed.is_err() {
                    break;
                }
                pending.borrow_and_update();
                continue;
            }
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_online = *online.borrow_and_update();
                let reconnected = now_online && !was_online;
                was_online = now_online;
                if !reconnected {
                    continue;
                }
                info!("connectivity restored");
                run_detached(&engine, RunRequest::reconnect()).await
            }
            changed = authenticated.changed() => {
                if changed.is_err() {
                    break;
                }
                authenticated.borrow_and_update();
                continue;
            }
        };

        if outcome.is_retryable_failure() {
            failures += 1;
            if retry.allows_retry(failures) {
                let delay = retry.delay_for_attempt(failures);
                debug!(failures, delay_ms = delay.as_millis() as u64, "backing off");
                next_tick = Some(Instant::now() + delay);
            }
        } else if outcome.is_completed() {
            failures = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, SyncConfig};
    use crate::transport::MockGateway;
    use chrono::Utc;
    use gatelog_core::{EntryPayload, Record};
    use gatelog_storage::InMemoryRecordStore;
    use gatelog_sync_protocol::PushResponse;
    use std::time::Duration;

    type Scheduler = SyncScheduler<MockGateway, InMemoryRecordStore>;

    fn entry(name: &str) -> Record {
        Record::new("gate-1", "guard-7", EntryPayload::personnel(name), Utc::now()).unwrap()
    }

    async fn setup(records: Vec<Record>) -> (Scheduler, Arc<MockGateway>) {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_push_response(PushResponse::accepted(records.len() as u32));
        let store = Arc::new(InMemoryRecordStore::with_records(records));
        let config = SyncConfig::new().with_retry(
            RetryConfig::new(4)
                .with_initial_delay(Duration::from_secs(2))
                .with_jitter(false),
        );
        let engine = Arc::new(ReconciliationEngine::new(
            config,
            Arc::clone(&gateway),
            Arc::clone(&store),
        ));
        let tracker = Arc::new(PendingTracker::spawn(store).await.unwrap());
        (SyncScheduler::spawn(engine, tracker), gateway)
    }

    async fn settle() {
        time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_run_fires_when_pending() {
        let (scheduler, gateway) = setup(vec![entry("Asha")]).await;
        settle().await;
        assert!(scheduler.is_armed());

        time::sleep(Duration::from_secs(29)).await;
        assert!(gateway.pushes().is_empty());

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gateway.pushes().len(), 1);
        assert!(scheduler.pending().is_empty());
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_stays_disarmed_without_pending() {
        let (scheduler, gateway) = setup(Vec::new()).await;
        time::sleep(Duration::from_secs(300)).await;
        assert!(!scheduler.is_armed());
        assert!(gateway.pulls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_disarms_when_unauthenticated() {
        let (scheduler, gateway) = setup(vec![entry("Asha")]).await;
        scheduler.set_authenticated(false);
        time::sleep(Duration::from_secs(300)).await;
        assert!(!scheduler.is_armed());
        assert!(gateway.pushes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_fires_forced_run() {
        let (scheduler, gateway) = setup(Vec::new()).await;
        scheduler.set_online(false);
        settle().await;
        scheduler.set_online(true);
        settle().await;

        assert_eq!(gateway.pulls().len(), 1);
        assert!(scheduler.engine().last_outcome().unwrap().is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_back_off() {
        let (scheduler, gateway) = setup(vec![entry("Asha")]).await;
        gateway.fail_push("connection reset");

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(gateway.pushes().len(), 1);
        // 2s after the first failure
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gateway.pushes().len(), 2);
        // then 4s
        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(gateway.pushes().len(), 3);

        gateway.heal();
        time::sleep(Duration::from_secs(8)).await;
        assert_eq!(gateway.pushes().len(), 4);
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_sync_of_one_record() {
        let a = entry("Asha");
        let b = entry("Baraka");
        let (scheduler, gateway) = setup(vec![a, b.clone()]).await;
        gateway.set_push_response(PushResponse::accepted(1));

        let outcome = scheduler.run_sync(Some(b.id())).await;
        assert!(outcome.is_completed());
        assert_eq!(gateway.pushes()[0].ids(), vec![b.id()]);
        settle().await;
        assert_eq!(scheduler.pending().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_triggers() {
        let (scheduler, gateway) = setup(vec![entry("Asha")]).await;
        scheduler.shutdown();
        time::sleep(Duration::from_secs(300)).await;
        assert!(gateway.pushes().is_empty());
    }
}
