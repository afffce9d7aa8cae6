//! A record store that fails on demand.

use async_trait::async_trait;
use gatelog_core::{Record, RecordId};
use gatelog_storage::{RecordStore, StoreError, StoreResult, StoreRevision};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Wraps a store and makes selected operations fail.
///
/// Failing writes leave the inner store untouched, so the all-or-nothing
/// guarantee of `put_many` holds.
pub struct FaultyStore<S: RecordStore> {
    inner: Arc<S>,
    fail_record_writes: AtomicBool,
    fail_app_state_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl<S: RecordStore> FaultyStore<S> {
    /// Wraps `inner` with every operation working.
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            fail_record_writes: AtomicBool::new(false),
            fail_app_state_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Makes `put_one`, `put_many` and `acknowledge` fail.
    pub fn fail_record_writes(&self, fail: bool) {
        self.fail_record_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `set_app_state` fail.
    pub fn fail_app_state_writes(&self, fail: bool) {
        self.fail_app_state_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::other(format!("injected {what} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for FaultyStore<S> {
    async fn get_all(&self) -> StoreResult<Vec<Record>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.get_all().await
    }

    async fn get(&self, id: RecordId) -> StoreResult<Option<Record>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.get(id).await
    }

    async fn put_one(&self, record: Record) -> StoreResult<()> {
        Self::check(&self.fail_record_writes, "write")?;
        self.inner.put_one(record).await
    }

    async fn put_many(&self, records: Vec<Record>) -> StoreResult<()> {
        Self::check(&self.fail_record_writes, "write")?;
        self.inner.put_many(records).await
    }

    async fn acknowledge(&self, sent: Vec<Record>) -> StoreResult<Vec<RecordId>> {
        Self::check(&self.fail_record_writes, "write")?;
        self.inner.acknowledge(sent).await
    }

    async fn get_app_state(&self, key: &str) -> StoreResult<Option<String>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.get_app_state(key).await
    }

    async fn set_app_state(&self, key: &str, value: String) -> StoreResult<()> {
        Self::check(&self.fail_app_state_writes, "app state write")?;
        self.inner.set_app_state(key, value).await
    }

    fn subscribe(&self) -> watch::Receiver<StoreRevision> {
        self.inner.subscribe()
    }
}
