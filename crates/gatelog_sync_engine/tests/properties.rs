//! Property tests for merge and run-level guarantees.

use chrono::{DateTime, Utc};
use gatelog_core::{Record, RecordId, Watermark};
use gatelog_storage::{InMemoryRecordStore, RecordStore};
use gatelog_sync_engine::{
    merge_pulled, pending, ManualClock, MockGateway, ReconciliationEngine, RunRequest, SyncConfig,
};
use gatelog_sync_protocol::PullResponse;
use gatelog_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn apply(local: &[Record], writes: &[Record]) -> BTreeMap<RecordId, Record> {
    let mut state: BTreeMap<RecordId, Record> = local.iter().map(|r| (r.id(), r.clone())).collect();
    for record in writes {
        state.insert(record.id(), record.clone());
    }
    state
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn far_future() -> DateTime<Utc> {
    at_minute(60 * 24 * 365)
}

proptest! {
    #[test]
    fn merging_twice_equals_merging_once((local, pulled) in overlapping_sets_strategy()) {
        let once = apply(&local, &merge_pulled(&local, pulled.clone()).writes);
        let once_vec: Vec<Record> = once.values().cloned().collect();

        let second = merge_pulled(&once_vec, pulled);
        prop_assert!(second.is_noop());
        prop_assert_eq!(apply(&once_vec, &second.writes), once);
    }

    #[test]
    fn server_wins_for_every_pulled_id((local, pulled) in overlapping_sets_strategy()) {
        let merged = apply(&local, &merge_pulled(&local, pulled.clone()).writes);

        let mut last: BTreeMap<RecordId, Record> = BTreeMap::new();
        for record in pulled {
            last.insert(record.id(), record);
        }
        for (id, server) in &last {
            let stored = &merged[id];
            prop_assert!(!stored.pending());
            prop_assert_eq!(stored, &server.clone().into_synced());
        }
        for record in &local {
            if !last.contains_key(&record.id()) {
                prop_assert_eq!(&merged[&record.id()], record);
            }
        }
    }

    #[test]
    fn transport_failure_loses_nothing(
        local in prop::collection::vec(local_record_strategy(), 0..10),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = Arc::new(InMemoryRecordStore::with_records(local.clone()));
            let gateway = Arc::new(MockGateway::new());
            gateway.fail_push("connection reset");
            gateway.fail_pull("connection reset");
            let engine = ReconciliationEngine::new(
                SyncConfig::default(),
                gateway,
                Arc::clone(&store),
            );

            let before = pending(&store.get_all().await.unwrap());
            let outcome = engine.run(RunRequest::manual()).await;
            let after = pending(&store.get_all().await.unwrap());

            prop_assert!(outcome.is_retryable_failure());
            prop_assert_eq!(before, after);
            prop_assert_eq!(engine.watermark().await.unwrap(), None);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn watermark_never_moves_backwards(
        coverage in prop::collection::vec(instant_strategy(), 1..8),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = Arc::new(InMemoryRecordStore::new());
            let gateway = Arc::new(MockGateway::new());
            let engine = ReconciliationEngine::new(
                SyncConfig::default(),
                Arc::clone(&gateway),
                store,
            )
            .with_clock(Arc::new(ManualClock::new(far_future())));

            let mut previous: Option<Watermark> = None;
            for as_of in coverage {
                gateway.set_pull_response(PullResponse::empty().with_as_of(as_of));
                prop_assert!(engine.run(RunRequest::manual()).await.is_completed());
                let current = engine.watermark().await.unwrap();
                prop_assert!(current >= previous);
                prop_assert!(current.is_some());
                previous = current;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
