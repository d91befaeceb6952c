//! Integration tests for the deadline-bounded import sweep.
//!
//! This test suite validates:
//! - Sweep-001: Batches run until a short batch, covering every record
//! - Sweep-002: A completed sweep reports the initial-import message next run
//! - Sweep-003: A passed deadline issues no queries
//! - Sweep-004: Failed records stay unmigrated and are picked up again
//! - Sweep-005: Opted-out and terminal records are never selected
//! - Sweep-006: The job registered on the host reports through its sink

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use trickle_jobs::memory::{MemoryStore, RecordingSink, StatusReport};
use trickle_jobs::{
    export_triggers, EntityType, Error, MigrationStatus, ObjectStore, Record, RecordQuery,
    SweepConfig, Sweeper, TriggerRegistry,
};

// ============================================================================
// HELPERS
// ============================================================================

fn seed_widgets(store: &MemoryStore, count: usize) {
    for i in 0..count {
        store
            .seed(Record::new("Widget").with_field("serial", i as u64))
            .expect("seed");
    }
}

fn counting_registry(calls: Arc<AtomicUsize>) -> TriggerRegistry {
    TriggerRegistry::new()
        .on_migrate_write("Widget", move |_record: Record| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), Error>(())
            }
        })
        .expect("register")
}

fn sweeper(store: &MemoryStore, registry: TriggerRegistry, batch_size: usize) -> Sweeper {
    Sweeper::new(
        Arc::new(registry),
        Arc::new(store.clone()),
        SweepConfig::default().with_batch_size(batch_size),
    )
}

fn widget() -> EntityType {
    EntityType::from("Widget")
}

fn statuses(store: &MemoryStore) -> Vec<Option<MigrationStatus>> {
    store
        .all(&widget())
        .unwrap()
        .iter()
        .map(|r| r.migration_status())
        .collect()
}

// ============================================================================
// BATCHING
// ============================================================================

#[tokio::test]
async fn test_sweep_migrates_all_records_in_batches() {
    let store = MemoryStore::new();
    seed_widgets(&store, 2500);
    let calls = Arc::new(AtomicUsize::new(0));
    let sweeper = sweeper(&store, counting_registry(calls.clone()), 1000);

    let report = sweeper.run().await.unwrap();

    assert_eq!(report.total, 2500);
    assert!(!report.deadline_reached);
    assert_eq!(report.per_type.len(), 1);
    assert_eq!(report.per_type[0].batches, 3);
    assert_eq!(store.query_count(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2500);
    assert!(statuses(&store)
        .iter()
        .all(|s| *s == Some(MigrationStatus::IsMigrated)));
    assert_eq!(
        report.summary(),
        "Migrated 2500 records in this pass; more may remain"
    );
}

#[tokio::test]
async fn test_second_run_reports_initial_import_complete() {
    let store = MemoryStore::new();
    seed_widgets(&store, 2500);
    let calls = Arc::new(AtomicUsize::new(0));
    let sweeper = sweeper(&store, counting_registry(calls.clone()), 1000);

    sweeper.run().await.unwrap();
    let queries_before = store.query_count();
    let report = sweeper.run().await.unwrap();

    assert_eq!(report.total, 0);
    assert_eq!(report.per_type[0].batches, 1);
    assert_eq!(store.query_count(), queries_before + 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2500);
    assert_eq!(
        report.summary(),
        "Initial import complete: 0 records migrated, no unmigrated records remain"
    );
}

#[tokio::test]
async fn test_exact_multiple_of_batch_size_ends_on_empty_batch() {
    let store = MemoryStore::new();
    seed_widgets(&store, 2000);
    let sweeper = sweeper(
        &store,
        counting_registry(Arc::new(AtomicUsize::new(0))),
        1000,
    );

    let report = sweeper.run().await.unwrap();

    assert_eq!(report.total, 2000);
    assert_eq!(report.per_type[0].batches, 3);
    assert_eq!(store.query_count(), 3);
}

#[tokio::test]
async fn test_multiple_types_swept_in_one_run() {
    let store = MemoryStore::new();
    seed_widgets(&store, 3);
    for _ in 0..2 {
        store.seed(Record::new("Gadget")).unwrap();
    }
    store.seed(Record::new("Audit")).unwrap();

    let registry = counting_registry(Arc::new(AtomicUsize::new(0)))
        .on_migrate_write("Gadget", |_record: Record| async { Ok::<(), Error>(()) })
        .unwrap()
        .on_after_write("Audit", |_record: Record| async { Ok::<(), Error>(()) })
        .unwrap();
    let report = sweeper(&store, registry, 10).run().await.unwrap();

    assert_eq!(report.total, 5);
    let per_type: Vec<_> = report
        .per_type
        .iter()
        .map(|s| (s.entity_type.as_str().to_string(), s.migrated))
        .collect();
    assert_eq!(
        per_type,
        vec![("Gadget".to_string(), 2), ("Widget".to_string(), 3)]
    );
    assert_eq!(report.skipped, vec![EntityType::from("Audit")]);
}

// ============================================================================
// DEADLINE
// ============================================================================

#[tokio::test]
async fn test_passed_deadline_issues_no_queries() {
    let store = MemoryStore::new();
    seed_widgets(&store, 10);
    let sweeper = sweeper(
        &store,
        counting_registry(Arc::new(AtomicUsize::new(0))),
        1000,
    );

    let report = sweeper
        .run_until(Utc::now() - chrono::Duration::minutes(1))
        .await
        .unwrap();

    assert_eq!(report.total, 0);
    assert!(report.deadline_reached);
    assert_eq!(store.query_count(), 0);
    assert!(statuses(&store).iter().all(Option::is_none));
}

#[tokio::test]
async fn test_deadline_stops_between_batches_and_next_run_resumes() {
    let store = MemoryStore::new();
    seed_widgets(&store, 10);
    let registry = TriggerRegistry::new()
        .on_migrate_write("Widget", |_record: Record| async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok::<(), Error>(())
        })
        .unwrap();
    let sweeper = sweeper(&store, registry, 1);

    let first = sweeper
        .run_until(Utc::now() + chrono::Duration::milliseconds(100))
        .await
        .unwrap();

    assert!(first.deadline_reached);
    assert!(first.total >= 1 && first.total < 10);

    let second = sweeper
        .run_until(Utc::now() + chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert!(!second.deadline_reached);
    assert_eq!(first.total + second.total, 10);
}

// ============================================================================
// FAILURES AND SELECTION
// ============================================================================

#[tokio::test]
async fn test_failed_record_stays_unmigrated_and_is_retried() {
    let store = MemoryStore::new();
    seed_widgets(&store, 4);
    let poisoned = store
        .seed(Record::new("Widget").with_field("poison", true))
        .unwrap();

    let healed = Arc::new(AtomicBool::new(false));
    let flag = healed.clone();
    let registry = TriggerRegistry::new()
        .on_migrate_write("Widget", move |record: Record| {
            let healed = flag.load(Ordering::SeqCst);
            async move {
                if record.get("poison").is_some() && !healed {
                    return Err(Error::handler("unreadable legacy payload"));
                }
                Ok(())
            }
        })
        .unwrap();
    let sweeper = sweeper(&store, registry, 10);

    let err = sweeper.run().await.unwrap_err();
    assert!(matches!(err, Error::Handler(_)));

    // The rest of the batch still completed.
    let remaining = store
        .find(&RecordQuery::unmigrated(widget(), 10))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id(), poisoned.id());

    healed.store(true, Ordering::SeqCst);
    let report = sweeper.run().await.unwrap();
    assert_eq!(report.total, 1);
    assert!(statuses(&store)
        .iter()
        .all(|s| *s == Some(MigrationStatus::IsMigrated)));
}

#[tokio::test]
async fn test_sweep_save_keeps_fields_written_after_fetch() {
    let store = MemoryStore::new();
    let legacy = store
        .seed(Record::new("Widget").with_field("name", "old"))
        .unwrap();

    // Another writer updates the record between the sweep's fetch and its save.
    let writer = store.clone();
    let registry = TriggerRegistry::new()
        .on_migrate_write("Widget", move |record: Record| {
            let writer = writer.clone();
            async move {
                let mut update = record.clone();
                update.set("name", "new");
                update.set_migration_status(MigrationStatus::IsMigrated);
                writer.save(update).await?;
                Ok::<(), Error>(())
            }
        })
        .unwrap();

    let report = sweeper(&store, registry, 10).run().await.unwrap();
    assert_eq!(report.total, 1);

    let stored = store.get(&widget(), legacy.id().unwrap()).unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&serde_json::json!("new")));
    assert_eq!(stored.migration_status(), Some(MigrationStatus::IsMigrated));
}

#[tokio::test]
async fn test_excluded_statuses_are_never_selected() {
    let store = MemoryStore::new();
    for status in [
        MigrationStatus::IsMigrated,
        MigrationStatus::FinishedSecondPass,
        MigrationStatus::NeedsSecondPass,
    ] {
        let mut record = Record::new("Widget");
        record.set_migration_status(status);
        store.seed(record).unwrap();
    }
    let calls = Arc::new(AtomicUsize::new(0));
    let sweeper = sweeper(&store, counting_registry(calls.clone()), 10);

    let report = sweeper.run().await.unwrap();

    assert_eq!(report.total, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        statuses(&store),
        vec![
            Some(MigrationStatus::IsMigrated),
            Some(MigrationStatus::FinishedSecondPass),
            Some(MigrationStatus::NeedsSecondPass),
        ]
    );
}

// ============================================================================
// HOSTED JOB
// ============================================================================

#[tokio::test]
async fn test_import_job_through_host_reports_to_sink() {
    let store = MemoryStore::new();
    seed_widgets(&store, 2500);
    let calls = Arc::new(AtomicUsize::new(0));
    export_triggers(
        counting_registry(calls.clone()),
        &store,
        Arc::new(store.clone()),
        SweepConfig::default().with_batch_size(1000),
    )
    .unwrap();

    let sink = RecordingSink::new();
    store.run_job("import", Arc::new(sink.clone())).await.unwrap();
    store.run_job("import", Arc::new(sink.clone())).await.unwrap();

    assert_eq!(
        sink.reports(),
        vec![
            StatusReport::Success(
                "Migrated 2500 records in this pass; more may remain".to_string()
            ),
            StatusReport::Success(
                "Initial import complete: 0 records migrated, no unmigrated records remain"
                    .to_string()
            ),
        ]
    );
    // Sweep saves are bookkeeping writes with a terminal status.
    assert_eq!(calls.load(Ordering::SeqCst), 2500);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let store = MemoryStore::new();
    let result = store
        .run_job("reindex", Arc::new(RecordingSink::new()))
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}
