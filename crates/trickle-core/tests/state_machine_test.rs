/// Walks records through the full migration lifecycle using only the pure
/// decision functions, the way the composed triggers apply them.
///
/// Covers:
/// - new record: deferred, then NEEDS_SECOND_PASS, then FINISHED_SECOND_PASS
/// - legacy record: migrated straight to IS_MIGRATED on its next write
/// - terminal statuses stay put for any number of writes
/// - unrecognized status codes count as unmigrated
use serde_json::{json, Map};
use trickle_core::defaults::MIGRATION_STATUS_FIELD;
use trickle_core::state::{self, PreWriteAction};
use trickle_core::{MigrationStatus, Record, RecordQuery};
use uuid::Uuid;

/// Apply one write the way the engine does and return the persisted record.
fn write(mut record: Record) -> (Record, bool) {
    let mut migrated = false;
    if let PreWriteAction::Migrate(status) = state::pre_write_action(&record, true) {
        record.set_migration_status(status);
        migrated = true;
    }
    let existed = !record.is_new();
    let id = record.id().unwrap_or_else(Uuid::now_v7);
    record.mark_persisted(id, existed);
    (record, migrated)
}

#[test]
fn test_new_record_lifecycle() {
    let draft = Record::new("Widget").with_field("name", "sprocket");
    assert_eq!(
        state::pre_write_action(&draft, true),
        PreWriteAction::DeferUntilPersisted
    );

    let (created, migrated) = write(draft);
    assert!(!migrated);
    assert_eq!(created.migration_status(), None);

    let second = state::post_write_status(&created, true)
        .expect("creating save requests a second pass");
    assert_eq!(second, MigrationStatus::NeedsSecondPass);

    let mut pending = created.clone();
    pending.set_migration_status(second);
    assert!(pending.is_bookkeeping_write());
    assert!(!state::runs_before_write_hook(&pending));

    let (finished, migrated) = write(pending);
    assert!(migrated);
    assert_eq!(
        finished.migration_status(),
        Some(MigrationStatus::FinishedSecondPass)
    );
    assert_eq!(state::post_write_status(&finished, true), None);
}

#[test]
fn test_legacy_record_migrates_on_next_write() {
    let mut legacy = Record::from_store("Widget".into(), Uuid::now_v7(), true, Map::new());
    legacy.set("name", "gear");
    assert!(state::runs_before_write_hook(&legacy));

    let (saved, migrated) = write(legacy);
    assert!(migrated);
    assert_eq!(saved.migration_status(), Some(MigrationStatus::IsMigrated));
    assert_eq!(state::post_write_status(&saved, true), None);
}

#[test]
fn test_terminal_statuses_never_change() {
    for terminal in [
        MigrationStatus::IsMigrated,
        MigrationStatus::FinishedSecondPass,
    ] {
        let mut record = Record::from_store("Widget".into(), Uuid::now_v7(), true, Map::new());
        record.set_migration_status(terminal);
        for revision in 0..5 {
            record.set("revision", revision);
            let (saved, migrated) = write(record);
            assert!(!migrated, "{terminal} re-migrated on write {revision}");
            assert_eq!(saved.migration_status(), Some(terminal));
            record = saved;
        }
    }
}

#[test]
fn test_unknown_status_code_is_unmigrated() {
    let mut fields = Map::new();
    fields.insert(MIGRATION_STATUS_FIELD.to_string(), json!(42));
    let record = Record::from_store("Widget".into(), Uuid::now_v7(), true, fields);

    assert_eq!(record.migration_status(), None);
    assert!(RecordQuery::unmigrated("Widget".into(), 10).matches(&record));
    assert_eq!(
        state::pre_write_action(&record, true),
        PreWriteAction::Migrate(MigrationStatus::IsMigrated)
    );
}

#[test]
fn test_no_migrate_hook_leaves_records_alone() {
    let draft = Record::new("Widget");
    assert_eq!(state::pre_write_action(&draft, false), PreWriteAction::Unchanged);

    let (created, _) = write(draft);
    assert_eq!(state::post_write_status(&created, false), None);
}
