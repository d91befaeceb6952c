//! Per-record migration state machine.
//!
//! Pure decision logic, no I/O:
//!
//! ```text
//!   (absent) ──first save, migrate hook──▶ NEEDS_SECOND_PASS
//!      │                                        │
//!      │ write on persisted record              │ second save
//!      ▼                                        ▼
//!  IS_MIGRATED                         FINISHED_SECOND_PASS
//! ```
//!
//! `IS_MIGRATED` and `FINISHED_SECOND_PASS` are terminal for writes. The sweep
//! only selects records with no status (or an unrecognized one).

use crate::models::{MigrationStatus, Record};

/// What the pre-write pass does with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreWriteAction {
    /// No migrate hook, or already terminal: persist unchanged.
    Unchanged,
    /// Never persisted: let the creating save finish first.
    DeferUntilPersisted,
    /// Set this status and run the migrate hook before persisting.
    Migrate(MigrationStatus),
}

/// Decide the pre-write treatment of `record`.
pub fn pre_write_action(record: &Record, has_migrate_hook: bool) -> PreWriteAction {
    if !has_migrate_hook {
        return PreWriteAction::Unchanged;
    }
    match record.migration_status() {
        Some(status) if status.is_terminal() => PreWriteAction::Unchanged,
        _ if record.is_new() => PreWriteAction::DeferUntilPersisted,
        status => PreWriteAction::Migrate(next_status(status)),
    }
}

/// Status a record moves to when migrated during a write.
pub fn next_status(current: Option<MigrationStatus>) -> MigrationStatus {
    match current {
        Some(MigrationStatus::NeedsSecondPass) => MigrationStatus::FinishedSecondPass,
        _ => MigrationStatus::IsMigrated,
    }
}

/// Whether the user before-write hook runs for this write.
///
/// Bookkeeping writes (only the status field changed) skip it, so the engine's
/// own status saves do not re-enter user logic.
pub fn runs_before_write_hook(record: &Record) -> bool {
    !record.is_bookkeeping_write()
}

/// Status to set after a persist, if a second pass is required.
///
/// Only the save that created the record triggers a second pass.
pub fn post_write_status(record: &Record, has_migrate_hook: bool) -> Option<MigrationStatus> {
    if has_migrate_hook && !record.existed() {
        Some(MigrationStatus::NeedsSecondPass)
    } else {
        None
    }
}

/// Status the sweep writes after migrating a record.
pub const SWEEP_STATUS: MigrationStatus = MigrationStatus::IsMigrated;
