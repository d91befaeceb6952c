//! Centralized default constants for trickle.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and binaries should reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// PERSISTED STATE
// =============================================================================

/// Name of the per-record field holding the migration status.
///
/// Values are integers (see [`crate::MigrationStatus`]); an absent field means
/// the record has never been touched by the migration engine.
pub const MIGRATION_STATUS_FIELD: &str = "migrationStatus";

// =============================================================================
// SWEEP JOB
// =============================================================================

/// Number of records fetched, migrated and saved per sweep batch.
///
/// A full batch means more work may remain; a short batch means the entity
/// type is exhausted for the current pass.
pub const BATCH_SIZE: usize = 1000;

/// Maximum wall-clock duration of one sweep job invocation (14.5 minutes).
///
/// Kept under the 15 minute execution limit of the job host. Overrunning the
/// host limit kills the process mid-batch.
pub const MAX_SWEEP_DURATION_MS: u64 = 870_000;

/// Name under which the sweep job is registered with the event host.
pub const IMPORT_JOB_NAME: &str = "import";

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Environment variable overriding [`BATCH_SIZE`].
pub const ENV_BATCH_SIZE: &str = "TRICKLE_BATCH_SIZE";

/// Environment variable overriding [`MAX_SWEEP_DURATION_MS`].
pub const ENV_MAX_DURATION_MS: &str = "TRICKLE_MAX_DURATION_MS";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_duration_stays_under_host_limit() {
        let host_limit_ms = 15 * 60 * 1000;
        assert!(MAX_SWEEP_DURATION_MS < host_limit_ms);
        assert_eq!(MAX_SWEEP_DURATION_MS, 14 * 60 * 1000 + 30 * 1000);
    }

    #[test]
    fn test_batch_size_positive() {
        assert!(BATCH_SIZE > 0);
    }
}
