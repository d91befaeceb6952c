//! Deadline-bounded bulk migration ("import job").
//!
//! Each invocation computes one absolute deadline, then sweeps every entity
//! type that has a migrate-on-write hook, one type at a time. A type's sweep
//! repeatedly fetches a batch of unmigrated records, migrates and saves the
//! whole batch concurrently, and continues while batches come back full.
//!
//! There is no cursor: progress lives entirely in each record's status
//! field, so the next invocation resumes wherever this one stopped. The
//! deadline is checked before each batch only; a batch that has started
//! always runs to completion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument, trace, warn};

use trickle_core::defaults::{
    BATCH_SIZE, ENV_BATCH_SIZE, ENV_MAX_DURATION_MS, MAX_SWEEP_DURATION_MS,
};
use trickle_core::state::SWEEP_STATUS;
use trickle_core::{EntityType, Error, ObjectStore, Record, RecordQuery, Result, StatusSink};

use crate::handler::{RecordHook, TriggerRegistry};

/// Configuration for the sweep job.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Records fetched and migrated per batch.
    pub batch_size: usize,
    /// Wall-clock budget of one job invocation.
    pub max_duration: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            max_duration: Duration::from_millis(MAX_SWEEP_DURATION_MS),
        }
    }
}

impl SweepConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TRICKLE_BATCH_SIZE` | `1000` | Records per sweep batch |
    /// | `TRICKLE_MAX_DURATION_MS` | `870000` | Time budget per job run |
    ///
    /// Unparseable or zero values fall back to the defaults.
    pub fn from_env() -> Self {
        let batch_size = std::env::var(ENV_BATCH_SIZE)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(BATCH_SIZE);

        let max_duration_ms = std::env::var(ENV_MAX_DURATION_MS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(MAX_SWEEP_DURATION_MS);

        Self {
            batch_size,
            max_duration: Duration::from_millis(max_duration_ms),
        }
    }

    /// Set the batch size (clamped to at least 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }
}

/// Outcome of sweeping one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSweep {
    pub entity_type: EntityType,
    /// Records migrated in this invocation.
    pub migrated: u64,
    /// Batches fetched (including a final short or empty one).
    pub batches: u32,
    /// Stopped because the deadline passed, not because the type ran dry.
    pub deadline_reached: bool,
}

/// Outcome of one sweep job invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub per_type: Vec<TypeSweep>,
    /// Registered types without a migrate-on-write hook.
    pub skipped: Vec<EntityType>,
    pub total: u64,
    pub deadline_reached: bool,
    pub duration_ms: u64,
}

impl SweepReport {
    /// Human-readable summary for the status sink.
    ///
    /// Zero migrations means a full pass found nothing left to do.
    pub fn summary(&self) -> String {
        if self.total == 0 {
            "Initial import complete: 0 records migrated, no unmigrated records remain".to_string()
        } else {
            format!(
                "Migrated {} records in this pass; more may remain",
                self.total
            )
        }
    }
}

/// Drives bulk migration of historical records.
pub struct Sweeper {
    registry: Arc<TriggerRegistry>,
    store: Arc<dyn ObjectStore>,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new(
        registry: Arc<TriggerRegistry>,
        store: Arc<dyn ObjectStore>,
        config: SweepConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run one invocation with a deadline of now + `max_duration`.
    pub async fn run(&self) -> Result<SweepReport> {
        let budget = chrono::Duration::from_std(self.config.max_duration)
            .map_err(|e| Error::Config(format!("sweep duration out of range: {e}")))?;
        let deadline = Utc::now().checked_add_signed(budget).ok_or_else(|| {
            Error::Config(format!(
                "sweep duration of {}ms overflows the deadline",
                self.config.max_duration.as_millis()
            ))
        })?;
        self.run_until(deadline).await
    }

    /// Run one invocation against an explicit deadline.
    ///
    /// Entity types are swept sequentially in name order. The first failure
    /// aborts the whole invocation.
    #[instrument(skip(self))]
    pub async fn run_until(&self, deadline: DateTime<Utc>) -> Result<SweepReport> {
        let start = Instant::now();
        let mut per_type = Vec::new();
        let mut skipped = Vec::new();

        for (entity_type, handlers) in self.registry.iter() {
            let Some(migrate) = handlers.migrate_on_write.clone() else {
                info!(%entity_type, "Nothing to import, no migrate-on-write hook");
                skipped.push(entity_type.clone());
                continue;
            };
            let sweep = self.sweep_type(entity_type, migrate, deadline).await?;
            info!(
                %entity_type,
                migrated = sweep.migrated,
                batches = sweep.batches,
                deadline_reached = sweep.deadline_reached,
                "Entity type swept"
            );
            per_type.push(sweep);
        }

        let total = per_type.iter().map(|s| s.migrated).sum();
        let deadline_reached = per_type.iter().any(|s| s.deadline_reached);
        Ok(SweepReport {
            per_type,
            skipped,
            total,
            deadline_reached,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Run one invocation and report the outcome to `sink`.
    pub async fn run_job(&self, sink: &dyn StatusSink) -> Result<SweepReport> {
        info!(batch_size = self.config.batch_size, "Import job started");
        match self.run().await {
            Ok(report) => {
                info!(
                    total_migrated = report.total,
                    deadline_reached = report.deadline_reached,
                    duration_ms = report.duration_ms,
                    "Import job finished"
                );
                sink.success(&report.summary());
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Import job failed");
                sink.error(&format!("Import failed: {e}"));
                Err(e)
            }
        }
    }

    /// Sweep one entity type until it runs dry or the deadline passes.
    #[instrument(skip_all, fields(entity_type = %entity_type))]
    async fn sweep_type(
        &self,
        entity_type: &EntityType,
        migrate: Arc<dyn RecordHook>,
        deadline: DateTime<Utc>,
    ) -> Result<TypeSweep> {
        let batch_size = self.config.batch_size;
        let mut sweep = TypeSweep {
            entity_type: entity_type.clone(),
            migrated: 0,
            batches: 0,
            deadline_reached: false,
        };

        loop {
            if Utc::now() > deadline {
                warn!(migrated = sweep.migrated, "Deadline reached, resuming next run");
                sweep.deadline_reached = true;
                return Ok(sweep);
            }

            let query = RecordQuery::unmigrated(entity_type.clone(), batch_size);
            let batch = self.store.find(&query).await?;
            let fetched = batch.len();
            sweep.batches += 1;

            // Every record finishes before the first error is surfaced.
            let results = join_all(
                batch
                    .into_iter()
                    .map(|record| self.migrate_record(migrate.as_ref(), record)),
            )
            .await;
            let migrated = results.into_iter().collect::<Result<Vec<_>>>()?;
            sweep.migrated += migrated.len() as u64;

            debug!(batch_size = fetched, migrated = sweep.migrated, "Batch migrated");

            if fetched < batch_size {
                return Ok(sweep);
            }
        }
    }

    async fn migrate_record(&self, migrate: &dyn RecordHook, mut record: Record) -> Result<Record> {
        migrate.call(record.clone()).await?;
        record.set_migration_status(SWEEP_STATUS);
        let saved = self.store.save(record).await?;
        trace!(record_id = ?saved.id(), "Record migrated by sweep");
        Ok(saved)
    }
}
