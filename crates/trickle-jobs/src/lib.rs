//! # trickle-jobs
//!
//! Incremental record migration for hosted object stores.
//!
//! This crate provides:
//! - A per-entity-type registry of user hooks (before/after write and delete,
//!   migrate-on-write, migrate-on-delete)
//! - Composed write/delete callbacks that migrate records transparently
//!   during normal traffic
//! - A deadline-bounded, batched sweep job that migrates historical records
//!   and resumes on the next invocation
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use trickle_jobs::memory::{MemoryStore, RecordingSink, StatusReport};
//! use trickle_jobs::{export_triggers, Record, Result, SweepConfig, TriggerRegistry};
//!
//! async fn copy_to_new_schema(record: &Record) -> Result<()> {
//!     // Write the record's data in its new shape somewhere else.
//!     assert!(record.id().is_some());
//!     Ok(())
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let store = MemoryStore::new();
//! store.seed(Record::new("Widget").with_field("sku", "W-1"))?;
//!
//! let registry = TriggerRegistry::new()
//!     .on_migrate_write("Widget", |record: Record| async move {
//!         copy_to_new_schema(&record).await
//!     })?;
//!
//! // Fails fast on duplicate hooks; nothing is installed in that case.
//! export_triggers(registry, &store, Arc::new(store.clone()), SweepConfig::from_env())?;
//!
//! // Writes now migrate records; the "import" job migrates the rest.
//! let sink = RecordingSink::new();
//! store.run_job("import", Arc::new(sink.clone())).await?;
//! assert_eq!(
//!     sink.last(),
//!     Some(StatusReport::Success(
//!         "Migrated 1 records in this pass; more may remain".to_string()
//!     ))
//! );
//! # Ok(())
//! # }
//! ```

pub mod composer;
pub mod export;
pub mod handler;
pub mod sweep;

// Re-export core types
pub use trickle_core::*;

// Re-export engine types
pub use composer::TriggerComposer;
pub use export::{export_triggers, import_job};
pub use handler::{BeforeWriteHook, HandlerSet, Hook, RecordHook, TriggerRegistry};
pub use sweep::{SweepConfig, SweepReport, Sweeper, TypeSweep};
