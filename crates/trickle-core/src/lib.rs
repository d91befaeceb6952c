//! # trickle-core
//!
//! Core types, traits, and abstractions for trickle, an incremental record
//! migration engine for hosted object stores.
//!
//! This crate provides the data model (records, entity types, the persisted
//! migration status), the pure per-record state machine, and the traits for
//! the external capabilities the engine drives: the object store, the event
//! host that runs write/delete callbacks and jobs, and the job status sink.
//!
//! ## Structured logging
//!
//! All crates log with `tracing` and share one field vocabulary:
//! `entity_type`, `record_id`, `hook`, `batch_size`, `migrated`,
//! `total_migrated`, `duration_ms`, `deadline_reached`, `error`.

pub mod defaults;
pub mod error;
pub mod memory;
pub mod models;
pub mod state;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use state::PreWriteAction;
pub use traits::*;
