//! Traits for the external capabilities the migration engine orchestrates.
//!
//! The engine never stores, queries, or schedules anything itself. It talks to
//! an [`ObjectStore`] for CRUD and queries, installs callbacks on an
//! [`EventHost`], and reports job outcomes to a [`StatusSink`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::Result;
use crate::models::{EntityType, Record, RecordQuery};

// =============================================================================
// OBJECT STORE
// =============================================================================

/// CRUD + query capability of the remote object store.
///
/// Saves and deletes are expected to run whatever callbacks the host has
/// registered for the record's entity type.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Run a query and return matching records in store-default order.
    async fn find(&self, query: &RecordQuery) -> Result<Vec<Record>>;

    /// Persist a record and return it as stored.
    ///
    /// Updates write only the record's dirty fields; fields changed by other
    /// writers since the record was read are kept.
    async fn save(&self, record: Record) -> Result<Record>;

    /// Delete a persisted record.
    async fn delete(&self, record: Record) -> Result<()>;
}

// =============================================================================
// EVENT HOST
// =============================================================================

/// Runs before a write is persisted. `Ok` carries the record to persist,
/// `Err` aborts the write.
pub type BeforeWriteCallback = Arc<dyn Fn(Record) -> BoxFuture<'static, Result<Record>> + Send + Sync>;

/// Runs after a write is persisted. There is no caller left to report to.
pub type AfterWriteCallback = Arc<dyn Fn(Record) -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs before a delete. `Err` aborts the delete.
pub type BeforeDeleteCallback = Arc<dyn Fn(Record) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Runs after a delete.
pub type AfterDeleteCallback = Arc<dyn Fn(Record) -> BoxFuture<'static, ()> + Send + Sync>;

/// Background job body. Outcomes are reported through the sink.
pub type JobCallback = Arc<dyn Fn(Arc<dyn StatusSink>) -> BoxFuture<'static, ()> + Send + Sync>;

/// The host's "register callback for event E on type T" capability.
///
/// Registration happens once at startup, before the host serves events.
pub trait EventHost: Send + Sync {
    fn register_before_write(
        &self,
        entity_type: &EntityType,
        callback: BeforeWriteCallback,
    ) -> Result<()>;

    fn register_after_write(
        &self,
        entity_type: &EntityType,
        callback: AfterWriteCallback,
    ) -> Result<()>;

    fn register_before_delete(
        &self,
        entity_type: &EntityType,
        callback: BeforeDeleteCallback,
    ) -> Result<()>;

    fn register_after_delete(
        &self,
        entity_type: &EntityType,
        callback: AfterDeleteCallback,
    ) -> Result<()>;

    fn register_job(&self, name: &str, callback: JobCallback) -> Result<()>;
}

// =============================================================================
// STATUS SINK
// =============================================================================

/// Where a background job reports its final outcome.
pub trait StatusSink: Send + Sync {
    fn success(&self, message: &str);

    fn error(&self, message: &str);
}
