//! In-process object store and event host.
//!
//! [`MemoryStore`] implements both [`ObjectStore`] and [`EventHost`] the way a
//! hosted object store does: a save runs the registered pre-write callback,
//! persists, then runs the post-write callback; a delete does the same with
//! the delete callbacks. It backs the integration tests and the demo runner.
//!
//! ## Usage
//!
//! ```rust
//! use trickle_core::memory::MemoryStore;
//! use trickle_core::{ObjectStore, Record, RecordQuery};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> trickle_core::Result<()> {
//! let store = MemoryStore::new();
//! let legacy = store.seed(Record::new("Widget").with_field("name", "sprocket"))?;
//!
//! let pending = store.find(&RecordQuery::unmigrated("Widget".into(), 10)).await?;
//! assert_eq!(pending.len(), 1);
//! assert_eq!(pending[0].id(), legacy.id());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{EntityType, Record, RecordQuery};
use crate::traits::{
    AfterDeleteCallback, AfterWriteCallback, BeforeDeleteCallback, BeforeWriteCallback,
    EventHost, JobCallback, ObjectStore, StatusSink,
};

#[derive(Default)]
struct Triggers {
    before_write: HashMap<EntityType, BeforeWriteCallback>,
    after_write: HashMap<EntityType, AfterWriteCallback>,
    before_delete: HashMap<EntityType, BeforeDeleteCallback>,
    after_delete: HashMap<EntityType, AfterDeleteCallback>,
    jobs: HashMap<String, JobCallback>,
}

impl Triggers {
    fn len(&self) -> usize {
        self.before_write.len()
            + self.after_write.len()
            + self.before_delete.len()
            + self.after_delete.len()
    }
}

#[derive(Default)]
struct Counters {
    queries: AtomicUsize,
    saves: AtomicUsize,
    deletes: AtomicUsize,
}

/// In-memory object store with trigger dispatch.
///
/// Records of each entity type are kept in insertion order, which is the
/// store-default order of [`ObjectStore::find`]. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<EntityType, Vec<Record>>>>,
    triggers: Arc<RwLock<Triggers>>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a record without running any callbacks.
    ///
    /// Models data written before the migration engine was deployed.
    pub fn seed(&self, mut record: Record) -> Result<Record> {
        let id = record.id().unwrap_or_else(Uuid::now_v7);
        record.mark_persisted(id, true);
        let mut records = self.records()?;
        records
            .entry(record.entity_type().clone())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    /// Read a record without side effects.
    pub fn get(&self, entity_type: &EntityType, id: Uuid) -> Result<Option<Record>> {
        let records = self.records()?;
        Ok(records
            .get(entity_type)
            .and_then(|rows| rows.iter().find(|r| r.id() == Some(id)))
            .cloned())
    }

    /// All records of an entity type, in store order.
    pub fn all(&self, entity_type: &EntityType) -> Result<Vec<Record>> {
        let records = self.records()?;
        Ok(records.get(entity_type).cloned().unwrap_or_default())
    }

    /// Invoke a registered job.
    pub async fn run_job(&self, name: &str, sink: Arc<dyn StatusSink>) -> Result<()> {
        let job = {
            let triggers = self.triggers()?;
            triggers.jobs.get(name).cloned()
        };
        let job = job.ok_or_else(|| Error::NotFound(format!("job {name}")))?;
        job(sink).await;
        Ok(())
    }

    /// Number of write/delete callbacks installed.
    pub fn callback_count(&self) -> usize {
        self.triggers.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn has_job(&self, name: &str) -> bool {
        self.triggers
            .read()
            .map(|t| t.jobs.contains_key(name))
            .unwrap_or(false)
    }

    pub fn query_count(&self) -> usize {
        self.counters.queries.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.counters.saves.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.counters.deletes.load(Ordering::SeqCst)
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<EntityType, Vec<Record>>>> {
        self.records
            .lock()
            .map_err(|_| Error::Internal("memory store records lock poisoned".into()))
    }

    fn triggers(&self) -> Result<std::sync::RwLockReadGuard<'_, Triggers>> {
        self.triggers
            .read()
            .map_err(|_| Error::Internal("memory store trigger table poisoned".into()))
    }

    fn register<F>(&self, event: &str, entity_type: &EntityType, insert: F) -> Result<()>
    where
        F: FnOnce(&mut Triggers) -> bool,
    {
        let mut triggers = self
            .triggers
            .write()
            .map_err(|_| Error::Internal("memory store trigger table poisoned".into()))?;
        if !insert(&mut triggers) {
            return Err(Error::TriggerRegistration(format!(
                "{event} callback already registered for {entity_type}"
            )));
        }
        debug!(%entity_type, event, "Registered store callback");
        Ok(())
    }

    /// Insert a new record, or merge an update's dirty fields into the stored
    /// row. Returns the row as stored.
    fn persist(&self, mut record: Record) -> Result<Record> {
        let mut records = self.records()?;
        let rows = records.entry(record.entity_type().clone()).or_default();
        let stored = match record.id() {
            None => {
                record.mark_persisted(Uuid::now_v7(), false);
                rows.push(record.clone());
                record
            }
            Some(id) => {
                let slot = rows
                    .iter_mut()
                    .find(|r| r.id() == Some(id))
                    .ok_or_else(|| Error::NotFound(format!("{}/{id}", record.entity_type())))?;
                slot.apply_changes(&record);
                slot.mark_persisted(id, true);
                slot.clone()
            }
        };
        trace!(entity_type = %stored.entity_type(), record_id = ?stored.id(), "Persisted record");
        Ok(stored)
    }
}

fn insert_once<V>(map: &mut HashMap<EntityType, V>, entity_type: &EntityType, value: V) -> bool {
    if map.contains_key(entity_type) {
        return false;
    }
    map.insert(entity_type.clone(), value);
    true
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn find(&self, query: &RecordQuery) -> Result<Vec<Record>> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        let records = self.records()?;
        Ok(records
            .get(&query.entity_type)
            .map(|rows| {
                rows.iter()
                    .filter(|r| query.matches(r))
                    .take(query.limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save(&self, record: Record) -> Result<Record> {
        self.counters.saves.fetch_add(1, Ordering::SeqCst);
        let entity_type = record.entity_type().clone();
        let (before, after) = {
            let triggers = self.triggers()?;
            (
                triggers.before_write.get(&entity_type).cloned(),
                triggers.after_write.get(&entity_type).cloned(),
            )
        };

        let record = match before {
            Some(callback) => callback(record).await?,
            None => record,
        };
        let saved = self.persist(record)?;
        if let Some(callback) = after {
            callback(saved.clone()).await;
        }
        Ok(saved)
    }

    async fn delete(&self, record: Record) -> Result<()> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        let entity_type = record.entity_type().clone();
        let id = record
            .id()
            .ok_or_else(|| Error::store(format!("cannot delete unsaved {entity_type} record")))?;
        let (before, after) = {
            let triggers = self.triggers()?;
            (
                triggers.before_delete.get(&entity_type).cloned(),
                triggers.after_delete.get(&entity_type).cloned(),
            )
        };

        if let Some(callback) = before {
            callback(record.clone()).await?;
        }
        {
            let mut records = self.records()?;
            let rows = records.entry(entity_type.clone()).or_default();
            let index = rows
                .iter()
                .position(|r| r.id() == Some(id))
                .ok_or_else(|| Error::NotFound(format!("{entity_type}/{id}")))?;
            rows.remove(index);
        }
        if let Some(callback) = after {
            callback(record).await;
        }
        Ok(())
    }
}

impl EventHost for MemoryStore {
    fn register_before_write(
        &self,
        entity_type: &EntityType,
        callback: BeforeWriteCallback,
    ) -> Result<()> {
        self.register("before-write", entity_type, |t| {
            insert_once(&mut t.before_write, entity_type, callback)
        })
    }

    fn register_after_write(
        &self,
        entity_type: &EntityType,
        callback: AfterWriteCallback,
    ) -> Result<()> {
        self.register("after-write", entity_type, |t| {
            insert_once(&mut t.after_write, entity_type, callback)
        })
    }

    fn register_before_delete(
        &self,
        entity_type: &EntityType,
        callback: BeforeDeleteCallback,
    ) -> Result<()> {
        self.register("before-delete", entity_type, |t| {
            insert_once(&mut t.before_delete, entity_type, callback)
        })
    }

    fn register_after_delete(
        &self,
        entity_type: &EntityType,
        callback: AfterDeleteCallback,
    ) -> Result<()> {
        self.register("after-delete", entity_type, |t| {
            insert_once(&mut t.after_delete, entity_type, callback)
        })
    }

    fn register_job(&self, name: &str, callback: JobCallback) -> Result<()> {
        let mut triggers = self
            .triggers
            .write()
            .map_err(|_| Error::Internal("memory store trigger table poisoned".into()))?;
        if triggers.jobs.contains_key(name) {
            return Err(Error::TriggerRegistration(format!(
                "job {name} already registered"
            )));
        }
        triggers.jobs.insert(name.to_string(), callback);
        debug!(job = name, "Registered job");
        Ok(())
    }
}

// =============================================================================
// RECORDING SINK
// =============================================================================

/// A status report captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    Success(String),
    Error(String),
}

/// Status sink that keeps every report for later inspection.
#[derive(Clone, Default)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<StatusReport>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<StatusReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<StatusReport> {
        self.reports().pop()
    }

    fn push(&self, report: StatusReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
    }
}

impl StatusSink for RecordingSink {
    fn success(&self, message: &str) {
        self.push(StatusReport::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(StatusReport::Error(message.to_string()));
    }
}
