//! Data model shared by the migration engine and store implementations.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::defaults::MIGRATION_STATUS_FIELD;

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// Canonical identifier of an entity type (a "class" in the object store).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    /// Identifier for a Rust type that declares its store name.
    pub fn of<T: Entity>() -> Self {
        Self(T::TYPE_NAME.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A Rust type mapped onto a store entity type.
///
/// Implementing this lets callers register hooks with a type descriptor
/// instead of a string literal.
pub trait Entity {
    /// Name of the entity type in the object store.
    const TYPE_NAME: &'static str;
}

// =============================================================================
// MIGRATION STATUS
// =============================================================================

/// Persisted migration status of a record.
///
/// Stored as an integer in [`MIGRATION_STATUS_FIELD`]. A record without the
/// field (or with an unrecognized value) has not been migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Migrated by a write or by the sweep.
    IsMigrated,
    /// Migrated during the forced second save of a new record.
    FinishedSecondPass,
    /// Created after migration began; a second save has been requested.
    NeedsSecondPass,
}

impl MigrationStatus {
    /// Statuses excluded from sweep selection.
    pub const SWEEP_EXCLUDED: [MigrationStatus; 3] = [
        MigrationStatus::IsMigrated,
        MigrationStatus::FinishedSecondPass,
        MigrationStatus::NeedsSecondPass,
    ];

    /// Integer stored in the status field.
    pub fn code(self) -> i64 {
        match self {
            MigrationStatus::IsMigrated => 1,
            MigrationStatus::FinishedSecondPass => 2,
            MigrationStatus::NeedsSecondPass => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(MigrationStatus::IsMigrated),
            2 => Some(MigrationStatus::FinishedSecondPass),
            3 => Some(MigrationStatus::NeedsSecondPass),
            _ => None,
        }
    }

    /// Parse a stored field value. Non-integer values are treated as absent.
    pub fn from_value(value: &JsonValue) -> Option<Self> {
        value.as_i64().and_then(Self::from_code)
    }

    /// Terminal statuses are never re-migrated by writes.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MigrationStatus::IsMigrated | MigrationStatus::FinishedSecondPass
        )
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationStatus::IsMigrated => "IS_MIGRATED",
            MigrationStatus::FinishedSecondPass => "FINISHED_SECOND_PASS",
            MigrationStatus::NeedsSecondPass => "NEEDS_SECOND_PASS",
        };
        f.write_str(name)
    }
}

// =============================================================================
// HOOK KINDS
// =============================================================================

/// The six user hook slots available per entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookKind {
    BeforeWrite,
    AfterWrite,
    BeforeDelete,
    AfterDelete,
    MigrateOnWrite,
    MigrateOnDelete,
}

impl HookKind {
    pub const ALL: [HookKind; 6] = [
        HookKind::BeforeWrite,
        HookKind::AfterWrite,
        HookKind::BeforeDelete,
        HookKind::AfterDelete,
        HookKind::MigrateOnWrite,
        HookKind::MigrateOnDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::BeforeWrite => "before-write",
            HookKind::AfterWrite => "after-write",
            HookKind::BeforeDelete => "before-delete",
            HookKind::AfterDelete => "after-delete",
            HookKind::MigrateOnWrite => "migrate-on-write",
            HookKind::MigrateOnDelete => "migrate-on-delete",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// A record as seen through the object store.
///
/// The store owns identity and every field; the migration engine only reads
/// and writes [`MIGRATION_STATUS_FIELD`] and hands records to user hooks.
/// Field writes are tracked in a dirty set that the store clears on persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity_type: EntityType,
    id: Option<Uuid>,
    existed: bool,
    fields: Map<String, JsonValue>,
    dirty: BTreeSet<String>,
}

impl Record {
    /// A new, never persisted record.
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: None,
            existed: false,
            fields: Map::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Set a field while building a record.
    pub fn with_field(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Rebuild a record exactly as the store holds it (no dirty fields).
    pub fn from_store(
        entity_type: EntityType,
        id: Uuid,
        existed: bool,
        fields: Map<String, JsonValue>,
    ) -> Self {
        Self {
            entity_type,
            id: Some(id),
            existed,
            fields,
            dirty: BTreeSet::new(),
        }
    }

    /// Mark the record as persisted under `id`.
    ///
    /// Called by store implementations after a successful save. `existed` is
    /// false only for the save that created the record.
    pub fn mark_persisted(&mut self, id: Uuid, existed: bool) {
        self.id = Some(id);
        self.existed = existed;
        self.dirty.clear();
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Store identifier, assigned on first successful persist.
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// True until the record has been persisted once.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Whether the last persist updated an existing record.
    ///
    /// False immediately after the creating save, true after any later save.
    pub fn existed(&self) -> bool {
        self.existed
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<JsonValue>) {
        self.fields.insert(name.to_string(), value.into());
        self.dirty.insert(name.to_string());
    }

    pub fn unset(&mut self, name: &str) {
        if self.fields.remove(name).is_some() {
            self.dirty.insert(name.to_string());
        }
    }

    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.fields
    }

    /// Field names written since the last persist.
    pub fn dirty_fields(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    /// Apply the fields `changes` wrote since its last persist.
    ///
    /// Fields unset on `changes` are removed; fields it did not touch keep
    /// their current value.
    pub fn apply_changes(&mut self, changes: &Record) {
        for name in &changes.dirty {
            match changes.fields.get(name) {
                Some(value) => {
                    self.fields.insert(name.clone(), value.clone());
                }
                None => {
                    self.fields.remove(name);
                }
            }
        }
    }

    pub fn migration_status(&self) -> Option<MigrationStatus> {
        self.fields
            .get(MIGRATION_STATUS_FIELD)
            .and_then(MigrationStatus::from_value)
    }

    pub fn set_migration_status(&mut self, status: MigrationStatus) {
        self.set(MIGRATION_STATUS_FIELD, status.code());
    }

    /// A write whose only change is the migration status field.
    pub fn is_bookkeeping_write(&self) -> bool {
        self.dirty.len() == 1 && self.dirty.contains(MIGRATION_STATUS_FIELD)
    }
}

// =============================================================================
// QUERIES
// =============================================================================

/// Query for records of one entity type, in store-default order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub entity_type: EntityType,
    /// Exclude records whose status is one of these.
    pub status_not_in: Vec<MigrationStatus>,
    pub limit: usize,
}

impl RecordQuery {
    /// Records of `entity_type` the sweep still has to migrate.
    pub fn unmigrated(entity_type: EntityType, limit: usize) -> Self {
        Self {
            entity_type,
            status_not_in: MigrationStatus::SWEEP_EXCLUDED.to_vec(),
            limit,
        }
    }

    /// Whether `record` passes the status filter.
    pub fn matches(&self, record: &Record) -> bool {
        match record.migration_status() {
            Some(status) => !self.status_not_in.contains(&status),
            None => true,
        }
    }
}
