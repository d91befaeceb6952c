//! User hooks and the per-entity-type trigger registry.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use trickle_core::{EntityType, Error, HookKind, Record, Result};

// =============================================================================
// HOOK TRAITS
// =============================================================================

/// User logic run before a write is persisted.
///
/// Returning `Some(record)` replaces the record being written.
#[async_trait]
pub trait BeforeWriteHook: Send + Sync {
    async fn call(&self, record: Record) -> Result<Option<Record>>;
}

/// User logic run around writes and deletes, or as a migrate function.
///
/// Migrate hooks must be idempotent and must not change the record's own
/// fields: the record they see is the one that gets persisted.
#[async_trait]
pub trait RecordHook: Send + Sync {
    async fn call(&self, record: Record) -> Result<()>;
}

#[async_trait]
impl<F, Fut> BeforeWriteHook for F
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Record>>> + Send + 'static,
{
    async fn call(&self, record: Record) -> Result<Option<Record>> {
        (self)(record).await
    }
}

#[async_trait]
impl<F, Fut> RecordHook for F
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn call(&self, record: Record) -> Result<()> {
        (self)(record).await
    }
}

/// A hook tagged with the slot it fills.
#[derive(Clone)]
pub enum Hook {
    BeforeWrite(Arc<dyn BeforeWriteHook>),
    AfterWrite(Arc<dyn RecordHook>),
    BeforeDelete(Arc<dyn RecordHook>),
    AfterDelete(Arc<dyn RecordHook>),
    MigrateOnWrite(Arc<dyn RecordHook>),
    MigrateOnDelete(Arc<dyn RecordHook>),
}

impl Hook {
    pub fn kind(&self) -> HookKind {
        match self {
            Hook::BeforeWrite(_) => HookKind::BeforeWrite,
            Hook::AfterWrite(_) => HookKind::AfterWrite,
            Hook::BeforeDelete(_) => HookKind::BeforeDelete,
            Hook::AfterDelete(_) => HookKind::AfterDelete,
            Hook::MigrateOnWrite(_) => HookKind::MigrateOnWrite,
            Hook::MigrateOnDelete(_) => HookKind::MigrateOnDelete,
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hook({})", self.kind())
    }
}

// =============================================================================
// HANDLER SET
// =============================================================================

/// The hooks registered for one entity type, at most one per kind.
#[derive(Clone, Default)]
pub struct HandlerSet {
    pub before_write: Option<Arc<dyn BeforeWriteHook>>,
    pub after_write: Option<Arc<dyn RecordHook>>,
    pub before_delete: Option<Arc<dyn RecordHook>>,
    pub after_delete: Option<Arc<dyn RecordHook>>,
    pub migrate_on_write: Option<Arc<dyn RecordHook>>,
    pub migrate_on_delete: Option<Arc<dyn RecordHook>>,
}

impl HandlerSet {
    pub fn has(&self, kind: HookKind) -> bool {
        match kind {
            HookKind::BeforeWrite => self.before_write.is_some(),
            HookKind::AfterWrite => self.after_write.is_some(),
            HookKind::BeforeDelete => self.before_delete.is_some(),
            HookKind::AfterDelete => self.after_delete.is_some(),
            HookKind::MigrateOnWrite => self.migrate_on_write.is_some(),
            HookKind::MigrateOnDelete => self.migrate_on_delete.is_some(),
        }
    }

    /// Kinds with a registered hook, in declaration order.
    pub fn kinds(&self) -> Vec<HookKind> {
        HookKind::ALL
            .into_iter()
            .filter(|kind| self.has(*kind))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }

    /// Fill the slot for `hook`. The caller checks the slot is free.
    fn fill(&mut self, hook: Hook) {
        match hook {
            Hook::BeforeWrite(h) => self.before_write = Some(h),
            Hook::AfterWrite(h) => self.after_write = Some(h),
            Hook::BeforeDelete(h) => self.before_delete = Some(h),
            Hook::AfterDelete(h) => self.after_delete = Some(h),
            Hook::MigrateOnWrite(h) => self.migrate_on_write = Some(h),
            Hook::MigrateOnDelete(h) => self.migrate_on_delete = Some(h),
        }
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.kinds()).finish()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Hooks keyed by entity type.
///
/// Populated once at startup, then shared read-only (typically behind an
/// `Arc`) with the trigger composer and the sweep job.
///
/// ```
/// use trickle_core::{Record, Result};
/// use trickle_jobs::TriggerRegistry;
///
/// # fn main() -> Result<()> {
/// let registry = TriggerRegistry::new()
///     .on_migrate_write("Widget", |_record: Record| async { Ok::<(), trickle_core::Error>(()) })?
///     .on_after_delete("Widget", |_record: Record| async { Ok::<(), trickle_core::Error>(()) })?;
///
/// assert!(registry.lookup(&"Widget".into()).migrate_on_write.is_some());
/// assert!(registry.lookup(&"Gadget".into()).is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct TriggerRegistry {
    sets: BTreeMap<EntityType, HandlerSet>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for an entity type.
    ///
    /// Fails with [`Error::DuplicateHandler`] if the slot is already taken;
    /// the existing hook is left in place.
    pub fn register(&mut self, entity_type: impl Into<EntityType>, hook: Hook) -> Result<()> {
        let entity_type = entity_type.into();
        let kind = hook.kind();
        let set = self.sets.entry(entity_type.clone()).or_default();
        if set.has(kind) {
            return Err(Error::DuplicateHandler { entity_type, kind });
        }
        set.fill(hook);
        debug!(%entity_type, hook = %kind, "Registered hook");
        Ok(())
    }

    pub fn on_before_write<H>(mut self, entity_type: impl Into<EntityType>, hook: H) -> Result<Self>
    where
        H: BeforeWriteHook + 'static,
    {
        self.register(entity_type, Hook::BeforeWrite(Arc::new(hook)))?;
        Ok(self)
    }

    pub fn on_after_write<H>(mut self, entity_type: impl Into<EntityType>, hook: H) -> Result<Self>
    where
        H: RecordHook + 'static,
    {
        self.register(entity_type, Hook::AfterWrite(Arc::new(hook)))?;
        Ok(self)
    }

    pub fn on_before_delete<H>(mut self, entity_type: impl Into<EntityType>, hook: H) -> Result<Self>
    where
        H: RecordHook + 'static,
    {
        self.register(entity_type, Hook::BeforeDelete(Arc::new(hook)))?;
        Ok(self)
    }

    pub fn on_after_delete<H>(mut self, entity_type: impl Into<EntityType>, hook: H) -> Result<Self>
    where
        H: RecordHook + 'static,
    {
        self.register(entity_type, Hook::AfterDelete(Arc::new(hook)))?;
        Ok(self)
    }

    pub fn on_migrate_write<H>(mut self, entity_type: impl Into<EntityType>, hook: H) -> Result<Self>
    where
        H: RecordHook + 'static,
    {
        self.register(entity_type, Hook::MigrateOnWrite(Arc::new(hook)))?;
        Ok(self)
    }

    pub fn on_migrate_delete<H>(mut self, entity_type: impl Into<EntityType>, hook: H) -> Result<Self>
    where
        H: RecordHook + 'static,
    {
        self.register(entity_type, Hook::MigrateOnDelete(Arc::new(hook)))?;
        Ok(self)
    }

    /// Hooks for an entity type; empty for unregistered types.
    pub fn lookup(&self, entity_type: &EntityType) -> HandlerSet {
        self.sets.get(entity_type).cloned().unwrap_or_default()
    }

    /// Registered entity types with their hooks, ordered by type name.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityType, &HandlerSet)> {
        self.sets.iter()
    }

    pub fn entity_types(&self) -> Vec<EntityType> {
        self.sets.keys().cloned().collect()
    }

    /// Entity types the sweep job migrates.
    pub fn migratable_types(&self) -> Vec<EntityType> {
        self.sets
            .iter()
            .filter(|(_, set)| set.migrate_on_write.is_some())
            .map(|(entity_type, _)| entity_type.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.sets.iter()).finish()
    }
}
