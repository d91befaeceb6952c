//! Composition of user hooks into the callbacks the event host runs.
//!
//! Every write of a registered entity type goes through:
//!
//! 1. **pre-write**: user before-write hook (skipped for bookkeeping writes),
//!    then the state machine decides whether to mark the record and run the
//!    migrate hook before the store persists it.
//! 2. **post-write**: user after-write hook and, for the creating save only,
//!    a bookkeeping save that requests the second pass. Both run concurrently.
//!
//! Deletes run the before-delete hook, then the migrate-on-delete hook.

use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, instrument, trace};

use trickle_core::state::{self, PreWriteAction};
use trickle_core::{
    AfterDeleteCallback, AfterWriteCallback, BeforeDeleteCallback, BeforeWriteCallback,
    EntityType, EventHost, ObjectStore, Record, Result,
};

use crate::handler::{HandlerSet, TriggerRegistry};

/// Builds and installs the composed write/delete callbacks.
pub struct TriggerComposer {
    registry: Arc<TriggerRegistry>,
    store: Arc<dyn ObjectStore>,
}

impl TriggerComposer {
    /// `store` is used for the second-pass save issued after a record's first
    /// persist.
    pub fn new(registry: Arc<TriggerRegistry>, store: Arc<dyn ObjectStore>) -> Self {
        Self { registry, store }
    }

    /// Register the composed callbacks with the host.
    ///
    /// A callback is installed only when at least one hook feeding it exists.
    /// Returns the number of callbacks installed.
    pub fn install<H: EventHost + ?Sized>(&self, host: &H) -> Result<usize> {
        let mut installed = 0;
        for (entity_type, handlers) in self.registry.iter() {
            if handlers.before_write.is_some() || handlers.migrate_on_write.is_some() {
                host.register_before_write(entity_type, before_write_callback(handlers))?;
                installed += 1;
            }
            if handlers.after_write.is_some() || handlers.migrate_on_write.is_some() {
                host.register_after_write(
                    entity_type,
                    after_write_callback(handlers, self.store.clone()),
                )?;
                installed += 1;
            }
            if handlers.before_delete.is_some() || handlers.migrate_on_delete.is_some() {
                host.register_before_delete(entity_type, before_delete_callback(handlers))?;
                installed += 1;
            }
            if handlers.after_delete.is_some() {
                host.register_after_delete(entity_type, after_delete_callback(handlers))?;
                installed += 1;
            }
            debug!(%entity_type, hooks = ?handlers, "Composed triggers");
        }
        Ok(installed)
    }
}

fn before_write_callback(handlers: &HandlerSet) -> BeforeWriteCallback {
    let handlers = handlers.clone();
    Arc::new(move |record: Record| {
        let handlers = handlers.clone();
        async move { pre_write(&handlers, record).await }.boxed()
    })
}

fn after_write_callback(handlers: &HandlerSet, store: Arc<dyn ObjectStore>) -> AfterWriteCallback {
    let handlers = handlers.clone();
    Arc::new(move |record: Record| {
        let handlers = handlers.clone();
        let store = store.clone();
        async move { post_write(&handlers, store.as_ref(), record).await }.boxed()
    })
}

fn before_delete_callback(handlers: &HandlerSet) -> BeforeDeleteCallback {
    let handlers = handlers.clone();
    Arc::new(move |record: Record| {
        let handlers = handlers.clone();
        async move { pre_delete(&handlers, record).await }.boxed()
    })
}

fn after_delete_callback(handlers: &HandlerSet) -> AfterDeleteCallback {
    let handlers = handlers.clone();
    Arc::new(move |record: Record| {
        let handlers = handlers.clone();
        async move { post_delete(&handlers, record).await }.boxed()
    })
}

/// Pre-write composition. `Ok` carries the record to persist.
#[instrument(skip_all, fields(entity_type = %request.entity_type(), record_id = ?request.id()))]
pub(crate) async fn pre_write(handlers: &HandlerSet, request: Record) -> Result<Record> {
    let mut record = request;

    if let Some(hook) = &handlers.before_write {
        if state::runs_before_write_hook(&record) {
            if let Some(replacement) = hook.call(record.clone()).await? {
                record = replacement;
            }
        } else {
            trace!("Bookkeeping write, skipping before-write hook");
        }
    }

    let Some(migrate) = &handlers.migrate_on_write else {
        return Ok(record);
    };

    match state::pre_write_action(&record, true) {
        PreWriteAction::Unchanged => {
            trace!(status = ?record.migration_status(), "Record already migrated");
        }
        PreWriteAction::DeferUntilPersisted => {
            debug!("New record, migration deferred to second pass");
        }
        PreWriteAction::Migrate(status) => {
            record.set_migration_status(status);
            migrate.call(record.clone()).await?;
            debug!(%status, "Migrated record on write");
        }
    }
    Ok(record)
}

/// Post-write composition. Failures are logged; the write already succeeded.
#[instrument(skip_all, fields(entity_type = %record.entity_type(), record_id = ?record.id()))]
pub(crate) async fn post_write(handlers: &HandlerSet, store: &dyn ObjectStore, record: Record) {
    let after_write = async {
        if let Some(hook) = &handlers.after_write {
            if let Err(e) = hook.call(record.clone()).await {
                error!(error = %e, "After-write hook failed");
            }
        }
    };

    let second_pass = async {
        let has_migrate = handlers.migrate_on_write.is_some();
        if let Some(status) = state::post_write_status(&record, has_migrate) {
            let mut pending = record.clone();
            pending.set_migration_status(status);
            match store.save(pending).await {
                Ok(_) => debug!("Second pass completed"),
                Err(e) => error!(error = %e, "Second-pass save failed"),
            }
        }
    };

    tokio::join!(after_write, second_pass);
}

/// Pre-delete composition. `Err` aborts the delete.
#[instrument(skip_all, fields(entity_type = %record.entity_type(), record_id = ?record.id()))]
pub(crate) async fn pre_delete(handlers: &HandlerSet, record: Record) -> Result<()> {
    if let Some(hook) = &handlers.before_delete {
        hook.call(record.clone()).await?;
    }
    if let Some(migrate) = &handlers.migrate_on_delete {
        migrate.call(record).await?;
        debug!("Migrated record on delete");
    }
    Ok(())
}

#[instrument(skip_all, fields(entity_type = %record.entity_type(), record_id = ?record.id()))]
pub(crate) async fn post_delete(handlers: &HandlerSet, record: Record) {
    if let Some(hook) = &handlers.after_delete {
        if let Err(e) = hook.call(record).await {
            error!(error = %e, "After-delete hook failed");
        }
    }
}

/// Entity types that would receive at least one callback.
pub fn composed_types(registry: &TriggerRegistry) -> Vec<EntityType> {
    registry
        .iter()
        .filter(|(_, handlers)| !handlers.is_empty())
        .map(|(entity_type, _)| entity_type.clone())
        .collect()
}
