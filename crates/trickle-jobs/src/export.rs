//! Installing the migration engine on an event host.

use std::sync::Arc;

use futures::FutureExt;
use tracing::info;

use trickle_core::defaults::IMPORT_JOB_NAME;
use trickle_core::{EventHost, JobCallback, ObjectStore, Result, StatusSink};

use crate::composer::{composed_types, TriggerComposer};
use crate::handler::TriggerRegistry;
use crate::sweep::{SweepConfig, Sweeper};

/// Job callback that runs one sweep and reports to the job's status sink.
pub fn import_job(sweeper: Arc<Sweeper>) -> JobCallback {
    Arc::new(move |sink: Arc<dyn StatusSink>| {
        let sweeper = sweeper.clone();
        async move {
            // Outcome already reported through the sink.
            let _ = sweeper.run_job(sink.as_ref()).await;
        }
        .boxed()
    })
}

/// Install every composed write/delete callback and register the sweep job
/// under [`IMPORT_JOB_NAME`].
///
/// Consumes the registry: after export it is shared read-only by the
/// callbacks and the job, and the returned handle is for inspection.
pub fn export_triggers<H>(
    registry: TriggerRegistry,
    host: &H,
    store: Arc<dyn ObjectStore>,
    config: SweepConfig,
) -> Result<Arc<TriggerRegistry>>
where
    H: EventHost + ?Sized,
{
    let registry = Arc::new(registry);

    let composer = TriggerComposer::new(registry.clone(), store.clone());
    let installed = composer.install(host)?;

    let sweeper = Arc::new(Sweeper::new(registry.clone(), store, config));
    host.register_job(IMPORT_JOB_NAME, import_job(sweeper))?;

    info!(
        callbacks = installed,
        entity_types = ?composed_types(&registry),
        migratable = ?registry.migratable_types(),
        job = IMPORT_JOB_NAME,
        "Exported migration triggers"
    );
    Ok(registry)
}
