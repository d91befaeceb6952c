//! Demo host for trickle migrations.
//!
//! Seeds an in-memory store with legacy `Note` records written before the
//! migration engine existed, registers hooks that copy each note into the
//! `NoteV2` schema of a second store, exports the triggers and runs the
//! `import` job once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trickle_jobs::defaults::IMPORT_JOB_NAME;
use trickle_jobs::memory::MemoryStore;
use trickle_jobs::{
    export_triggers, EntityType, Error, ObjectStore, Record, RecordQuery, StatusSink, SweepConfig,
    TriggerRegistry,
};

const DEFAULT_DEMO_RECORDS: usize = 2500;

/// Status sink that forwards job outcomes to the log.
#[derive(Default)]
struct TracingSink {
    failed: AtomicBool,
}

impl StatusSink for TracingSink {
    fn success(&self, message: &str) {
        info!(job = IMPORT_JOB_NAME, "{message}");
    }

    fn error(&self, message: &str) {
        self.failed.store(true, Ordering::SeqCst);
        error!(job = IMPORT_JOB_NAME, "{message}");
    }
}

/// Copy a legacy note into the new schema, keyed by the legacy id.
async fn copy_note(target: &MemoryStore, note: &Record) -> trickle_jobs::Result<()> {
    let legacy_id = note
        .id()
        .ok_or_else(|| Error::handler("note has not been persisted"))?
        .to_string();
    let body = note
        .get("body")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let existing = target
        .all(&EntityType::from("NoteV2"))?
        .into_iter()
        .find(|r| r.get("legacyId").and_then(|v| v.as_str()) == Some(legacy_id.as_str()));
    let mut copy = existing.unwrap_or_else(|| {
        Record::new("NoteV2").with_field("legacyId", legacy_id.clone())
    });
    copy.set("content", body);
    copy.set("words", body.split_whitespace().count() as u64);
    target.save(copy).await?;
    Ok(())
}

fn demo_registry(target: MemoryStore) -> trickle_jobs::Result<TriggerRegistry> {
    let on_write = target.clone();
    let on_delete = target;
    TriggerRegistry::new()
        .on_before_write("Note", |mut note: Record| async move {
            let trimmed = note
                .get("body")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string());
            Ok::<_, Error>(trimmed.map(|body| {
                note.set("body", body);
                note
            }))
        })?
        .on_migrate_write("Note", move |note: Record| {
            let target = on_write.clone();
            async move { copy_note(&target, &note).await }
        })?
        .on_migrate_delete("Note", move |note: Record| {
            let target = on_delete.clone();
            async move {
                let legacy_id = note.id().map(|id| id.to_string());
                let copies = target.all(&EntityType::from("NoteV2"))?;
                for copy in copies {
                    if copy.get("legacyId").and_then(|v| v.as_str()) == legacy_id.as_deref() {
                        target.delete(copy).await?;
                    }
                }
                Ok::<(), Error>(())
            }
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "trickle_runner=info,trickle_jobs=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "trickle_runner=info,trickle_jobs=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("trickle-runner.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let config = SweepConfig::from_env();
    let demo_records: usize = std::env::var("TRICKLE_DEMO_RECORDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_DEMO_RECORDS);

    let source = MemoryStore::new();
    let target = MemoryStore::new();
    for i in 0..demo_records {
        source.seed(Record::new("Note").with_field("body", format!("  legacy note {i}  ")))?;
    }
    info!(records = demo_records, batch_size = config.batch_size, "Seeded legacy notes");

    export_triggers(
        demo_registry(target.clone())?,
        &source,
        Arc::new(source.clone()),
        config,
    )?;

    // Live traffic: a brand new note takes the second-pass route.
    let created = source
        .save(Record::new("Note").with_field("body", " written after deploy "))
        .await?;
    info!(record_id = ?created.id(), "Saved note through composed triggers");

    let sink = Arc::new(TracingSink::default());
    source.run_job(IMPORT_JOB_NAME, sink.clone()).await?;
    if sink.failed.load(Ordering::SeqCst) {
        anyhow::bail!("{IMPORT_JOB_NAME} job failed");
    }

    let remaining = source
        .find(&RecordQuery::unmigrated(EntityType::from("Note"), 1))
        .await?;
    if !remaining.is_empty() {
        warn!("Unmigrated notes remain, run the import job again");
    }

    let summary = serde_json::json!({
        "legacy_notes": source.all(&EntityType::from("Note"))?.len(),
        "migrated_notes": target.all(&EntityType::from("NoteV2"))?.len(),
        "saves": source.save_count(),
        "queries": source.query_count(),
        "unmigrated_remaining": !remaining.is_empty(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
