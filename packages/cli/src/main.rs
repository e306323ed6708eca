//! Command-line front end for the translation queue.
//!
//! Configuration comes from the environment (`TRANSLATE_ENDPOINT`,
//! `TRANSLATE_NONCE`, `STORAGE_*`, `QUEUE_*`). Queue state is kept in the
//! configured storage between invocations, so an interrupted run can be
//! picked up by calling `run` again.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actors::{QueueListener, TranslationQueue, spawn_listener};
use anyhow::{Context, Result, bail};
use backend::{BackendConfig, HttpBackend};
use clap::{Parser, Subcommand};
use storage::{SnapshotStore, Storage};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use translation_core::{
    ItemKey, QueueConfig, QueueEvent, QueueItem, QueueSummary, RunId, Step, StepProgress,
};

#[derive(Parser)]
#[command(name = "translation-queue")]
#[command(about = "Translate content one chunked job at a time")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue items (if any) and process the queue until it drains
    Run {
        /// JSON file holding an array of items
        #[arg(long)]
        items: Option<PathBuf>,

        /// Source content id to translate
        #[arg(long, requires = "language")]
        source: Option<u64>,

        /// Target language, repeatable
        #[arg(long = "language", requires = "source")]
        languages: Vec<String>,

        /// Existing translation to overwrite
        #[arg(long, default_value_t = 0)]
        target: u64,

        /// Display title for log output
        #[arg(long)]
        title: Option<String>,
    },

    /// Move failed items back into the queue and process them
    Retry {
        /// Retry one item instead of every failed item
        #[arg(long, requires = "language")]
        source: Option<u64>,

        #[arg(long, requires = "source")]
        language: Option<String>,
    },

    /// Print the stored queue state as JSON
    Status,

    /// Remove every item and the stored snapshot
    Clear,
}

/// Logs queue progress as it happens.
struct ProgressLog;

impl QueueListener for ProgressLog {
    fn on_item_started(&mut self, _run_id: RunId, item: &QueueItem) {
        tracing::info!("Started {}", item.label());
    }

    fn on_step(&mut self, _run_id: RunId, key: &ItemKey, progress: &StepProgress) {
        tracing::info!(
            "{} [{}/{}] {}",
            key,
            progress.step_index + 1,
            progress.total_steps,
            progress.message
        );
    }

    fn on_item_completed(&mut self, _run_id: RunId, item: &QueueItem, duration_ms: u64) {
        tracing::info!("Translated {} in {}ms", item.label(), duration_ms);
    }

    fn on_item_failed(&mut self, _run_id: RunId, item: &QueueItem, step: Option<Step>, error: &str) {
        match step {
            Some(step) => tracing::error!("{} failed at {}: {}", item.label(), step, error),
            None => tracing::error!("{} failed: {}", item.label(), error),
        }
    }

    fn on_item_cancelled(&mut self, _run_id: RunId, item: &QueueItem) {
        tracing::warn!("Cancelled {}", item.label());
    }

    fn on_lagged(&mut self, missed: u64) {
        tracing::warn!("Missed {} progress events", missed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = QueueConfig::from_env();

    let storage = Storage::from_env().context("Failed to configure storage")?;
    tracing::debug!("Using {} storage", storage.kind_str());
    // `status` reads the snapshot without a queue, so it applies the window itself.
    let store = SnapshotStore::new(storage)
        .with_stale_after(Duration::from_secs(config.stale_after_secs));

    match cli.command {
        Commands::Run {
            items,
            source,
            languages,
            target,
            title,
        } => {
            let mut batch = match items {
                Some(path) => read_items(&path)?,
                None => Vec::new(),
            };
            if let Some(source) = source {
                for language in languages {
                    let mut item = QueueItem::new(source, language).with_target(target);
                    if let Some(title) = &title {
                        item = item.with_title(title.clone());
                    }
                    batch.push(item);
                }
            }

            let queue = spawn_queue(config, store).await?;
            if !batch.is_empty() {
                queue.add_items(batch)?;
            }
            let summary = run_to_completion(&queue).await?;
            queue.shutdown().await?;
            print_json(&summary)?;
        }

        Commands::Retry { source, language } => {
            let queue = spawn_queue(config, store).await?;
            match (source, language) {
                (Some(source), Some(language)) => {
                    let item = queue.retry(ItemKey::new(source, language)).await?;
                    tracing::info!("Requeued {}", item.label());
                }
                _ => {
                    let count = queue.retry_failed().await?;
                    tracing::info!("Requeued {} failed items", count);
                }
            }
            let summary = run_to_completion(&queue).await?;
            queue.shutdown().await?;
            print_json(&summary)?;
        }

        Commands::Status => {
            // Status only needs the stored snapshot, no backend.
            let status = match store.load().await {
                Some(snapshot) => serde_json::to_value(&snapshot)?,
                None => serde_json::Value::Null,
            };
            print_json(&status)?;
        }

        Commands::Clear => {
            store.clear().await;
            tracing::info!("Cleared translation queue");
        }
    }

    Ok(())
}

async fn spawn_queue(config: QueueConfig, store: SnapshotStore) -> Result<TranslationQueue> {
    let backend_config = BackendConfig::from_env().context("Failed to configure backend")?;
    let backend = HttpBackend::new(backend_config);
    let queue = TranslationQueue::spawn(config, Arc::new(backend), store).await?;
    Ok(queue)
}

/// Start the queue and wait for the run to end. Ctrl-C cancels the run.
async fn run_to_completion(queue: &TranslationQueue) -> Result<QueueSummary> {
    let mut events = queue.subscribe();
    let _log = spawn_listener(queue.subscribe(), ProgressLog);

    let status = queue.status().await?;
    if status.pending.is_empty() {
        tracing::info!("Nothing to translate");
        return Ok(QueueSummary {
            completed: status.completed.len() as u64,
            failed: status.failed.len() as u64,
            cancelled: false,
        });
    }
    // A restored snapshot may carry the paused flag; resume clears it and starts.
    queue.resume()?;

    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(QueueEvent::QueueCompleted { summary, .. }) => return Ok(summary),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => bail!("Queue stopped before the run finished"),
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                tracing::warn!("Interrupted, cancelling after the current step");
                interrupted = true;
                queue.cancel()?;
            }
        }
    }
}

fn read_items(path: &PathBuf) -> Result<Vec<QueueItem>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let items: Vec<QueueItem> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse items from {}", path.display()))?;
    Ok(items)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
