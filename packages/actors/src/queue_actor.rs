//! Queue actor: the orchestrator owning every list and flag.
//!
//! All state changes go through this actor's mailbox. The processing loop is
//! expressed as message handling: dispatching an item hands it to the worker,
//! and the worker's `ItemFinished` message triggers the next dispatch. Pause
//! simply withholds the next dispatch; `Resume` and `Cancel` are the wake-ups.

use std::collections::VecDeque;
use std::sync::Arc;

use backend::TranslationBackend;
use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use storage::SnapshotStore;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use translation_core::{
    ItemKey, QueueConfig, QueueEvent, QueueItem, QueueSnapshot, QueueStatus, QueueSummary,
    RunId, RunState, Step, StepProgress,
};

use crate::driver::{ChunkedJobDriver, DriverError, JobReport};
use crate::messages::{QueueError, QueueMessage, WorkerMessage};
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Error recorded on an item stopped by the operator.
pub const CANCELLED_ERROR: &str = "Cancelled";

/// One processing run, from `Start` until drained or cancelled.
struct ActiveRun {
    id: RunId,
    cancel: CancellationToken,
}

/// The item currently owned by the worker.
struct InFlight {
    run_id: RunId,
    item: QueueItem,
    started_at: DateTime<Utc>,
    progress: Option<StepProgress>,
}

/// Arguments for spawning the queue actor.
pub struct QueueActorArgs {
    pub config: QueueConfig,
    pub backend: Arc<dyn TranslationBackend>,
    pub store: SnapshotStore,
    pub events: broadcast::Sender<QueueEvent>,
}

/// State for the queue actor.
pub struct QueueActorState {
    store: SnapshotStore,
    events: broadcast::Sender<QueueEvent>,
    driver: ChunkedJobDriver,
    worker: ActorRef<WorkerMessage>,
    pending: VecDeque<QueueItem>,
    current: Option<InFlight>,
    completed: Vec<QueueItem>,
    failed: Vec<QueueItem>,
    paused: bool,
    cancelled: bool,
    run: Option<ActiveRun>,
    /// `start` arrived while a cancelled run was still waiting for its
    /// in-flight item.
    restart_requested: bool,
}

impl QueueActorState {
    fn run_state(&self) -> RunState {
        match &self.run {
            None => RunState::Idle,
            Some(_) if self.cancelled => RunState::Idle,
            Some(_) if self.paused => RunState::Paused,
            Some(_) => RunState::Running,
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot::new(
            self.pending.iter().cloned().collect(),
            self.completed.clone(),
            self.failed.clone(),
            self.paused,
        )
    }

    fn status(&self) -> QueueStatus {
        QueueStatus {
            state: self.run_state(),
            cancelled: self.cancelled,
            pending: self.pending.iter().cloned().collect(),
            current: self.current.as_ref().map(|c| c.item.clone()),
            current_step: self.current.as_ref().and_then(|c| c.progress.clone()),
            completed: self.completed.clone(),
            failed: self.failed.clone(),
        }
    }

    async fn persist(&self) {
        self.store.save(&self.snapshot()).await;
    }

    /// Broadcast an event.
    fn broadcast(&self, event: QueueEvent) {
        tracing::trace!("{}", event.description());
        let _ = self.events.send(event);
    }

    /// Broadcast current counters.
    fn broadcast_stats(&self) {
        self.broadcast(QueueEvent::StatsUpdated {
            stats: self.status().stats(),
            timestamp: Utc::now(),
        });
    }

    fn broadcast_state_change(&self, old_state: RunState) {
        let new_state = self.run_state();
        if old_state != new_state {
            tracing::info!("Translation queue {} -> {}", old_state, new_state);
            self.broadcast(QueueEvent::StateChanged {
                old_state,
                new_state,
                timestamp: Utc::now(),
            });
        }
    }

    fn is_queued(&self, key: &ItemKey) -> bool {
        self.pending.iter().any(|i| &i.key() == key)
            || self.current.as_ref().is_some_and(|c| &c.item.key() == key)
    }

    fn add_items(&mut self, items: Vec<QueueItem>) -> usize {
        let mut added = 0;
        for item in items {
            let key = item.key();
            if self.is_queued(&key) {
                tracing::debug!("Skipping {}: already queued", key);
                continue;
            }
            self.completed.retain(|i| i.key() != key);
            self.failed.retain(|i| i.key() != key);

            let mut item = item;
            item.error = None;
            self.pending.push_back(item);
            added += 1;
        }
        added
    }

    fn requeue_failed(&mut self, key: &ItemKey) -> Option<QueueItem> {
        let index = self.failed.iter().position(|i| &i.key() == key)?;
        let mut item = self.failed.remove(index);
        item.error = None;
        self.pending.push_back(item.clone());
        Some(item)
    }

    /// Begin a new run. No-op while a run is active, except that a cancelled
    /// run still draining its in-flight item defers the start until it ends.
    async fn start(&mut self) {
        if self.run.is_some() {
            if self.cancelled {
                tracing::debug!("Start deferred until the cancelled run ends");
                self.restart_requested = true;
            } else {
                tracing::debug!("Start ignored: a run is already active");
            }
            return;
        }

        let old_state = self.run_state();
        let run = ActiveRun {
            id: RunId::new(),
            cancel: CancellationToken::new(),
        };
        tracing::info!(
            "Starting translation run {} with {} pending items",
            run.id,
            self.pending.len()
        );
        self.cancelled = false;
        self.restart_requested = false;
        self.run = Some(run);
        self.broadcast_state_change(old_state);
        self.dispatch_next().await;
    }

    /// Hand the next pending item to the worker, or end the run.
    async fn dispatch_next(&mut self) {
        if self.current.is_some() {
            return;
        }
        let Some((run_id, cancel)) = self.run.as_ref().map(|r| (r.id, r.cancel.clone())) else {
            return;
        };
        if self.cancelled {
            self.finish_run().await;
            return;
        }
        if self.paused {
            tracing::debug!("Queue paused, waiting for resume");
            return;
        }
        let Some(item) = self.pending.pop_front() else {
            self.finish_run().await;
            return;
        };

        tracing::info!("Translating {}", item.label());

        self.current = Some(InFlight {
            run_id,
            item: item.clone(),
            started_at: Utc::now(),
            progress: None,
        });
        self.persist().await;
        self.broadcast(QueueEvent::ItemStarted {
            run_id,
            item: item.clone(),
            timestamp: Utc::now(),
        });
        self.broadcast_stats();

        let sent = self.worker.send_message(WorkerMessage::Process {
            run_id,
            item: Box::new(item),
            cancel,
        });
        if let Err(e) = sent {
            tracing::warn!("Failed to hand item to worker: {}", e);
            let key = self.current.as_ref().map(|c| c.item.key());
            if let Some(key) = key {
                self.record_outcome(
                    run_id,
                    key,
                    Err(DriverError::StepFailed {
                        step: Step::Init,
                        message: "Translation worker unavailable".to_string(),
                    }),
                )
                .await;
            }
            self.cancelled = true;
            self.finish_run().await;
        }
    }

    /// Move the in-flight item into its terminal list. Returns `false` if the
    /// outcome belongs to an item that is no longer tracked.
    async fn record_outcome(
        &mut self,
        run_id: RunId,
        key: ItemKey,
        outcome: Result<JobReport, DriverError>,
    ) -> bool {
        let matches = self
            .current
            .as_ref()
            .is_some_and(|c| c.run_id == run_id && c.item.key() == key);
        if !matches {
            tracing::debug!("Discarding outcome for {} from a cleared run", key);
            return false;
        }
        let Some(InFlight {
            mut item,
            started_at,
            ..
        }) = self.current.take()
        else {
            return false;
        };

        let now = Utc::now();
        let event = match outcome {
            Ok(report) => {
                let duration_ms = (now - started_at).num_milliseconds().max(0) as u64;
                tracing::info!(
                    "Translated {} (job {}, {} steps) in {}ms",
                    item.label(),
                    report.job_id,
                    report.steps,
                    duration_ms
                );
                self.completed.push(item.clone());
                QueueEvent::ItemCompleted {
                    run_id,
                    item,
                    duration_ms,
                    timestamp: now,
                }
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!("Stopped {} before step {}", item.label(), e.step());
                item.error = Some(CANCELLED_ERROR.to_string());
                self.failed.push(item.clone());
                QueueEvent::ItemCancelled {
                    run_id,
                    item,
                    timestamp: now,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Translation of {} failed at step {}: {}",
                    item.label(),
                    e.step(),
                    e
                );
                let error = e.to_string();
                item.error = Some(error.clone());
                self.failed.push(item.clone());
                QueueEvent::ItemFailed {
                    run_id,
                    item,
                    step: Some(e.step()),
                    error,
                    timestamp: now,
                }
            }
        };

        self.persist().await;
        self.broadcast(event);
        self.broadcast_stats();
        true
    }

    /// End the active run and report the summary.
    async fn finish_run(&mut self) {
        let old_state = self.run_state();
        let Some(run) = self.run.take() else {
            return;
        };
        let cancelled = self.cancelled;
        let summary = QueueSummary {
            completed: self.completed.len() as u64,
            failed: self.failed.len() as u64,
            cancelled,
        };
        tracing::info!(
            "Translation run {} finished: {} completed, {} failed{}",
            run.id,
            summary.completed,
            summary.failed,
            if cancelled { " (cancelled)" } else { "" }
        );

        // A drained queue with nothing to retry has nothing worth restoring.
        if !cancelled && self.pending.is_empty() && self.failed.is_empty() {
            self.store.clear().await;
        } else {
            self.persist().await;
        }

        self.broadcast(QueueEvent::QueueCompleted {
            run_id: run.id,
            summary,
            timestamp: Utc::now(),
        });
        if old_state != RunState::Idle {
            self.broadcast(QueueEvent::StateChanged {
                old_state,
                new_state: RunState::Idle,
                timestamp: Utc::now(),
            });
        }
        self.broadcast_stats();
    }

    async fn pause(&mut self) {
        if self.paused {
            return;
        }
        let old_state = self.run_state();
        self.paused = true;
        self.persist().await;
        self.broadcast_state_change(old_state);
    }

    async fn resume(&mut self) {
        let old_state = self.run_state();
        let was_paused = self.paused;
        self.paused = false;
        if was_paused {
            self.persist().await;
        }

        if self.run.is_some() {
            self.broadcast_state_change(old_state);
            self.dispatch_next().await;
        } else if !self.pending.is_empty() {
            self.start().await;
        }
    }

    async fn cancel(&mut self) {
        let old_state = self.run_state();
        self.restart_requested = false;
        let changed = !self.cancelled || self.paused;
        self.cancelled = true;
        self.paused = false;
        if !changed {
            return;
        }

        if let Some(run) = &self.run {
            tracing::info!("Cancelling translation run {}", run.id);
            run.cancel.cancel();
        }
        self.persist().await;
        self.broadcast_state_change(old_state);

        // With an item in flight the run ends when its outcome arrives.
        if self.current.is_none() {
            self.finish_run().await;
        }
    }

    async fn clear(&mut self) {
        let old_state = self.run_state();
        if let Some(run) = self.run.take() {
            tracing::info!("Clearing queue, abandoning run {}", run.id);
            run.cancel.cancel();
            self.broadcast(QueueEvent::QueueCompleted {
                run_id: run.id,
                summary: QueueSummary {
                    completed: self.completed.len() as u64,
                    failed: self.failed.len() as u64,
                    cancelled: true,
                },
                timestamp: Utc::now(),
            });
        }
        self.current = None;
        self.pending.clear();
        self.completed.clear();
        self.failed.clear();
        self.paused = false;
        self.cancelled = false;
        self.restart_requested = false;
        self.store.clear().await;
        self.broadcast_state_change(old_state);
        self.broadcast_stats();
    }

    /// Run a start that was deferred behind a cancelled run, once that run
    /// has ended.
    async fn start_if_requested(&mut self) {
        if self.restart_requested && self.run.is_none() {
            self.restart_requested = false;
            self.start().await;
        }
    }

    async fn respawn_worker(
        &mut self,
        myself: &ActorRef<QueueMessage>,
    ) -> Result<(), ActorProcessingErr> {
        self.worker = spawn_worker(myself, self.driver.clone()).await?;
        Ok(())
    }
}

async fn spawn_worker(
    queue: &ActorRef<QueueMessage>,
    driver: ChunkedJobDriver,
) -> Result<ActorRef<WorkerMessage>, ActorProcessingErr> {
    let args = WorkerArgs {
        queue: queue.clone(),
        driver,
    };
    let (worker, _handle) = Actor::spawn_linked(None, WorkerActor, args, queue.get_cell())
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;
    Ok(worker)
}

/// Queue actor that orchestrates translation items.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueActorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting translation queue");

        let driver = ChunkedJobDriver::new(args.backend, args.config.max_chunk_count);
        let worker = spawn_worker(&myself, driver.clone()).await?;

        let mut state = QueueActorState {
            store: args.store,
            events: args.events,
            driver,
            worker,
            pending: VecDeque::new(),
            current: None,
            completed: Vec::new(),
            failed: Vec::new(),
            paused: false,
            cancelled: false,
            run: None,
            restart_requested: false,
        };

        if let Some(snapshot) = state.store.load().await {
            tracing::info!(
                "Restored queue snapshot: {} pending, {} completed, {} failed",
                snapshot.queue.len(),
                snapshot.completed.len(),
                snapshot.failed.len()
            );
            state.pending = snapshot.queue.into();
            state.completed = snapshot.completed;
            state.failed = snapshot.failed;
            state.paused = snapshot.is_paused;
        }

        Ok(state)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!("Shutting down translation queue");
        // Every mutation has already been persisted.
        if let Some(run) = &state.run {
            run.cancel.cancel();
        }
        state.worker.stop(None);
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::AddItems { items } => {
                let requested = items.len();
                let added = state.add_items(items);
                tracing::info!("Enqueued {} of {} items", added, requested);
                state.persist().await;
                state.broadcast_stats();
            }

            QueueMessage::Clear => state.clear().await,

            QueueMessage::Start => state.start().await,

            QueueMessage::Pause => state.pause().await,

            QueueMessage::Resume => state.resume().await,

            QueueMessage::Cancel => state.cancel().await,

            QueueMessage::Retry { key, reply } => match state.requeue_failed(&key) {
                Some(item) => {
                    tracing::info!("Retrying {}", item.label());
                    state.persist().await;
                    state.broadcast_stats();
                    let _ = reply.send(Ok(item));
                }
                None => {
                    let _ = reply.send(Err(QueueError::ItemNotFound(key)));
                }
            },

            QueueMessage::RetryFailed { reply } => {
                let keys: Vec<ItemKey> = state.failed.iter().map(QueueItem::key).collect();
                let count = keys
                    .iter()
                    .filter(|key| state.requeue_failed(key).is_some())
                    .count();
                if count > 0 {
                    tracing::info!("Retrying {} failed items", count);
                    state.persist().await;
                    state.broadcast_stats();
                }
                let _ = reply.send(count);
            }

            QueueMessage::GetStatus { reply } => {
                let _ = reply.send(state.status());
            }

            QueueMessage::StepStarted {
                run_id,
                key,
                progress,
            } => {
                let Some(current) = state
                    .current
                    .as_mut()
                    .filter(|c| c.run_id == run_id && c.item.key() == key)
                else {
                    return Ok(());
                };
                tracing::debug!(
                    "{} [{}/{}] {}",
                    key,
                    progress.step_index + 1,
                    progress.total_steps,
                    progress.message
                );
                current.progress = Some(progress.clone());
                state.broadcast(QueueEvent::StepStarted {
                    run_id,
                    key,
                    progress,
                    timestamp: Utc::now(),
                });
            }

            QueueMessage::ItemFinished {
                run_id,
                key,
                outcome,
            } => {
                if state.record_outcome(run_id, key, outcome).await {
                    state.dispatch_next().await;
                }
            }
        }

        state.start_if_requested().await;
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let reason = match message {
            SupervisionEvent::ActorTerminated(_, _, reason) => {
                reason.unwrap_or_else(|| "stopped".to_string())
            }
            SupervisionEvent::ActorFailed(_, err) => err.to_string(),
            _ => return Ok(()),
        };
        tracing::warn!("Translation worker terminated: {}", reason);

        let in_flight = state
            .current
            .as_ref()
            .map(|c| (c.run_id, c.item.key(), c.progress.as_ref().map(|p| p.step)));
        state.respawn_worker(&myself).await?;

        if let Some((run_id, key, step)) = in_flight {
            let outcome = Err(DriverError::StepFailed {
                step: step.unwrap_or(Step::Init),
                message: format!("Translation worker stopped: {}", reason),
            });
            if state.record_outcome(run_id, key, outcome).await {
                state.dispatch_next().await;
            }
        }
        state.start_if_requested().await;
        Ok(())
    }
}
