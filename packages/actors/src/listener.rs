//! Typed callbacks over the queue's event stream.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use translation_core::{
    ItemKey, QueueEvent, QueueItem, QueueStats, QueueSummary, RunId, RunState, Step,
    StepProgress,
};

/// Receives queue events. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait QueueListener: Send + 'static {
    fn on_stats(&mut self, stats: &QueueStats) {}

    fn on_state_changed(&mut self, old_state: RunState, new_state: RunState) {}

    fn on_item_started(&mut self, run_id: RunId, item: &QueueItem) {}

    fn on_step(&mut self, run_id: RunId, key: &ItemKey, progress: &StepProgress) {}

    fn on_item_completed(&mut self, run_id: RunId, item: &QueueItem, duration_ms: u64) {}

    fn on_item_failed(&mut self, run_id: RunId, item: &QueueItem, step: Option<Step>, error: &str) {
    }

    fn on_item_cancelled(&mut self, run_id: RunId, item: &QueueItem) {}

    fn on_queue_completed(&mut self, run_id: RunId, summary: &QueueSummary, at: DateTime<Utc>) {}

    /// Called when the listener fell behind and `missed` events were dropped.
    fn on_lagged(&mut self, missed: u64) {}
}

/// Route one event to the matching listener method.
pub fn dispatch<L: QueueListener + ?Sized>(listener: &mut L, event: &QueueEvent) {
    match event {
        QueueEvent::StatsUpdated { stats, .. } => listener.on_stats(stats),
        QueueEvent::StateChanged {
            old_state,
            new_state,
            ..
        } => listener.on_state_changed(*old_state, *new_state),
        QueueEvent::ItemStarted { run_id, item, .. } => listener.on_item_started(*run_id, item),
        QueueEvent::StepStarted {
            run_id,
            key,
            progress,
            ..
        } => listener.on_step(*run_id, key, progress),
        QueueEvent::ItemCompleted {
            run_id,
            item,
            duration_ms,
            ..
        } => listener.on_item_completed(*run_id, item, *duration_ms),
        QueueEvent::ItemFailed {
            run_id,
            item,
            step,
            error,
            ..
        } => listener.on_item_failed(*run_id, item, *step, error),
        QueueEvent::ItemCancelled { run_id, item, .. } => {
            listener.on_item_cancelled(*run_id, item)
        }
        QueueEvent::QueueCompleted {
            run_id,
            summary,
            timestamp,
        } => listener.on_queue_completed(*run_id, summary, *timestamp),
    }
}

/// Drive `listener` from `events` until the queue goes away, then hand the
/// listener back.
pub fn spawn_listener<L: QueueListener>(
    mut events: broadcast::Receiver<QueueEvent>,
    mut listener: L,
) -> JoinHandle<L> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => dispatch(&mut listener, &event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Queue listener lagged, {} events dropped", missed);
                    listener.on_lagged(missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
        listener
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl QueueListener for Recorder {
        fn on_item_failed(
            &mut self,
            _run_id: RunId,
            item: &QueueItem,
            step: Option<Step>,
            error: &str,
        ) {
            self.calls
                .push(format!("failed {} {:?} {}", item.key(), step, error));
        }

        fn on_queue_completed(&mut self, _run_id: RunId, summary: &QueueSummary, _at: DateTime<Utc>) {
            self.calls.push(format!(
                "done {}/{} cancelled={}",
                summary.completed, summary.failed, summary.cancelled
            ));
        }
    }

    #[tokio::test]
    async fn routes_events_and_returns_listener_on_close() -> Result<(), tokio::task::JoinError> {
        let (tx, rx) = broadcast::channel(16);
        let handle = spawn_listener(rx, Recorder::default());

        let run_id = RunId::new();
        let _ = tx.send(QueueEvent::ItemFailed {
            run_id,
            item: QueueItem::new(3, "fr"),
            step: Some(Step::Title),
            error: "Rate limited".to_string(),
            timestamp: Utc::now(),
        });
        let _ = tx.send(QueueEvent::StateChanged {
            old_state: RunState::Running,
            new_state: RunState::Idle,
            timestamp: Utc::now(),
        });
        let _ = tx.send(QueueEvent::QueueCompleted {
            run_id,
            summary: QueueSummary {
                completed: 0,
                failed: 1,
                cancelled: false,
            },
            timestamp: Utc::now(),
        });
        drop(tx);

        let recorder = handle.await?;
        assert_eq!(
            recorder.calls,
            [
                "failed 3:fr Some(Title) Rate limited".to_string(),
                "done 0/1 cancelled=false".to_string(),
            ]
        );
        Ok(())
    }
}
