#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::TranslationQueue;
use backend::{BackendFuture, StepRequest, StepResponse, TranslationBackend};
use futures_util::FutureExt;
use storage::{SnapshotStore, Storage};
use tokio::sync::broadcast;
use translation_core::{QueueConfig, QueueEvent, Step};

/// How the stub backend answers requests for one language.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed { chunks: i64 },
    FailAt { chunks: i64, step: Step, message: String },
}

/// Backend stand-in that answers from per-language scripts and records
/// every request it receives.
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<StepRequest>>,
    next_job: AtomicU64,
    delay: Duration,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::from_millis(20))
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            next_job: AtomicU64::new(100),
            delay,
        })
    }

    pub fn script(&self, language: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(language.to_string(), script);
    }

    pub fn requests(&self) -> Vec<StepRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `language/step` for every request, in arrival order.
    pub fn trace(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| format!("{}/{}", r.target_language, r.step))
            .collect()
    }

    fn respond(&self, request: &StepRequest) -> StepResponse {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.target_language)
            .cloned()
            .unwrap_or(Script::Succeed { chunks: 1 });

        let (chunks, fail) = match script {
            Script::Succeed { chunks } => (chunks, None),
            Script::FailAt {
                chunks,
                step,
                message,
            } => (chunks, Some((step, message))),
        };

        match fail {
            Some((step, message)) if step == request.step => StepResponse::failed(message),
            _ if request.step == Step::Init => {
                let job_id = self.next_job.fetch_add(1, Ordering::SeqCst) + 1;
                StepResponse::initialized(job_id, chunks)
            }
            _ => StepResponse::ok(),
        }
    }
}

impl TranslationBackend for ScriptedBackend {
    fn send_step(&self, request: StepRequest) -> BackendFuture {
        self.requests.lock().unwrap().push(request.clone());
        let response = self.respond(&request);
        let delay = self.delay;
        async move {
            tokio::time::sleep(delay).await;
            Ok(response)
        }
        .boxed()
    }
}

pub async fn spawn_queue(
    backend: &Arc<ScriptedBackend>,
    store: SnapshotStore,
) -> TranslationQueue {
    TranslationQueue::spawn(QueueConfig::default(), backend.clone(), store)
        .await
        .unwrap()
}

pub fn memory_store() -> SnapshotStore {
    SnapshotStore::new(Storage::memory())
}

/// Collect events until one matches `stop`, returning everything seen.
pub async fn events_until(
    rx: &mut broadcast::Receiver<QueueEvent>,
    stop: impl Fn(&QueueEvent) -> bool,
) -> Vec<QueueEvent> {
    let collect = async {
        let mut seen = Vec::new();
        loop {
            let event = rx.recv().await.unwrap();
            let done = stop(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("timed out waiting for queue event")
}

pub fn is_queue_completed(event: &QueueEvent) -> bool {
    matches!(event, QueueEvent::QueueCompleted { .. })
}
