//! Chunked job driver: runs one item through the backend step protocol.

use std::sync::Arc;

use backend::{StepRequest, StepResponse, TranslationBackend};
use tokio_util::sync::CancellationToken;
use translation_core::{JobState, QueueItem, Step, StepProgress};

/// Why a job stopped before `finalize` succeeded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// The operator cancelled the run; `step` was never sent.
    #[error("Cancelled")]
    Cancelled { step: Step },

    /// The backend could not be reached or rejected the step.
    #[error("{message}")]
    StepFailed { step: Step, message: String },

    /// The `init` response broke the protocol contract.
    #[error("{message}")]
    Protocol { step: Step, message: String },
}

impl DriverError {
    /// The step the job stopped at.
    pub fn step(&self) -> Step {
        match self {
            DriverError::Cancelled { step }
            | DriverError::StepFailed { step, .. }
            | DriverError::Protocol { step, .. } => *step,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DriverError::Cancelled { .. })
    }
}

/// Summary of a job that ran every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: u64,
    pub steps: usize,
}

/// Executes the fixed step sequence for one item, one request at a time.
#[derive(Clone)]
pub struct ChunkedJobDriver {
    backend: Arc<dyn TranslationBackend>,
    max_chunk_count: u32,
}

impl std::fmt::Debug for ChunkedJobDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedJobDriver")
            .field("max_chunk_count", &self.max_chunk_count)
            .finish_non_exhaustive()
    }
}

impl ChunkedJobDriver {
    pub fn new(backend: Arc<dyn TranslationBackend>, max_chunk_count: u32) -> Self {
        Self {
            backend,
            max_chunk_count,
        }
    }

    /// Run every step for `item`.
    ///
    /// `on_step` is called before each request is sent. Cancellation is only
    /// observed between steps; a request already in flight always completes.
    /// Each call starts a fresh backend job.
    pub async fn run<F>(
        &self,
        item: &QueueItem,
        cancel: &CancellationToken,
        mut on_step: F,
    ) -> Result<JobReport, DriverError>
    where
        F: FnMut(&StepProgress),
    {
        let mut job = JobState::new();

        while let Some(progress) = job.progress() {
            let step = progress.step;

            if cancel.is_cancelled() {
                tracing::info!("Cancelling {} before step {}", item.label(), step);
                return Err(DriverError::Cancelled { step });
            }

            on_step(&progress);

            let request = StepRequest::for_item(item, step, job.job_id());
            let response = self
                .backend
                .send_step(request)
                .await
                .map_err(|e| DriverError::StepFailed {
                    step,
                    message: e.to_string(),
                })?;

            if !response.success {
                let message = response
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string());
                return Err(DriverError::StepFailed { step, message });
            }

            if step.is_init() {
                let (job_id, chunk_count) = self.check_init(&response)?;
                tracing::debug!(
                    "Job {} for {} has {} content chunks",
                    job_id,
                    item.label(),
                    chunk_count
                );
                job.materialize(job_id, chunk_count);
            }

            tracing::debug!(
                "{} step {} done ({}/{})",
                item.label(),
                step,
                job.step_index() + 1,
                job.total_steps()
            );
            job.advance();
        }

        Ok(JobReport {
            job_id: job.job_id(),
            steps: job.total_steps(),
        })
    }

    fn check_init(&self, response: &StepResponse) -> Result<(u64, u32), DriverError> {
        let protocol = |message: String| DriverError::Protocol {
            step: Step::Init,
            message,
        };

        let job_id = response
            .job_id
            .filter(|id| *id > 0)
            .ok_or_else(|| protocol("Backend did not return a job id".to_string()))?;

        let chunk_count = response
            .chunk_count
            .ok_or_else(|| protocol("Backend did not return a chunk count".to_string()))?;

        let chunk_count = u32::try_from(chunk_count)
            .ok()
            .filter(|count| *count <= self.max_chunk_count)
            .ok_or_else(|| {
                protocol(format!(
                    "Backend returned an invalid chunk count: {} (max {})",
                    chunk_count, self.max_chunk_count
                ))
            })?;

        Ok((job_id, chunk_count))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use backend::{BackendError, FnBackend};
    use futures_util::FutureExt;

    fn driver_with(
        respond: impl Fn(&StepRequest) -> Result<StepResponse, BackendError> + Send + Sync + 'static,
    ) -> ChunkedJobDriver {
        let backend = FnBackend::new(move |request: StepRequest| {
            let response = respond(&request);
            async move { response }.boxed()
        });
        ChunkedJobDriver::new(Arc::new(backend), 10)
    }

    #[tokio::test]
    async fn runs_every_step_in_order() {
        let driver = driver_with(|request| {
            Ok(match request.step {
                Step::Init => StepResponse::initialized(8, 2),
                _ => StepResponse::ok(),
            })
        });

        let mut seen = Vec::new();
        let report = driver
            .run(&QueueItem::new(1, "es"), &CancellationToken::new(), |p| {
                seen.push((p.step.to_string(), p.step_index, p.total_steps))
            })
            .await;

        assert_eq!(report, Ok(JobReport { job_id: 8, steps: 6 }));
        assert_eq!(
            seen,
            [
                ("init".to_string(), 0, 1),
                ("title".to_string(), 1, 6),
                ("content_0".to_string(), 2, 6),
                ("content_1".to_string(), 3, 6),
                ("excerpt".to_string(), 4, 6),
                ("finalize".to_string(), 5, 6),
            ]
        );
    }

    #[tokio::test]
    async fn rejects_oversized_chunk_count() {
        let driver = driver_with(|_| Ok(StepResponse::initialized(8, 11)));
        let result = driver
            .run(&QueueItem::new(1, "es"), &CancellationToken::new(), |_| {})
            .await;
        assert!(matches!(result, Err(DriverError::Protocol { step: Step::Init, .. })));
    }

    #[tokio::test]
    async fn rejects_negative_chunk_count_and_missing_job_id() {
        let negative = driver_with(|_| Ok(StepResponse::initialized(8, -1)));
        let result = negative
            .run(&QueueItem::new(1, "es"), &CancellationToken::new(), |_| {})
            .await;
        assert!(matches!(result, Err(DriverError::Protocol { .. })));

        let no_job = driver_with(|_| {
            Ok(StepResponse {
                success: true,
                chunk_count: Some(1),
                ..StepResponse::default()
            })
        });
        let result = no_job
            .run(&QueueItem::new(1, "es"), &CancellationToken::new(), |_| {})
            .await;
        assert_eq!(
            result.map_err(|e| e.to_string()),
            Err("Backend did not return a job id".to_string())
        );
    }

    #[tokio::test]
    async fn missing_failure_message_becomes_unknown_error() {
        let driver = driver_with(|_| Ok(StepResponse::default()));
        let result = driver
            .run(&QueueItem::new(1, "es"), &CancellationToken::new(), |_| {})
            .await;
        assert_eq!(
            result,
            Err(DriverError::StepFailed {
                step: Step::Init,
                message: "Unknown error".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn transport_error_is_a_step_failure() {
        let driver = driver_with(|request| match request.step {
            Step::Init => Ok(StepResponse::initialized(8, 0)),
            _ => Err(BackendError::Status(503)),
        });
        let result = driver
            .run(&QueueItem::new(1, "es"), &CancellationToken::new(), |_| {})
            .await;
        assert_eq!(
            result,
            Err(DriverError::StepFailed {
                step: Step::Title,
                message: "Request failed with status 503".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn cancelled_token_sends_nothing() {
        let driver = driver_with(|_| panic!("no request expected"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut progress_calls = 0;
        let result = driver
            .run(&QueueItem::new(1, "es"), &cancel, |_| progress_calls += 1)
            .await;
        assert_eq!(result, Err(DriverError::Cancelled { step: Step::Init }));
        assert_eq!(progress_calls, 0);
    }

    #[tokio::test]
    async fn cancellation_is_observed_between_steps() {
        let cancel = CancellationToken::new();
        let trip = cancel.clone();
        let driver = driver_with(move |request| {
            if request.step == Step::Title {
                trip.cancel();
            }
            Ok(match request.step {
                Step::Init => StepResponse::initialized(8, 3),
                _ => StepResponse::ok(),
            })
        });

        let result = driver.run(&QueueItem::new(1, "es"), &cancel, |_| {}).await;
        let err = result.expect_err("job should be cancelled");
        assert!(err.is_cancelled());
        assert_eq!(err.step(), Step::Content(0));
    }
}
