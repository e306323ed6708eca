//! Client side of the chunked translation protocol.
//!
//! The backend translates one step of a job per request. This crate holds the
//! wire types, the [`TranslationBackend`] trait the job driver talks to, and
//! the HTTP implementation used in production.

mod http;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use translation_core::{QueueItem, Step};

pub use http::{BackendConfig, HttpBackend};

/// Errors raised while talking to the backend.
///
/// Application-level failures (`success: false`) are not errors here; they
/// come back as a [`StepResponse`] and are judged by the caller.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The detail is kept for logs; the message stays generic.
    #[error("Network error")]
    Transport(String),

    #[error("Request failed with status {0}")]
    Status(u16),

    #[error("Invalid response from server: {0}")]
    Decode(String),

    #[error("invalid backend config: {0}")]
    InvalidConfig(String),
}

/// Body of one step request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRequest {
    pub source_post_id: u64,
    pub target_language: String,
    /// `0` asks the backend to create a new translation.
    pub target_post_id: u64,
    pub step: Step,
    /// `0` until `init` has assigned a job.
    pub job_id: u64,
}

impl StepRequest {
    pub fn for_item(item: &QueueItem, step: Step, job_id: u64) -> Self {
        Self {
            source_post_id: item.source_content_id,
            target_language: item.language.clone(),
            target_post_id: item.target_content_id,
            step,
            job_id,
        }
    }
}

/// Body of one step response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResponse {
    pub success: bool,
    /// Present on a successful `init`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<u64>,
    /// Present on a successful `init`. Signed so a negative count is
    /// reported as a protocol error rather than a decode error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<i64>,
    /// Present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn initialized(job_id: u64, chunk_count: i64) -> Self {
        Self {
            success: true,
            job_id: Some(job_id),
            chunk_count: Some(chunk_count),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Future type for async step calls.
pub type BackendFuture = BoxFuture<'static, Result<StepResponse, BackendError>>;

/// Something that can execute one protocol step.
///
/// Implement this trait to point the job driver at a different transport.
pub trait TranslationBackend: Send + Sync + 'static {
    /// Send a single step request and wait for its response.
    fn send_step(&self, request: StepRequest) -> BackendFuture;
}

/// A simple function-based backend.
pub struct FnBackend<F>
where
    F: Fn(StepRequest) -> BackendFuture + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnBackend<F>
where
    F: Fn(StepRequest) -> BackendFuture + Send + Sync + 'static,
{
    /// Create a new function-based backend.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> TranslationBackend for FnBackend<F>
where
    F: Fn(StepRequest) -> BackendFuture + Send + Sync + 'static,
{
    fn send_step(&self, request: StepRequest) -> BackendFuture {
        (self.handler)(request)
    }
}
