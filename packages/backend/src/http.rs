//! HTTP implementation of [`TranslationBackend`].

use futures_util::FutureExt;
use reqwest::Client;

use crate::{BackendError, BackendFuture, StepRequest, StepResponse, TranslationBackend};

/// Header carrying the pre-issued session nonce.
const NONCE_HEADER: &str = "X-WP-Nonce";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// URL every step is POSTed to.
    pub endpoint: String,
    /// Session nonce forwarded with each request, if the host requires one.
    pub nonce: Option<String>,
}

impl BackendConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            nonce: None,
        }
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `TRANSLATE_ENDPOINT` (required)
    /// - `TRANSLATE_NONCE` (optional)
    pub fn from_env() -> Result<Self, BackendError> {
        let endpoint = std::env::var("TRANSLATE_ENDPOINT")
            .ok()
            .and_then(non_empty)
            .ok_or_else(|| BackendError::InvalidConfig("TRANSLATE_ENDPOINT is required".into()))?;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(BackendError::InvalidConfig(format!(
                "TRANSLATE_ENDPOINT must be an http(s) URL, got {endpoint}"
            )));
        }

        Ok(Self {
            endpoint,
            nonce: std::env::var("TRANSLATE_NONCE").ok().and_then(non_empty),
        })
    }
}

/// Sends steps as JSON POST requests to a single endpoint.
///
/// No client-side timeout is applied; the backend enforces its own
/// per-request budget.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

impl TranslationBackend for HttpBackend {
    fn send_step(&self, request: StepRequest) -> BackendFuture {
        let http = self.http.clone();
        let endpoint = self.config.endpoint.clone();
        let nonce = self.config.nonce.clone();

        async move {
            tracing::debug!(
                "POST {} step={} job_id={}",
                endpoint,
                request.step,
                request.job_id
            );

            let mut builder = http.post(&endpoint).json(&request);
            if let Some(nonce) = nonce {
                builder = builder.header(NONCE_HEADER, nonce);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| {
                    tracing::debug!("Request to {} failed: {}", endpoint, e);
                    BackendError::Transport(e.to_string())
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(BackendError::Status(status.as_u16()));
            }

            response
                .json::<StepResponse>()
                .await
                .map_err(|e| BackendError::Decode(e.to_string()))
        }
        .boxed()
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
