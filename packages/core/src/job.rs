//! Backend job types: the step grammar and per-item execution state.

use serde::{Deserialize, Serialize};

/// One bounded unit of backend work within a translation job.
///
/// Serialized as the wire name the backend expects (`init`, `title`,
/// `content_0`, ..., `excerpt`, `finalize`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Step {
    Init,
    Title,
    Content(u32),
    Excerpt,
    Finalize,
}

impl Step {
    /// Build the full step sequence for a job with `chunk_count` content chunks.
    pub fn plan(chunk_count: u32) -> Vec<Step> {
        let mut steps = Vec::with_capacity(chunk_count as usize + 4);
        steps.push(Step::Init);
        steps.push(Step::Title);
        steps.extend((0..chunk_count).map(Step::Content));
        steps.push(Step::Excerpt);
        steps.push(Step::Finalize);
        steps
    }

    /// Human-readable label shown while the step runs.
    pub fn label(&self) -> String {
        match self {
            Step::Init => "Initializing translation".to_string(),
            Step::Title => "Translating title".to_string(),
            Step::Content(index) => format!("Translating content (part {})", index + 1),
            Step::Excerpt => "Translating excerpt".to_string(),
            Step::Finalize => "Finalizing translation".to_string(),
        }
    }

    pub fn is_init(&self) -> bool {
        matches!(self, Step::Init)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Init => write!(f, "init"),
            Step::Title => write!(f, "title"),
            Step::Content(index) => write!(f, "content_{}", index),
            Step::Excerpt => write!(f, "excerpt"),
            Step::Finalize => write!(f, "finalize"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown step: {0}")]
pub struct StepParseError(pub String);

impl std::str::FromStr for Step {
    type Err = StepParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Step::Init),
            "title" => Ok(Step::Title),
            "excerpt" => Ok(Step::Excerpt),
            "finalize" => Ok(Step::Finalize),
            other => other
                .strip_prefix("content_")
                .and_then(|n| n.parse::<u32>().ok())
                .map(Step::Content)
                .ok_or_else(|| StepParseError(other.to_string())),
        }
    }
}

impl TryFrom<String> for Step {
    type Error = StepParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Step> for String {
    fn from(step: Step) -> Self {
        step.to_string()
    }
}

/// Progress report emitted before each step request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    pub step: Step,
    pub step_index: usize,
    pub total_steps: usize,
    pub message: String,
}

/// Execution state of one item's backend job.
///
/// Until `init` succeeds the only known step is `init`. The full sequence is
/// materialized once from the `init` response and is fixed afterwards; the
/// cursor only moves forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobState {
    job_id: u64,
    steps: Vec<Step>,
    step_index: usize,
    materialized: bool,
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

impl JobState {
    pub fn new() -> Self {
        Self {
            job_id: 0,
            steps: vec![Step::Init],
            step_index: 0,
            materialized: false,
        }
    }

    /// Backend job handle, `0` before `init`.
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// The step to run next, `None` once every step has succeeded.
    pub fn current_step(&self) -> Option<Step> {
        self.steps.get(self.step_index).copied()
    }

    /// Progress report for the step about to run.
    pub fn progress(&self) -> Option<StepProgress> {
        self.current_step().map(|step| StepProgress {
            step,
            step_index: self.step_index,
            total_steps: self.steps.len(),
            message: step.label(),
        })
    }

    /// Record the `init` response. Returns `false` (and changes nothing) if
    /// the plan was already materialized.
    pub fn materialize(&mut self, job_id: u64, chunk_count: u32) -> bool {
        if self.materialized {
            return false;
        }
        self.job_id = job_id;
        self.steps = Step::plan(chunk_count);
        self.materialized = true;
        true
    }

    /// Move past the current step after it succeeded.
    pub fn advance(&mut self) {
        if self.step_index < self.steps.len() {
            self.step_index += 1;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.materialized && self.step_index == self.steps.len()
    }
}
