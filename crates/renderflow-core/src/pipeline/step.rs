//! The step contract.
//!
//! Each of the five pipeline steps implements [`PipelineStep`]: it declares
//! its static dependencies, can cheaply check whether the plan carries what
//! it needs, and executes against the mutable plan. Steps return a
//! [`StepOutcome`]; the scheduler owns turning that into the run record's
//! `StepResult`.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use renderflow_types::plan::PlanDocument;
use renderflow_types::workflow::StepId;

use crate::env::RunEnvironment;
use crate::media::MediaError;

// ---------------------------------------------------------------------------
// StepOutcome
// ---------------------------------------------------------------------------

/// What a successful step execution produced.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Artifacts written by the step, recorded for resume checks.
    pub output_files: Vec<PathBuf>,
    /// Step-specific detail surfaced in the run record.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StepOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.output_files.push(path);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Failure of a step execution.
///
/// `Retryable` covers conditions the scheduler should retry with backoff
/// (timeouts, rate limits, transient I/O); `Execution` halts the run.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step '{step}' hit a transient failure: {cause}")]
    Retryable { step: StepId, cause: String },

    #[error("step '{step}' failed: {cause}")]
    Execution { step: StepId, cause: String },
}

impl StepError {
    pub fn retryable(step: StepId, cause: impl Into<String>) -> Self {
        StepError::Retryable { step, cause: cause.into() }
    }

    pub fn execution(step: StepId, cause: impl Into<String>) -> Self {
        StepError::Execution { step, cause: cause.into() }
    }

    /// Classify a media-service failure: transient errors stay retryable.
    pub fn from_media(step: StepId, err: MediaError) -> Self {
        if err.is_transient() {
            StepError::Retryable { step, cause: err.to_string() }
        } else {
            StepError::Execution { step, cause: err.to_string() }
        }
    }

    pub fn step(&self) -> StepId {
        match self {
            StepError::Retryable { step, .. } | StepError::Execution { step, .. } => *step,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Retryable { .. })
    }

    pub fn cause(&self) -> &str {
        match self {
            StepError::Retryable { cause, .. } | StepError::Execution { cause, .. } => cause,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineStep trait
// ---------------------------------------------------------------------------

/// One unit of the five-stage pipeline.
pub trait PipelineStep {
    fn id(&self) -> StepId;

    /// Static dependency declaration; must be acyclic across all steps.
    fn dependencies(&self) -> &'static [StepId];

    /// Whether the plan carries everything this step needs. Returns false
    /// rather than erroring; the scheduler treats false as a validation
    /// failure, not an execution failure.
    fn validate_inputs(&self, plan: &PlanDocument) -> bool;

    /// Perform the work, mutating the plan in place.
    fn execute(
        &self,
        plan: &mut PlanDocument,
        env: &RunEnvironment,
    ) -> impl std::future::Future<Output = Result<StepOutcome, StepError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
