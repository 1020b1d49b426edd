//! Workflow execution tracking types.
//!
//! The five pipeline steps are a closed set, so the step identifier is a
//! typed enum rather than a name string: unknown steps are unrepresentable
//! after deserialization, and the registry needs no runtime string dispatch.
//! `StepResult`/`WorkflowState` form the externally observable audit trail
//! of a run and are written back into the plan document for persistence
//! between runs.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Step identity
// ---------------------------------------------------------------------------

/// Identifier of a pipeline step. Variant order is pipeline declaration
/// order and defines the tie-break for scheduling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    CutImages,
    SynthesizeAudio,
    RecalculateTimeline,
    GenerateScenes,
    ComposeVideo,
}

impl StepId {
    /// All steps in declaration order.
    pub const ALL: [StepId; 5] = [
        StepId::CutImages,
        StepId::SynthesizeAudio,
        StepId::RecalculateTimeline,
        StepId::GenerateScenes,
        StepId::ComposeVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::CutImages => "cut_images",
            StepId::SynthesizeAudio => "synthesize_audio",
            StepId::RecalculateTimeline => "recalculate_timeline",
            StepId::GenerateScenes => "generate_scenes",
            StepId::ComposeVideo => "compose_video",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Status of an individual step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Terminal states are `Completed`, `Failed`, and `Skipped`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// Overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
}

/// Why a step (and thereby the run) failed or was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Step preconditions unmet; not retried.
    Validation,
    /// Unrecoverable step failure.
    Execution,
    /// Transient failures exhausted the retry budget.
    RetriesExhausted,
    /// The run was cancelled before this step could execute.
    Cancelled,
    /// An upstream step failed, so this step never ran.
    DependencyFailed,
}

/// Error detail recorded on a failed or skipped step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: FailureKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

/// Record of one step's execution within a run.
///
/// Created by the scheduler when the step is first considered; step logic
/// never mutates it after it has been returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepId,
    pub status: StepStatus,
    /// Number of execution attempts (0 for skipped steps).
    #[serde(default)]
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_files: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StepResult {
    pub fn is_successful(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Wall-clock duration, when the step has finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// The run record: per-step results keyed by step, ordered by pipeline
/// position. One `WorkflowState` exists per run; it is persisted into the
/// plan document so a later invocation can resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: BTreeMap<StepId, StepResult>,
    /// The first failing step and its error, when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<RunFailure>,
}

/// The step at which a run failed, with error detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub step: StepId,
    pub error: ErrorInfo,
}

impl WorkflowState {
    /// Step IDs that completed successfully.
    pub fn completed_steps(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|(_, r)| r.is_successful())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn step_result(&self, step: StepId) -> Option<&StepResult> {
        self.steps.get(&step)
    }
}

// ---------------------------------------------------------------------------
// ProcessingWorkflow (persisted in the plan document)
// ---------------------------------------------------------------------------

/// One declared step in the plan's `processing_workflow.steps` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPlanEntry {
    pub step: StepId,
    /// Optional steps may fail input validation without failing the run.
    #[serde(default)]
    pub optional: bool,
}

/// The `processing_workflow` section of the plan document. The scheduler
/// reads `steps` for the declared pipeline and writes the run record back
/// into `last_run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingWorkflow {
    #[serde(default)]
    pub steps: Vec<StepPlanEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<WorkflowState>,
}

impl ProcessingWorkflow {
    /// A workflow entry list covering all five steps, none optional.
    pub fn full_pipeline() -> Self {
        Self {
            steps: StepId::ALL
                .iter()
                .map(|&step| StepPlanEntry { step, optional: false })
                .collect(),
            last_run: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
