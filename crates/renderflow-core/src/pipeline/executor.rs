//! The pipeline executor.
//!
//! Runs the declared steps strictly sequentially in dependency order. Per
//! run: structural validation happens before anything executes, transient
//! failures are retried with exponential backoff, the first terminal
//! failure halts everything downstream (fail-fast), completed steps whose
//! outputs still exist are carried forward untouched (idempotent resume),
//! and cancellation is honored between steps. Every attempted step leaves a
//! `StepResult` in the run record, which is written back into the plan
//! document and to an execution report on disk.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use renderflow_types::config::EngineConfig;
use renderflow_types::plan::PlanDocument;
use renderflow_types::workflow::{
    ErrorInfo, FailureKind, ProcessingWorkflow, RunFailure, RunStatus, StepId, StepResult,
    StepStatus, WorkflowState,
};

use crate::cache::{CacheBackend, ResponseCache};
use crate::env::RunEnvironment;
use crate::media::MediaService;
use crate::pipeline::graph::{execution_order, validate_entries, GraphError};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::step::PipelineStep;
use crate::pipeline::steps::{dependencies_of, StepRegistry};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Structural errors reported before any step executes. Step-level failures
/// are never errors here; they are recorded in the returned run record.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

/// Sequential scheduler over the typed step registry. Generic over the
/// media service and cache backend so tests can substitute both.
pub struct PipelineExecutor<M: MediaService, B: CacheBackend> {
    registry: StepRegistry<M, B>,
    retry: RetryPolicy,
}

impl<M: MediaService, B: CacheBackend> PipelineExecutor<M, B> {
    pub fn new(media: Arc<M>, cache: Arc<ResponseCache<B>>, config: &EngineConfig) -> Self {
        Self {
            registry: StepRegistry::new(media, cache, &config.timeline),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    /// Execute one pipeline run against the plan.
    ///
    /// Returns the run record; `Err` is reserved for structural
    /// configuration problems (cycles, duplicate or missing steps) detected
    /// before execution begins.
    pub async fn run(
        &self,
        plan: &mut PlanDocument,
        env: &RunEnvironment,
        cancel: &CancellationToken,
    ) -> Result<WorkflowState, PipelineError> {
        // An empty declaration means the full pipeline.
        let entries = if plan.processing_workflow.steps.is_empty() {
            ProcessingWorkflow::full_pipeline().steps
        } else {
            plan.processing_workflow.steps.clone()
        };
        validate_entries(&entries, dependencies_of)?;

        let declared: Vec<(StepId, &'static [StepId])> = entries
            .iter()
            .map(|e| (e.step, dependencies_of(e.step)))
            .collect();
        let order = execution_order(&declared)?;
        let optional: HashSet<StepId> = entries
            .iter()
            .filter(|e| e.optional)
            .map(|e| e.step)
            .collect();

        let previous = plan.processing_workflow.last_run.clone();
        let run_id = Uuid::now_v7();
        tracing::info!(run_id = %run_id, steps = order.len(), "starting pipeline run");

        let mut state = WorkflowState {
            run_id,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            steps: BTreeMap::new(),
            first_failure: None,
        };
        let mut halted: Option<RunFailure> = None;

        for step_id in order {
            let step_started = Utc::now();

            // Cancellation is checked between steps only; a running step is
            // an atomic unit.
            if cancel.is_cancelled() {
                let error = ErrorInfo {
                    kind: FailureKind::Cancelled,
                    message: "run cancelled".to_string(),
                };
                tracing::warn!(run_id = %run_id, step = %step_id, "skipping step: run cancelled");
                state
                    .steps
                    .insert(step_id, skipped_result(step_id, error.clone()));
                if halted.is_none() {
                    halted = Some(RunFailure { step: step_id, error });
                }
                continue;
            }

            // Fail-fast: downstream steps assume upstream outputs exist.
            if let Some(failure) = &halted {
                let error = ErrorInfo {
                    kind: FailureKind::DependencyFailed,
                    message: format!("upstream step '{}' failed", failure.step),
                };
                tracing::warn!(run_id = %run_id, step = %step_id, "skipping step: upstream failure");
                state.steps.insert(step_id, skipped_result(step_id, error));
                continue;
            }

            let Some(step) = self.registry.get(step_id) else {
                // Unreachable with the sealed registry; recorded rather than
                // panicking so a run record always exists.
                let error = ErrorInfo {
                    kind: FailureKind::Execution,
                    message: format!("step '{step_id}' is not registered"),
                };
                state
                    .steps
                    .insert(step_id, skipped_result(step_id, error.clone()));
                halted = Some(RunFailure { step: step_id, error });
                continue;
            };

            // Idempotent resume: a completed step whose recorded outputs are
            // all still on disk is carried forward untouched.
            if let Some(prev) = previous.as_ref().and_then(|p| p.step_result(step_id)) {
                if prev.is_successful() {
                    if outputs_exist(prev) {
                        tracing::info!(
                            run_id = %run_id,
                            step = %step_id,
                            "skipping completed step, outputs present"
                        );
                        let mut carried = prev.clone();
                        carried.metadata.insert("resumed".to_string(), json!(true));
                        state.steps.insert(step_id, carried);
                        continue;
                    }
                    tracing::info!(
                        run_id = %run_id,
                        step = %step_id,
                        "completed step is missing outputs, re-executing"
                    );
                }
            }

            if !step.validate_inputs(plan) {
                let error = ErrorInfo {
                    kind: FailureKind::Validation,
                    message: "input validation failed".to_string(),
                };
                state
                    .steps
                    .insert(step_id, skipped_result(step_id, error.clone()));
                if optional.contains(&step_id) {
                    tracing::warn!(run_id = %run_id, step = %step_id, "optional step skipped: validation failed");
                } else {
                    tracing::error!(run_id = %run_id, step = %step_id, "step validation failed");
                    halted = Some(RunFailure { step: step_id, error });
                }
                continue;
            }

            // Execute with bounded, strictly sequential retries.
            tracing::info!(run_id = %run_id, step = %step_id, "executing step");
            let mut attempt = 1u32;
            loop {
                match step.execute(plan, env).await {
                    Ok(outcome) => {
                        tracing::info!(
                            run_id = %run_id,
                            step = %step_id,
                            attempts = attempt,
                            outputs = outcome.output_files.len(),
                            "step completed"
                        );
                        state.steps.insert(
                            step_id,
                            StepResult {
                                step: step_id,
                                status: StepStatus::Completed,
                                attempts: attempt,
                                started_at: step_started,
                                finished_at: Some(Utc::now()),
                                output_files: outcome.output_files,
                                error: None,
                                metadata: outcome.metadata,
                            },
                        );
                        break;
                    }
                    Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                        let delay = self.retry.delay_after(attempt);
                        tracing::warn!(
                            run_id = %run_id,
                            step = %step_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "transient step failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => {
                        let kind = if err.is_retryable() {
                            FailureKind::RetriesExhausted
                        } else {
                            FailureKind::Execution
                        };
                        let error = ErrorInfo {
                            kind,
                            message: err.cause().to_string(),
                        };
                        tracing::error!(
                            run_id = %run_id,
                            step = %step_id,
                            attempts = attempt,
                            error = %err,
                            "step failed"
                        );
                        state.steps.insert(
                            step_id,
                            StepResult {
                                step: step_id,
                                status: StepStatus::Failed,
                                attempts: attempt,
                                started_at: step_started,
                                finished_at: Some(Utc::now()),
                                output_files: vec![],
                                error: Some(error.clone()),
                                metadata: Default::default(),
                            },
                        );
                        halted = Some(RunFailure { step: step_id, error });
                        break;
                    }
                }
            }
        }

        state.finished_at = Some(Utc::now());
        state.status = if halted.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        state.first_failure = halted;

        plan.processing_workflow.last_run = Some(state.clone());
        if let Err(err) = save_run_report(&state, env) {
            tracing::warn!(run_id = %run_id, error = %err, "failed to save execution report");
        }

        tracing::info!(run_id = %run_id, status = ?state.status, "pipeline run finished");
        Ok(state)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn skipped_result(step: StepId, error: ErrorInfo) -> StepResult {
    let now = Utc::now();
    StepResult {
        step,
        status: StepStatus::Skipped,
        attempts: 0,
        started_at: now,
        finished_at: Some(now),
        output_files: vec![],
        error: Some(error),
        metadata: Default::default(),
    }
}

fn outputs_exist(result: &StepResult) -> bool {
    result.output_files.iter().all(|path| path.exists())
}

/// Persist the run record as `execution_report.json` in the run's output
/// directory. Best-effort; the caller logs failures.
pub fn save_run_report(state: &WorkflowState, env: &RunEnvironment) -> std::io::Result<PathBuf> {
    let path = env.report_path();
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(&path, json)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
