//! Step 3: recalculate the timeline from measured audio durations.
//!
//! Runs the pure reconciler over the narration script, then propagates the
//! new total through the plan: the meta target duration, proportional scene
//! durations, and composition layers/transitions clamped to the new end.
//! Drift beyond tolerance is surfaced as a warning, never a failure.

use std::collections::BTreeMap;

use serde_json::json;

use renderflow_types::plan::{
    CompositionTimeline, LayerKind, PlanDocument, TextToVideoPlan, VideoComposition,
};
use renderflow_types::workflow::StepId;

use crate::env::RunEnvironment;
use crate::pipeline::step::{PipelineStep, StepError, StepOutcome};
use crate::timeline::{entries_from_script, reconcile};

// ---------------------------------------------------------------------------
// RecalculateTimelineStep
// ---------------------------------------------------------------------------

pub struct RecalculateTimelineStep {
    drift_tolerance_secs: f64,
}

impl RecalculateTimelineStep {
    pub fn new(drift_tolerance_secs: f64) -> Self {
        Self { drift_tolerance_secs }
    }
}

impl PipelineStep for RecalculateTimelineStep {
    fn id(&self) -> StepId {
        StepId::RecalculateTimeline
    }

    fn dependencies(&self) -> &'static [StepId] {
        super::dependencies_of(StepId::RecalculateTimeline)
    }

    fn validate_inputs(&self, plan: &PlanDocument) -> bool {
        let segments = &plan.narration_script.segments;
        !segments.is_empty() && segments.iter().any(|s| s.actual_duration.is_some())
    }

    async fn execute(
        &self,
        plan: &mut PlanDocument,
        _env: &RunEnvironment,
    ) -> Result<StepOutcome, StepError> {
        let planned = entries_from_script(&plan.narration_script);
        let actual: BTreeMap<String, f64> = plan
            .narration_script
            .segments
            .iter()
            .filter_map(|s| s.actual_duration.map(|d| (s.id.clone(), d)))
            .collect();

        let result = reconcile(&planned, &actual, self.drift_tolerance_secs);

        let original_duration = plan.meta_info.target_duration;
        plan.meta_info.target_duration = result.total_duration;

        rescale_scenes(&mut plan.text_to_video_plan, result.total_duration);
        clamp_composition(&mut plan.video_composition, result.total_duration);
        plan.video_composition.timeline = CompositionTimeline {
            total_duration: result.total_duration,
            entries: result.entries,
        };

        tracing::info!(
            original = original_duration,
            reconciled = result.total_duration,
            "timeline recalculated"
        );

        let mut outcome = StepOutcome::new()
            .with_metadata("original_duration", json!(original_duration))
            .with_metadata("new_duration", json!(result.total_duration))
            .with_metadata(
                "duration_change",
                json!(result.total_duration - original_duration),
            )
            .with_metadata("segments", json!(plan.narration_script.segments.len()));

        if let Some(warning) = &result.warning {
            tracing::warn!(drift = warning.drift, "{warning}");
            outcome = outcome.with_metadata(
                "drift_warning",
                serde_json::to_value(warning).unwrap_or(json!(warning.to_string())),
            );
        }

        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Scene rescaling
// ---------------------------------------------------------------------------

/// Redistribute scene durations over the reconciled total: a single scene
/// takes the whole timeline; several keep their original proportions, or
/// split evenly when no original durations exist.
fn rescale_scenes(scenes: &mut TextToVideoPlan, total: f64) {
    let segments = &mut scenes.segments;
    match segments.len() {
        0 => {}
        1 => {
            segments[0].duration = total;
            segments[0].start_time = 0.0;
        }
        n => {
            let original_total: f64 = segments.iter().map(|s| s.duration.max(0.0)).sum();
            let mut cursor = 0.0;
            if original_total > 0.0 {
                for segment in segments.iter_mut() {
                    let ratio = segment.duration.max(0.0) / original_total;
                    segment.duration = total * ratio;
                    segment.start_time = cursor;
                    cursor += segment.duration;
                }
            } else {
                let share = total / n as f64;
                for segment in segments.iter_mut() {
                    segment.duration = share;
                    segment.start_time = cursor;
                    cursor += share;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Composition clamping
// ---------------------------------------------------------------------------

/// Fit existing layers and transitions to the reconciled total. Audio
/// layers stretch to the full timeline; visual layers are cut at the new
/// end; transitions that fall entirely past the end are dropped.
fn clamp_composition(composition: &mut VideoComposition, total: f64) {
    for layer in &mut composition.layers {
        match layer.kind {
            LayerKind::Audio => {
                if layer.duration == 0.0 || layer.duration > total {
                    layer.duration = total;
                }
            }
            LayerKind::Video | LayerKind::Image => {
                if layer.duration == 0.0 || layer.end_time() > total {
                    layer.duration = (total - layer.start_time).max(0.0);
                }
            }
        }
    }

    for transition in &mut composition.transitions {
        if transition.start_time + transition.duration > total {
            transition.duration = (total - transition.start_time).max(0.0);
        }
    }
    composition.transitions.retain(|t| t.duration > 0.0);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
