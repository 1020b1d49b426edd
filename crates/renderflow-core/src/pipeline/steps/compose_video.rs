//! Step 5: compose the final video.
//!
//! Collects every artifact the earlier steps produced (crops, narration
//! audio, background clips) and the reconciled timeline, and hands them to
//! the composer. Validation fails while any upstream artifact is missing,
//! which is what makes the fail-fast ordering observable end to end.

use serde_json::json;

use renderflow_types::plan::PlanDocument;
use renderflow_types::workflow::StepId;

use crate::cache::CacheBackend;
use crate::env::{safe_file_stem, RunEnvironment};
use crate::media::{CompositionJob, MediaService};
use crate::pipeline::step::{PipelineStep, StepError, StepOutcome};

use super::StepContext;

// ---------------------------------------------------------------------------
// ComposeVideoStep
// ---------------------------------------------------------------------------

pub struct ComposeVideoStep<M, B: CacheBackend> {
    ctx: StepContext<M, B>,
}

impl<M, B: CacheBackend> ComposeVideoStep<M, B> {
    pub fn new(ctx: StepContext<M, B>) -> Self {
        Self { ctx }
    }
}

impl<M: MediaService, B: CacheBackend> PipelineStep for ComposeVideoStep<M, B> {
    fn id(&self) -> StepId {
        StepId::ComposeVideo
    }

    fn dependencies(&self) -> &'static [StepId] {
        super::dependencies_of(StepId::ComposeVideo)
    }

    fn validate_inputs(&self, plan: &PlanDocument) -> bool {
        plan.video_composition.timeline.total_duration > 0.0
            && plan
                .cutting_plan
                .regions
                .iter()
                .all(|r| r.output_path.is_some())
            && plan
                .narration_script
                .segments
                .iter()
                .all(|s| s.audio_path.is_some())
            && plan
                .text_to_video_plan
                .segments
                .iter()
                .all(|s| s.clip_path.is_some())
    }

    async fn execute(
        &self,
        plan: &mut PlanDocument,
        env: &RunEnvironment,
    ) -> Result<StepOutcome, StepError> {
        let step = StepId::ComposeVideo;

        let mut segments: Vec<_> = plan.narration_script.segments.iter().collect();
        segments.sort_by_key(|s| s.index);
        let audio_tracks = segments
            .iter()
            .filter_map(|s| s.audio_path.clone())
            .collect();
        let image_overlays = plan
            .cutting_plan
            .regions
            .iter()
            .filter_map(|r| r.output_path.clone())
            .collect();
        let background_clips = plan
            .text_to_video_plan
            .segments
            .iter()
            .filter_map(|s| s.clip_path.clone())
            .collect();

        let total_duration = plan.video_composition.timeline.total_duration;
        let output_path = env.final_dir().join(format!(
            "{}_final.{}",
            safe_file_stem(&plan.meta_info.title),
            plan.video_composition.output_format
        ));

        let job = CompositionJob {
            audio_tracks,
            image_overlays,
            background_clips,
            total_duration,
            output_format: plan.video_composition.output_format.clone(),
            output_path,
        };

        let final_path = self
            .ctx
            .media
            .compose(&job)
            .await
            .map_err(|e| StepError::from_media(step, e))?;
        tracing::info!(output = %final_path.display(), total_duration, "composed final video");

        Ok(StepOutcome::new()
            .with_file(final_path.clone())
            .with_metadata("final_output", json!(final_path.display().to_string()))
            .with_metadata("total_duration", json!(total_duration)))
    }
}
