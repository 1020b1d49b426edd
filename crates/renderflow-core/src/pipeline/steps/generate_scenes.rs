//! Step 4: generate background clips from scene prompts.
//!
//! Each scene's generation request is cached by prompt, style, and the
//! reconciled duration, so regenerating a video after a downstream failure
//! costs nothing as long as the timeline did not change.

use serde_json::json;

use renderflow_types::cache::CacheCategory;
use renderflow_types::plan::PlanDocument;
use renderflow_types::workflow::StepId;

use crate::cache::{CacheBackend, CacheKey};
use crate::env::{safe_file_stem, RunEnvironment};
use crate::media::{ClipRequest, MediaService};
use crate::pipeline::step::{PipelineStep, StepError, StepOutcome};

use super::{write_artifact, StepContext};

// ---------------------------------------------------------------------------
// GenerateScenesStep
// ---------------------------------------------------------------------------

pub struct GenerateScenesStep<M, B: CacheBackend> {
    ctx: StepContext<M, B>,
}

impl<M, B: CacheBackend> GenerateScenesStep<M, B> {
    pub fn new(ctx: StepContext<M, B>) -> Self {
        Self { ctx }
    }
}

impl<M: MediaService, B: CacheBackend> PipelineStep for GenerateScenesStep<M, B> {
    fn id(&self) -> StepId {
        StepId::GenerateScenes
    }

    fn dependencies(&self) -> &'static [StepId] {
        super::dependencies_of(StepId::GenerateScenes)
    }

    fn validate_inputs(&self, plan: &PlanDocument) -> bool {
        let segments = &plan.text_to_video_plan.segments;
        !segments.is_empty()
            && segments
                .iter()
                .all(|s| !s.prompt.trim().is_empty() && s.duration > 0.0)
    }

    async fn execute(
        &self,
        plan: &mut PlanDocument,
        env: &RunEnvironment,
    ) -> Result<StepOutcome, StepError> {
        let step = StepId::GenerateScenes;
        let background_dir = env.background_dir();
        let mut outcome = StepOutcome::new();

        for idx in 0..plan.text_to_video_plan.segments.len() {
            let scene = plan.text_to_video_plan.segments[idx].clone();
            let request = ClipRequest {
                prompt: scene.prompt.clone(),
                style: scene.style.clone(),
                duration_secs: scene.duration,
            };
            let params = serde_json::to_value(&request)
                .map_err(|e| StepError::execution(step, e.to_string()))?;
            let key = CacheKey::derive("video.generate_clip", &params);

            let bytes = match self.ctx.cache.get(&key) {
                Some(cached) => cached,
                None => {
                    let fresh = self
                        .ctx
                        .media
                        .generate_clip(&request)
                        .await
                        .map_err(|e| StepError::from_media(step, e))?;
                    if let Err(err) =
                        self.ctx.cache.put(&key, CacheCategory::ApiResponses, &fresh)
                    {
                        tracing::warn!(error = %err, scene = scene.id.as_str(), "failed to cache clip");
                    }
                    fresh
                }
            };

            let path = background_dir.join(format!("scene_{}.mp4", safe_file_stem(&scene.id)));
            write_artifact(step, &path, &bytes)?;
            tracing::debug!(
                scene = scene.id.as_str(),
                duration_secs = scene.duration,
                "generated background clip"
            );

            plan.text_to_video_plan.segments[idx].clip_path = Some(path.clone());
            outcome.output_files.push(path);
        }

        Ok(outcome.with_metadata("scenes", json!(plan.text_to_video_plan.segments.len())))
    }
}
