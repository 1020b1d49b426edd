//! The five concrete pipeline steps and the typed step registry.
//!
//! The registry is built once at executor construction and holds every step
//! behind the [`AnyStep`] tagged variant, so dispatch is a `match` on
//! [`StepId`] rather than a string lookup. Step dependencies are static
//! knowledge, exposed through [`dependencies_of`] for graph validation.

pub mod compose_video;
pub mod cut_images;
pub mod generate_scenes;
pub mod recalculate_timeline;
pub mod synthesize_audio;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use renderflow_types::config::TimelineConfig;
use renderflow_types::plan::PlanDocument;
use renderflow_types::workflow::StepId;

use crate::cache::{CacheBackend, ResponseCache};
use crate::env::RunEnvironment;
use crate::media::MediaService;
use crate::pipeline::step::{PipelineStep, StepError, StepOutcome};

pub use compose_video::ComposeVideoStep;
pub use cut_images::CutImagesStep;
pub use generate_scenes::GenerateScenesStep;
pub use recalculate_timeline::RecalculateTimelineStep;
pub use synthesize_audio::SynthesizeAudioStep;

// ---------------------------------------------------------------------------
// Static dependency declarations
// ---------------------------------------------------------------------------

/// Declared dependencies for each step. Timeline recalculation needs the
/// real audio durations; scene generation needs the reconciled durations;
/// composition needs every artifact.
pub fn dependencies_of(step: StepId) -> &'static [StepId] {
    match step {
        StepId::CutImages => &[],
        StepId::SynthesizeAudio => &[],
        StepId::RecalculateTimeline => &[StepId::SynthesizeAudio],
        StepId::GenerateScenes => &[StepId::RecalculateTimeline],
        StepId::ComposeVideo => &[
            StepId::CutImages,
            StepId::SynthesizeAudio,
            StepId::GenerateScenes,
        ],
    }
}

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

/// Shared services handed to every step: the media port and the response
/// cache.
pub struct StepContext<M, B: CacheBackend> {
    pub media: Arc<M>,
    pub cache: Arc<ResponseCache<B>>,
}

impl<M, B: CacheBackend> Clone for StepContext<M, B> {
    fn clone(&self) -> Self {
        Self {
            media: Arc::clone(&self.media),
            cache: Arc::clone(&self.cache),
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact helper
// ---------------------------------------------------------------------------

/// Write step output bytes to disk, mapping failures onto the step.
pub(crate) fn write_artifact(step: StepId, path: &Path, bytes: &[u8]) -> Result<(), StepError> {
    std::fs::write(path, bytes).map_err(|e| {
        StepError::execution(step, format!("failed to write '{}': {e}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// AnyStep
// ---------------------------------------------------------------------------

/// Tagged variant over the five concrete step types.
pub enum AnyStep<M, B: CacheBackend> {
    CutImages(CutImagesStep<M, B>),
    SynthesizeAudio(SynthesizeAudioStep<M, B>),
    RecalculateTimeline(RecalculateTimelineStep),
    GenerateScenes(GenerateScenesStep<M, B>),
    ComposeVideo(ComposeVideoStep<M, B>),
}

impl<M: MediaService, B: CacheBackend> PipelineStep for AnyStep<M, B> {
    fn id(&self) -> StepId {
        match self {
            AnyStep::CutImages(s) => s.id(),
            AnyStep::SynthesizeAudio(s) => s.id(),
            AnyStep::RecalculateTimeline(s) => s.id(),
            AnyStep::GenerateScenes(s) => s.id(),
            AnyStep::ComposeVideo(s) => s.id(),
        }
    }

    fn dependencies(&self) -> &'static [StepId] {
        dependencies_of(self.id())
    }

    fn validate_inputs(&self, plan: &PlanDocument) -> bool {
        match self {
            AnyStep::CutImages(s) => s.validate_inputs(plan),
            AnyStep::SynthesizeAudio(s) => s.validate_inputs(plan),
            AnyStep::RecalculateTimeline(s) => s.validate_inputs(plan),
            AnyStep::GenerateScenes(s) => s.validate_inputs(plan),
            AnyStep::ComposeVideo(s) => s.validate_inputs(plan),
        }
    }

    async fn execute(
        &self,
        plan: &mut PlanDocument,
        env: &RunEnvironment,
    ) -> Result<StepOutcome, StepError> {
        match self {
            AnyStep::CutImages(s) => s.execute(plan, env).await,
            AnyStep::SynthesizeAudio(s) => s.execute(plan, env).await,
            AnyStep::RecalculateTimeline(s) => s.execute(plan, env).await,
            AnyStep::GenerateScenes(s) => s.execute(plan, env).await,
            AnyStep::ComposeVideo(s) => s.execute(plan, env).await,
        }
    }
}

// ---------------------------------------------------------------------------
// StepRegistry
// ---------------------------------------------------------------------------

/// All five steps, keyed by [`StepId`]. Built once at startup; the key set
/// is exactly `StepId::ALL` by construction.
pub struct StepRegistry<M, B: CacheBackend> {
    steps: BTreeMap<StepId, AnyStep<M, B>>,
}

impl<M: MediaService, B: CacheBackend> StepRegistry<M, B> {
    pub fn new(
        media: Arc<M>,
        cache: Arc<ResponseCache<B>>,
        timeline: &TimelineConfig,
    ) -> Self {
        let ctx = StepContext { media, cache };
        let mut steps = BTreeMap::new();
        steps.insert(
            StepId::CutImages,
            AnyStep::CutImages(CutImagesStep::new(ctx.clone())),
        );
        steps.insert(
            StepId::SynthesizeAudio,
            AnyStep::SynthesizeAudio(SynthesizeAudioStep::new(ctx.clone())),
        );
        steps.insert(
            StepId::RecalculateTimeline,
            AnyStep::RecalculateTimeline(RecalculateTimelineStep::new(
                timeline.drift_tolerance_secs,
            )),
        );
        steps.insert(
            StepId::GenerateScenes,
            AnyStep::GenerateScenes(GenerateScenesStep::new(ctx.clone())),
        );
        steps.insert(
            StepId::ComposeVideo,
            AnyStep::ComposeVideo(ComposeVideoStep::new(ctx)),
        );
        Self { steps }
    }

    pub fn get(&self, id: StepId) -> Option<&AnyStep<M, B>> {
        self.steps.get(&id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
