//! Step 1: cut regions out of the source image.
//!
//! Regions the plan left without coordinates are resolved through the
//! vision service first (response cached); the crops themselves are cached
//! as processed-image artifacts keyed by source checksum and rectangle, so
//! re-runs touch neither service. Coordinates already present on a region
//! are never overwritten.

use serde_json::json;

use renderflow_types::cache::CacheCategory;
use renderflow_types::plan::PlanDocument;
use renderflow_types::workflow::StepId;

use crate::cache::{checksum, CacheBackend, CacheKey};
use crate::env::{safe_file_stem, RunEnvironment};
use crate::media::{MediaService, RegionRequest};
use crate::pipeline::step::{PipelineStep, StepError, StepOutcome};

use super::{write_artifact, StepContext};

// ---------------------------------------------------------------------------
// CutImagesStep
// ---------------------------------------------------------------------------

pub struct CutImagesStep<M, B: CacheBackend> {
    ctx: StepContext<M, B>,
}

impl<M, B: CacheBackend> CutImagesStep<M, B> {
    pub fn new(ctx: StepContext<M, B>) -> Self {
        Self { ctx }
    }
}

impl<M: MediaService, B: CacheBackend> PipelineStep for CutImagesStep<M, B> {
    fn id(&self) -> StepId {
        StepId::CutImages
    }

    fn dependencies(&self) -> &'static [StepId] {
        super::dependencies_of(StepId::CutImages)
    }

    fn validate_inputs(&self, plan: &PlanDocument) -> bool {
        let cutting = &plan.cutting_plan;
        !cutting.regions.is_empty()
            && cutting.source_image.width > 0
            && cutting.source_image.height > 0
            && cutting.source_image.path.exists()
    }

    async fn execute(
        &self,
        plan: &mut PlanDocument,
        env: &RunEnvironment,
    ) -> Result<StepOutcome, StepError> {
        let step = StepId::CutImages;
        let source = plan.cutting_plan.source_image.clone();

        let image_bytes = std::fs::read(&source.path).map_err(|e| {
            StepError::execution(step, format!("cannot read '{}': {e}", source.path.display()))
        })?;
        let source_checksum = checksum(&image_bytes);

        // Ask the vision service for coordinates the plan does not carry.
        let unresolved: Vec<RegionRequest> = plan
            .cutting_plan
            .regions
            .iter()
            .filter(|r| r.coordinates.is_none())
            .map(|r| RegionRequest {
                id: r.id.clone(),
                name: r.name.clone(),
                description: r.description.clone(),
            })
            .collect();

        let mut resolved_by_vision = 0usize;
        if !unresolved.is_empty() {
            let params = json!({ "image": source_checksum, "regions": unresolved });
            let key = CacheKey::derive("vision.analyze_regions", &params);

            let proposals: Vec<(String, renderflow_types::plan::Rect)> = match self
                .ctx
                .cache
                .get(&key)
                .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            {
                Some(cached) => cached,
                None => {
                    let fresh = self
                        .ctx
                        .media
                        .analyze_regions(&source.path, &unresolved)
                        .await
                        .map_err(|e| StepError::from_media(step, e))?;
                    match serde_json::to_vec(&fresh) {
                        Ok(bytes) => {
                            if let Err(err) =
                                self.ctx.cache.put(&key, CacheCategory::ApiResponses, &bytes)
                            {
                                tracing::warn!(error = %err, "failed to cache region analysis");
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "unserializable region analysis")
                        }
                    }
                    fresh
                }
            };

            for (region_id, rect) in proposals {
                if let Some(region) = plan
                    .cutting_plan
                    .regions
                    .iter_mut()
                    .find(|r| r.id == region_id)
                {
                    if region.coordinates.is_none()
                        && rect.fits_within(source.width, source.height)
                    {
                        region.coordinates = Some(rect);
                        resolved_by_vision += 1;
                    }
                }
            }
        }

        // Crop every region.
        let cuts_dir = env.cuts_dir();
        let mut outcome = StepOutcome::new();
        for idx in 0..plan.cutting_plan.regions.len() {
            let region = plan.cutting_plan.regions[idx].clone();
            let Some(rect) = region.coordinates else {
                return Err(StepError::execution(
                    step,
                    format!("no coordinates could be resolved for region '{}'", region.id),
                ));
            };
            if !rect.fits_within(source.width, source.height) {
                return Err(StepError::execution(
                    step,
                    format!("region '{}' exceeds the source image bounds", region.id),
                ));
            }

            let key = CacheKey::derive(
                "image.cut_region",
                &json!({ "source": source_checksum, "rect": rect }),
            );
            let bytes = match self.ctx.cache.get(&key) {
                Some(cached) => cached,
                None => {
                    let fresh = self
                        .ctx
                        .media
                        .cut_region(&source.path, rect)
                        .await
                        .map_err(|e| StepError::from_media(step, e))?;
                    if let Err(err) =
                        self.ctx.cache.put(&key, CacheCategory::ProcessedImages, &fresh)
                    {
                        tracing::warn!(error = %err, region = region.id.as_str(), "failed to cache crop");
                    }
                    fresh
                }
            };

            let path = cuts_dir.join(format!(
                "slice_{}_{}.png",
                safe_file_stem(&region.id),
                safe_file_stem(&region.name)
            ));
            write_artifact(step, &path, &bytes)?;
            tracing::debug!(region = region.id.as_str(), path = %path.display(), "cut region");

            plan.cutting_plan.regions[idx].output_path = Some(path.clone());
            outcome.output_files.push(path);
        }

        Ok(outcome
            .with_metadata("total_regions", json!(plan.cutting_plan.regions.len()))
            .with_metadata("resolved_by_vision", json!(resolved_by_vision)))
    }
}
