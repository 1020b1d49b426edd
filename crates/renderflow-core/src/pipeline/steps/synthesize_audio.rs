//! Step 2: synthesize narration audio.
//!
//! Each segment's synthesis is cached under the API-response category, keyed
//! over text, voice, and speaking rate; a cache hit restores both the audio
//! bytes and the measured duration without touching the TTS service. The
//! measured durations recorded here feed timeline recalculation.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use renderflow_types::cache::CacheCategory;
use renderflow_types::plan::PlanDocument;
use renderflow_types::workflow::StepId;

use crate::cache::{CacheBackend, CacheKey};
use crate::env::{safe_file_stem, RunEnvironment};
use crate::media::{MediaService, SpeechRequest, SpeechSynthesis};
use crate::pipeline::step::{PipelineStep, StepError, StepOutcome};

use super::{write_artifact, StepContext};

// ---------------------------------------------------------------------------
// Cached payload
// ---------------------------------------------------------------------------

/// JSON shape of a cached synthesis: duration plus base64 audio.
#[derive(Debug, Serialize, Deserialize)]
struct CachedSpeech {
    duration_secs: f64,
    audio_b64: String,
}

impl CachedSpeech {
    fn encode(synthesis: &SpeechSynthesis) -> Self {
        Self {
            duration_secs: synthesis.duration_secs,
            audio_b64: base64::engine::general_purpose::STANDARD.encode(&synthesis.audio),
        }
    }

    fn decode(self) -> Option<SpeechSynthesis> {
        let audio = base64::engine::general_purpose::STANDARD
            .decode(&self.audio_b64)
            .ok()?;
        Some(SpeechSynthesis {
            audio,
            duration_secs: self.duration_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// SynthesizeAudioStep
// ---------------------------------------------------------------------------

pub struct SynthesizeAudioStep<M, B: CacheBackend> {
    ctx: StepContext<M, B>,
}

impl<M, B: CacheBackend> SynthesizeAudioStep<M, B> {
    pub fn new(ctx: StepContext<M, B>) -> Self {
        Self { ctx }
    }
}

impl<M: MediaService, B: CacheBackend> PipelineStep for SynthesizeAudioStep<M, B> {
    fn id(&self) -> StepId {
        StepId::SynthesizeAudio
    }

    fn dependencies(&self) -> &'static [StepId] {
        super::dependencies_of(StepId::SynthesizeAudio)
    }

    fn validate_inputs(&self, plan: &PlanDocument) -> bool {
        let segments = &plan.narration_script.segments;
        !segments.is_empty() && segments.iter().all(|s| !s.text.trim().is_empty())
    }

    async fn execute(
        &self,
        plan: &mut PlanDocument,
        env: &RunEnvironment,
    ) -> Result<StepOutcome, StepError> {
        let step = StepId::SynthesizeAudio;
        let audio_dir = env.audio_dir();

        // Process in playback order.
        let mut indices: Vec<usize> = (0..plan.narration_script.segments.len()).collect();
        indices.sort_by_key(|&i| plan.narration_script.segments[i].index);

        let mut outcome = StepOutcome::new();
        let mut total_duration = 0.0;

        for idx in indices {
            let segment = plan.narration_script.segments[idx].clone();
            let request = SpeechRequest {
                text: segment.text.clone(),
                voice: segment.voice.clone(),
                speaking_rate: segment.speaking_rate,
            };
            let params = serde_json::to_value(&request)
                .map_err(|e| StepError::execution(step, e.to_string()))?;
            let key = CacheKey::derive("tts.synthesize", &params);

            let synthesis = match self
                .ctx
                .cache
                .get(&key)
                .and_then(|bytes| serde_json::from_slice::<CachedSpeech>(&bytes).ok())
                .and_then(CachedSpeech::decode)
            {
                Some(cached) => cached,
                None => {
                    let fresh = self
                        .ctx
                        .media
                        .synthesize_speech(&request)
                        .await
                        .map_err(|e| StepError::from_media(step, e))?;
                    match serde_json::to_vec(&CachedSpeech::encode(&fresh)) {
                        Ok(bytes) => {
                            if let Err(err) =
                                self.ctx.cache.put(&key, CacheCategory::ApiResponses, &bytes)
                            {
                                tracing::warn!(error = %err, segment = segment.id.as_str(), "failed to cache synthesis");
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "unserializable synthesis payload")
                        }
                    }
                    fresh
                }
            };

            if synthesis.duration_secs < 0.0 {
                return Err(StepError::execution(
                    step,
                    format!(
                        "tts returned a negative duration for segment '{}'",
                        segment.id
                    ),
                ));
            }

            let path = audio_dir.join(format!("audio_{}.mp3", safe_file_stem(&segment.id)));
            write_artifact(step, &path, &synthesis.audio)?;
            tracing::debug!(
                segment = segment.id.as_str(),
                duration_secs = synthesis.duration_secs,
                "synthesized narration"
            );

            total_duration += synthesis.duration_secs;
            let slot = &mut plan.narration_script.segments[idx];
            slot.audio_path = Some(path.clone());
            slot.actual_duration = Some(synthesis.duration_secs);
            outcome.output_files.push(path);
        }

        Ok(outcome
            .with_metadata("segments", json!(plan.narration_script.segments.len()))
            .with_metadata("total_actual_duration", json!(total_duration)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
