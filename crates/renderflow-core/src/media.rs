//! The media service port.
//!
//! Every external call a step makes goes through [`MediaService`]: vision
//! region analysis, speech synthesis, text-to-video generation, image
//! cropping, and final composition. The trait is defined here and
//! implemented in `renderflow-infra` (and by test mocks), so the engine
//! never depends on any specific API's request/response shape. Uses RPITIT
//! (native async fn in traits, Rust 2024 edition).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use renderflow_types::plan::Rect;

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// A region whose coordinates the vision service should propose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRequest {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Speech synthesis request for one narration segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub speaking_rate: f64,
}

/// Synthesized speech: encoded audio plus its measured duration.
#[derive(Debug, Clone)]
pub struct SpeechSynthesis {
    pub audio: Vec<u8>,
    pub duration_secs: f64,
}

/// Text-to-video generation request for one scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipRequest {
    pub prompt: String,
    pub style: String,
    pub duration_secs: f64,
}

/// Everything the composer needs to assemble the final video.
#[derive(Debug, Clone)]
pub struct CompositionJob {
    /// Narration tracks in playback order.
    pub audio_tracks: Vec<PathBuf>,
    /// Cropped region images to overlay.
    pub image_overlays: Vec<PathBuf>,
    /// Generated background clips in scene order.
    pub background_clips: Vec<PathBuf>,
    pub total_duration: f64,
    pub output_format: String,
    pub output_path: PathBuf,
}

// ---------------------------------------------------------------------------
// MediaError
// ---------------------------------------------------------------------------

/// Failure of a media service call.
///
/// Transient failures (rate limits, timeouts, 5xx) are retried by the
/// scheduler; everything else halts the step.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Rate limit, timeout, or other condition worth retrying.
    #[error("transient media failure: {0}")]
    Transient(String),

    /// Unrecoverable service failure.
    #[error("media call failed: {0}")]
    Failed(String),

    /// Local filesystem failure while handling media bytes.
    #[error("media I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MediaError::Transient(_))
    }
}

// ---------------------------------------------------------------------------
// MediaService trait
// ---------------------------------------------------------------------------

/// Port for all external media operations.
pub trait MediaService: Send + Sync {
    /// Propose coordinates for regions the plan left unresolved.
    /// Returns `(region_id, rect)` pairs; regions the service cannot place
    /// are simply absent from the result.
    fn analyze_regions(
        &self,
        image: &Path,
        regions: &[RegionRequest],
    ) -> impl std::future::Future<Output = Result<Vec<(String, Rect)>, MediaError>> + Send;

    /// Crop `rect` out of the source image, returning encoded image bytes.
    fn cut_region(
        &self,
        image: &Path,
        rect: Rect,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, MediaError>> + Send;

    /// Synthesize speech for one narration segment.
    fn synthesize_speech(
        &self,
        request: &SpeechRequest,
    ) -> impl std::future::Future<Output = Result<SpeechSynthesis, MediaError>> + Send;

    /// Generate a background clip from a text prompt.
    fn generate_clip(
        &self,
        request: &ClipRequest,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, MediaError>> + Send;

    /// Assemble the final video; returns the rendered output path.
    fn compose(
        &self,
        job: &CompositionJob,
    ) -> impl std::future::Future<Output = Result<PathBuf, MediaError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
