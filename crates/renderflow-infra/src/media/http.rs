//! Live media service: HTTP adapters plus local image and ffmpeg work.
//!
//! Implements the `MediaService` port from renderflow-core with thin
//! request/response shims: vision analysis, TTS, and text-to-video go over
//! HTTP via `reqwest`; region cropping runs locally through the `image`
//! crate; composition shells out to ffmpeg. Rate limits, timeouts, and 5xx
//! responses surface as transient failures so the scheduler retries them.
//!
//! This follows the dependency inversion pattern: the trait is defined in
//! core, the implementation lives here.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

use renderflow_core::media::{
    ClipRequest, CompositionJob, MediaError, MediaService, RegionRequest, SpeechRequest,
    SpeechSynthesis,
};
use renderflow_types::plan::Rect;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Endpoint configuration for the live media services.
#[derive(Debug, Clone)]
pub struct MediaEndpoints {
    pub vision_url: String,
    pub tts_url: String,
    pub video_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
}

impl Default for MediaEndpoints {
    fn default() -> Self {
        Self {
            vision_url: "https://api.vision-service.example/v1/analyze".to_string(),
            tts_url: "https://api.tts-service.example/v1/speech".to_string(),
            video_url: "https://api.video-service.example/v1/generate".to_string(),
            api_key: String::new(),
            request_timeout_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shapes (private to this adapter)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    regions: Vec<AnalyzedRegion>,
}

#[derive(Debug, Deserialize)]
struct AnalyzedRegion {
    id: String,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    audio_b64: String,
    duration_secs: f64,
}

// ---------------------------------------------------------------------------
// HttpMediaService
// ---------------------------------------------------------------------------

pub struct HttpMediaService {
    client: reqwest::Client,
    endpoints: MediaEndpoints,
}

impl HttpMediaService {
    pub fn new(endpoints: MediaEndpoints) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoints.request_timeout_secs))
            .user_agent("renderflow/0.1")
            .build()
            .expect("failed to build HTTP client");
        Self { client, endpoints }
    }

    /// Map a reqwest failure onto the retry taxonomy: timeouts and connect
    /// errors are transient, everything else is terminal.
    fn classify_transport(err: reqwest::Error) -> MediaError {
        if err.is_timeout() || err.is_connect() {
            MediaError::Transient(err.to_string())
        } else {
            MediaError::Failed(err.to_string())
        }
    }

    /// Check an HTTP status: 429 and 5xx retry, other failures do not.
    fn check_status(response: reqwest::Response) -> Result<reqwest::Response, MediaError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status.as_u16() == 429 || status.is_server_error() {
            Err(MediaError::Transient(format!("service returned {status}")))
        } else {
            Err(MediaError::Failed(format!("service returned {status}")))
        }
    }
}

impl MediaService for HttpMediaService {
    async fn analyze_regions(
        &self,
        image: &Path,
        regions: &[RegionRequest],
    ) -> Result<Vec<(String, Rect)>, MediaError> {
        let image_bytes = std::fs::read(image)?;
        let body = json!({
            "image_b64": base64::engine::general_purpose::STANDARD.encode(&image_bytes),
            "regions": regions,
        });

        let response = self
            .client
            .post(&self.endpoints.vision_url)
            .bearer_auth(&self.endpoints.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify_transport)?;
        let parsed: AnalyzeResponse = Self::check_status(response)?
            .json()
            .await
            .map_err(|e| MediaError::Failed(format!("malformed analyze response: {e}")))?;

        Ok(parsed
            .regions
            .into_iter()
            .map(|r| {
                (
                    r.id,
                    Rect { x: r.x, y: r.y, width: r.width, height: r.height },
                )
            })
            .collect())
    }

    async fn cut_region(&self, image: &Path, rect: Rect) -> Result<Vec<u8>, MediaError> {
        let source = image::open(image)
            .map_err(|e| MediaError::Failed(format!("cannot decode '{}': {e}", image.display())))?;
        let cropped = source.crop_imm(rect.x, rect.y, rect.width, rect.height);

        let mut bytes = Vec::new();
        cropped
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| MediaError::Failed(format!("png encode failed: {e}")))?;
        Ok(bytes)
    }

    async fn synthesize_speech(
        &self,
        request: &SpeechRequest,
    ) -> Result<SpeechSynthesis, MediaError> {
        let response = self
            .client
            .post(&self.endpoints.tts_url)
            .bearer_auth(&self.endpoints.api_key)
            .json(request)
            .send()
            .await
            .map_err(Self::classify_transport)?;
        let parsed: SpeechResponse = Self::check_status(response)?
            .json()
            .await
            .map_err(|e| MediaError::Failed(format!("malformed speech response: {e}")))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(&parsed.audio_b64)
            .map_err(|e| MediaError::Failed(format!("undecodable speech audio: {e}")))?;
        Ok(SpeechSynthesis {
            audio,
            duration_secs: parsed.duration_secs,
        })
    }

    async fn generate_clip(&self, request: &ClipRequest) -> Result<Vec<u8>, MediaError> {
        let response = self
            .client
            .post(&self.endpoints.video_url)
            .bearer_auth(&self.endpoints.api_key)
            .json(request)
            .send()
            .await
            .map_err(Self::classify_transport)?;
        let bytes = Self::check_status(response)?
            .bytes()
            .await
            .map_err(Self::classify_transport)?;
        Ok(bytes.to_vec())
    }

    async fn compose(&self, job: &CompositionJob) -> Result<PathBuf, MediaError> {
        if job.background_clips.is_empty() {
            return Err(MediaError::Failed("no background clips to compose".to_string()));
        }

        let mut command = tokio::process::Command::new("ffmpeg");
        command.arg("-y");
        for clip in &job.background_clips {
            command.arg("-i").arg(clip);
        }
        for track in &job.audio_tracks {
            command.arg("-i").arg(track);
        }
        command
            .arg("-t")
            .arg(format!("{:.3}", job.total_duration))
            .arg(&job.output_path);

        tracing::debug!(
            clips = job.background_clips.len(),
            tracks = job.audio_tracks.len(),
            output = %job.output_path.display(),
            "invoking ffmpeg"
        );

        let output = command
            .output()
            .await
            .map_err(|e| MediaError::Failed(format!("failed to spawn ffmpeg: {e}")))?;
        if !output.status.success() {
            return Err(MediaError::Failed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(job.output_path.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
