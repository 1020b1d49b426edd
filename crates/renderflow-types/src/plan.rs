//! Plan document types for Renderflow.
//!
//! The plan document is the declarative input/output structure the pipeline
//! steps read and mutate: source image regions to cut, narration segments to
//! synthesize, scenes to generate, and the composition that ties them
//! together. It round-trips through JSON; step execution state is carried in
//! the `processing_workflow` section (see [`crate::workflow`]).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::workflow::ProcessingWorkflow;

// ---------------------------------------------------------------------------
// PlanDocument (root aggregate)
// ---------------------------------------------------------------------------

/// The root plan document.
///
/// Owned by the caller and passed `&mut` through the pipeline; steps mutate
/// it in place (fill in coordinates, artifact paths, actual durations).
/// There are no concurrent writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    /// Title, source image, and target duration.
    pub meta_info: MetaInfo,
    /// Regions to cut from the source image.
    pub cutting_plan: CuttingPlan,
    /// Narration segments to synthesize.
    pub narration_script: NarrationScript,
    /// Background scenes to generate from text prompts.
    pub text_to_video_plan: TextToVideoPlan,
    /// Final composition layout.
    pub video_composition: VideoComposition,
    /// Declared step order/config plus the last run record.
    #[serde(default)]
    pub processing_workflow: ProcessingWorkflow,
}

/// Video-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaInfo {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Path to the source infographic image.
    pub source_image: PathBuf,
    /// Target video duration in seconds. Updated by timeline recalculation
    /// once actual audio durations are known.
    pub target_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default = "default_plan_version")]
    pub plan_version: String,
}

fn default_plan_version() -> String {
    "1.0".to_string()
}

// ---------------------------------------------------------------------------
// Cutting plan
// ---------------------------------------------------------------------------

/// Pixel rectangle within the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Whether the rectangle has positive area and fits inside `(w, h)`.
    pub fn fits_within(&self, w: u32, h: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.saturating_add(self.width) <= w
            && self.y.saturating_add(self.height) <= h
    }
}

/// The source image and its pixel dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// A region of the source image to cut out.
///
/// `coordinates` is `None` until the cutting step resolves it (either taken
/// from the plan or proposed by the vision service); once set it is never
/// overwritten. `output_path` is set when the cropped image has been written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuttingRegion {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

/// Regions to extract from the source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuttingPlan {
    pub source_image: SourceImage,
    #[serde(default)]
    pub regions: Vec<CuttingRegion>,
}

impl CuttingPlan {
    pub fn region_by_id(&self, id: &str) -> Option<&CuttingRegion> {
        self.regions.iter().find(|r| r.id == id)
    }
}

// ---------------------------------------------------------------------------
// Narration script
// ---------------------------------------------------------------------------

/// A single narration segment.
///
/// `actual_duration` is unknown until synthesis completes; once set it is
/// the measured duration of the produced audio (>= 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Position within the script (0-based, defines playback order).
    pub index: u32,
    pub id: String,
    pub text: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_speaking_rate")]
    pub speaking_rate: f64,
    /// Planned duration in seconds, estimated at planning time.
    pub planned_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_speaking_rate() -> f64 {
    1.0
}

impl AudioSegment {
    /// Actual duration when known, planned duration otherwise.
    pub fn effective_duration(&self) -> f64 {
        self.actual_duration.unwrap_or(self.planned_duration)
    }
}

/// The full narration script, segments ordered by `index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationScript {
    #[serde(default)]
    pub segments: Vec<AudioSegment>,
}

impl NarrationScript {
    pub fn total_planned_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.planned_duration).sum()
    }

    /// Sum of actual durations, or `None` if any segment is still missing one.
    pub fn total_actual_duration(&self) -> Option<f64> {
        self.segments
            .iter()
            .map(|s| s.actual_duration)
            .sum::<Option<f64>>()
    }
}

// ---------------------------------------------------------------------------
// Text-to-video plan
// ---------------------------------------------------------------------------

/// A background scene generated from a text prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSegment {
    pub id: String,
    pub prompt: String,
    #[serde(default = "default_style")]
    pub style: String,
    /// Scene duration in seconds; rescaled by timeline recalculation.
    pub duration: f64,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_path: Option<PathBuf>,
}

fn default_style() -> String {
    "realistic".to_string()
}

/// Scenes to generate for the video background.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextToVideoPlan {
    #[serde(default)]
    pub segments: Vec<SceneSegment>,
}

// ---------------------------------------------------------------------------
// Video composition
// ---------------------------------------------------------------------------

/// What a composition layer carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Video,
    Image,
    Audio,
}

/// One layer in the final composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionLayer {
    pub kind: LayerKind,
    /// Reference to the source artifact: a region id, segment id, or path.
    pub source: String,
    #[serde(default)]
    pub start_time: f64,
    pub duration: f64,
}

impl CompositionLayer {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// A transition between layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub kind: String,
    pub start_time: f64,
    pub duration: f64,
}

/// Reconciled timeline carried inside the composition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositionTimeline {
    pub total_duration: f64,
    #[serde(default)]
    pub entries: Vec<crate::timeline::TimelineEntry>,
}

/// The final composition layout consumed by the compose step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoComposition {
    #[serde(default)]
    pub layers: Vec<CompositionLayer>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub timeline: CompositionTimeline,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Free-form render settings (resolution, fps) passed to the composer.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub render_settings: HashMap<String, serde_json::Value>,
}

fn default_output_format() -> String {
    "mp4".to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_plan() -> PlanDocument {
        PlanDocument {
            meta_info: MetaInfo {
                title: "launch-recap".to_string(),
                description: "Quarterly launch infographic".to_string(),
                source_image: PathBuf::from("assets/infographic.png"),
                target_duration: 7.5,
                created_at: None,
                plan_version: "1.0".to_string(),
            },
            cutting_plan: CuttingPlan {
                source_image: SourceImage {
                    path: PathBuf::from("assets/infographic.png"),
                    width: 1920,
                    height: 1080,
                },
                regions: vec![
                    CuttingRegion {
                        id: "header".to_string(),
                        name: "Header".to_string(),
                        description: String::new(),
                        coordinates: Some(Rect { x: 0, y: 0, width: 1920, height: 200 }),
                        output_path: None,
                    },
                    CuttingRegion {
                        id: "chart".to_string(),
                        name: "Chart".to_string(),
                        description: "Revenue chart".to_string(),
                        coordinates: None,
                        output_path: None,
                    },
                ],
            },
            narration_script: NarrationScript {
                segments: vec![
                    AudioSegment {
                        index: 0,
                        id: "intro".to_string(),
                        text: "Welcome to the recap.".to_string(),
                        voice: "alloy".to_string(),
                        speaking_rate: 1.0,
                        planned_duration: 2.0,
                        actual_duration: None,
                        audio_path: None,
                    },
                    AudioSegment {
                        index: 1,
                        id: "body".to_string(),
                        text: "Revenue grew fast.".to_string(),
                        voice: "alloy".to_string(),
                        speaking_rate: 1.0,
                        planned_duration: 3.0,
                        actual_duration: Some(2.8),
                        audio_path: None,
                    },
                ],
            },
            text_to_video_plan: TextToVideoPlan {
                segments: vec![SceneSegment {
                    id: "bg-1".to_string(),
                    prompt: "slow pan over a city skyline".to_string(),
                    style: "cinematic".to_string(),
                    duration: 5.0,
                    start_time: 0.0,
                    clip_path: None,
                }],
            },
            video_composition: VideoComposition {
                layers: vec![CompositionLayer {
                    kind: LayerKind::Audio,
                    source: "intro".to_string(),
                    start_time: 0.0,
                    duration: 2.0,
                }],
                transitions: vec![],
                timeline: CompositionTimeline::default(),
                output_format: "mp4".to_string(),
                render_settings: HashMap::new(),
            },
            processing_workflow: ProcessingWorkflow::default(),
        }
    }

    // -----------------------------------------------------------------------
    // JSON roundtrip
    // -----------------------------------------------------------------------

    #[test]
    fn test_plan_document_json_roundtrip() {
        let original = sample_plan();
        let json_str = serde_json::to_string_pretty(&original).expect("serialize");
        let parsed: PlanDocument = serde_json::from_str(&json_str).expect("deserialize");
        assert_eq!(parsed.meta_info.title, "launch-recap");
        assert_eq!(parsed.cutting_plan.regions.len(), 2);
        assert_eq!(parsed.narration_script.segments.len(), 2);
        assert_eq!(parsed.text_to_video_plan.segments.len(), 1);
    }

    #[test]
    fn test_unset_optionals_omitted_from_json() {
        let plan = sample_plan();
        let value = serde_json::to_value(&plan).unwrap();
        // Unresolved coordinates and artifact paths must not appear as null.
        assert!(value["cutting_plan"]["regions"][1].get("coordinates").is_none());
        assert!(value["narration_script"]["segments"][0].get("actual_duration").is_none());
        assert_eq!(
            value["narration_script"]["segments"][1]["actual_duration"],
            json!(2.8)
        );
    }

    #[test]
    fn test_plan_parses_with_defaults() {
        // A minimal document without optional sections still parses.
        let json_str = r#"{
            "meta_info": {
                "title": "t",
                "source_image": "a.png",
                "target_duration": 10.0
            },
            "cutting_plan": {
                "source_image": { "path": "a.png", "width": 100, "height": 100 }
            },
            "narration_script": {},
            "text_to_video_plan": {},
            "video_composition": {}
        }"#;
        let plan: PlanDocument = serde_json::from_str(json_str).unwrap();
        assert!(plan.cutting_plan.regions.is_empty());
        assert_eq!(plan.meta_info.plan_version, "1.0");
        assert_eq!(plan.video_composition.output_format, "mp4");
        assert!(plan.processing_workflow.steps.is_empty());
    }

    // -----------------------------------------------------------------------
    // Rect
    // -----------------------------------------------------------------------

    #[test]
    fn test_rect_fits_within_bounds() {
        let r = Rect { x: 10, y: 10, width: 50, height: 50 };
        assert!(r.fits_within(100, 100));
        assert!(r.fits_within(60, 60));
        assert!(!r.fits_within(59, 100));
        assert!(!r.fits_within(100, 59));
    }

    #[test]
    fn test_rect_zero_area_does_not_fit() {
        let r = Rect { x: 0, y: 0, width: 0, height: 10 };
        assert!(!r.fits_within(100, 100));
    }

    #[test]
    fn test_rect_overflow_is_not_a_fit() {
        let r = Rect { x: u32::MAX, y: 0, width: 10, height: 10 };
        assert!(!r.fits_within(u32::MAX, u32::MAX));
    }

    // -----------------------------------------------------------------------
    // Narration durations
    // -----------------------------------------------------------------------

    #[test]
    fn test_total_planned_duration() {
        let plan = sample_plan();
        assert!((plan.narration_script.total_planned_duration() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_total_actual_duration_none_until_all_known() {
        let mut plan = sample_plan();
        assert_eq!(plan.narration_script.total_actual_duration(), None);

        plan.narration_script.segments[0].actual_duration = Some(2.4);
        let total = plan.narration_script.total_actual_duration().unwrap();
        assert!((total - 5.2).abs() < 1e-9);
    }

    #[test]
    fn test_effective_duration_prefers_actual() {
        let plan = sample_plan();
        assert!((plan.narration_script.segments[0].effective_duration() - 2.0).abs() < 1e-9);
        assert!((plan.narration_script.segments[1].effective_duration() - 2.8).abs() < 1e-9);
    }

    // -----------------------------------------------------------------------
    // Composition helpers
    // -----------------------------------------------------------------------

    #[test]
    fn test_layer_end_time() {
        let layer = CompositionLayer {
            kind: LayerKind::Video,
            source: "bg-1".to_string(),
            start_time: 1.5,
            duration: 3.0,
        };
        assert!((layer.end_time() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_layer_kind_serde_snake_case() {
        let json_str = serde_json::to_string(&LayerKind::Image).unwrap();
        assert_eq!(json_str, "\"image\"");
    }
}
