//! Plan document parsing, validation, and filesystem operations.
//!
//! Converts between JSON and the in-memory [`PlanDocument`], and validates
//! structural constraints (unique IDs, coordinates within image bounds,
//! positive durations, no duplicate workflow entries) before the document
//! reaches the scheduler.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use renderflow_types::plan::PlanDocument;
use renderflow_types::workflow::StepId;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from plan loading and validation.
#[derive(Debug, Error)]
pub enum PlanError {
    /// JSON parse failure.
    #[error("plan parse error: {0}")]
    Parse(String),

    /// Structural validation failure.
    #[error("plan validation error: {0}")]
    Validation(String),

    /// Filesystem I/O failure.
    #[error("plan I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a JSON string into a validated `PlanDocument`.
pub fn parse_plan_json(json: &str) -> Result<PlanDocument, PlanError> {
    let plan: PlanDocument =
        serde_json::from_str(json).map_err(|e| PlanError::Parse(e.to_string()))?;
    validate_plan(&plan)?;
    Ok(plan)
}

/// Serialize a `PlanDocument` to pretty-printed JSON.
pub fn serialize_plan_json(plan: &PlanDocument) -> Result<String, PlanError> {
    serde_json::to_string_pretty(plan).map_err(|e| PlanError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a plan document.
///
/// Checks:
/// - target duration is positive
/// - source image dimensions are positive
/// - region IDs are unique; resolved coordinates fit the source image
/// - narration segment IDs are unique, texts non-empty, planned durations
///   positive, speaking rates within 0.5..=2.0, actual durations >= 0
/// - scene segment IDs are unique with non-empty prompts
/// - the declared workflow has no duplicate step entries
pub fn validate_plan(plan: &PlanDocument) -> Result<(), PlanError> {
    if plan.meta_info.target_duration <= 0.0 {
        return Err(PlanError::Validation(format!(
            "target duration must be positive, got {}",
            plan.meta_info.target_duration
        )));
    }

    let source = &plan.cutting_plan.source_image;
    if source.width == 0 || source.height == 0 {
        return Err(PlanError::Validation(
            "source image dimensions must be positive".to_string(),
        ));
    }

    let mut region_ids = HashSet::new();
    for region in &plan.cutting_plan.regions {
        if region.id.is_empty() {
            return Err(PlanError::Validation("region ID must not be empty".to_string()));
        }
        if !region_ids.insert(region.id.as_str()) {
            return Err(PlanError::Validation(format!(
                "duplicate region ID: '{}'",
                region.id
            )));
        }
        if let Some(rect) = &region.coordinates {
            if !rect.fits_within(source.width, source.height) {
                return Err(PlanError::Validation(format!(
                    "region '{}' exceeds the source image bounds",
                    region.id
                )));
            }
        }
    }

    let mut segment_ids = HashSet::new();
    for segment in &plan.narration_script.segments {
        if !segment_ids.insert(segment.id.as_str()) {
            return Err(PlanError::Validation(format!(
                "duplicate narration segment ID: '{}'",
                segment.id
            )));
        }
        if segment.text.trim().is_empty() {
            return Err(PlanError::Validation(format!(
                "narration segment '{}' has empty text",
                segment.id
            )));
        }
        if segment.planned_duration <= 0.0 {
            return Err(PlanError::Validation(format!(
                "narration segment '{}' must have a positive planned duration",
                segment.id
            )));
        }
        if !(0.5..=2.0).contains(&segment.speaking_rate) {
            return Err(PlanError::Validation(format!(
                "narration segment '{}' speaking rate {} outside 0.5..=2.0",
                segment.id, segment.speaking_rate
            )));
        }
        if let Some(actual) = segment.actual_duration {
            if actual < 0.0 {
                return Err(PlanError::Validation(format!(
                    "narration segment '{}' has a negative actual duration",
                    segment.id
                )));
            }
        }
    }

    let mut scene_ids = HashSet::new();
    for scene in &plan.text_to_video_plan.segments {
        if !scene_ids.insert(scene.id.as_str()) {
            return Err(PlanError::Validation(format!(
                "duplicate scene segment ID: '{}'",
                scene.id
            )));
        }
        if scene.prompt.trim().is_empty() {
            return Err(PlanError::Validation(format!(
                "scene segment '{}' has an empty prompt",
                scene.id
            )));
        }
    }

    let mut seen_steps: HashSet<StepId> = HashSet::new();
    for entry in &plan.processing_workflow.steps {
        if !seen_steps.insert(entry.step) {
            return Err(PlanError::Validation(format!(
                "duplicate workflow step entry: '{}'",
                entry.step
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load and validate a plan document from a JSON file.
pub fn load_plan_file(path: &Path) -> Result<PlanDocument, PlanError> {
    let content = std::fs::read_to_string(path)?;
    parse_plan_json(&content)
}

/// Save a plan document to a JSON file, creating parent directories.
pub fn save_plan_file(path: &Path, plan: &PlanDocument) -> Result<(), PlanError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serialize_plan_json(plan)?;
    std::fs::write(path, json)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use renderflow_types::plan::{
        AudioSegment, CuttingPlan, CuttingRegion, MetaInfo, NarrationScript, PlanDocument, Rect,
        SceneSegment, SourceImage, TextToVideoPlan, VideoComposition,
    };
    use renderflow_types::workflow::{ProcessingWorkflow, StepPlanEntry};
    use std::path::PathBuf;

    fn minimal_plan() -> PlanDocument {
        PlanDocument {
            meta_info: MetaInfo {
                title: "t".to_string(),
                description: String::new(),
                source_image: PathBuf::from("a.png"),
                target_duration: 10.0,
                created_at: None,
                plan_version: "1.0".to_string(),
            },
            cutting_plan: CuttingPlan {
                source_image: SourceImage {
                    path: PathBuf::from("a.png"),
                    width: 800,
                    height: 600,
                },
                regions: vec![CuttingRegion {
                    id: "r1".to_string(),
                    name: "Region".to_string(),
                    description: String::new(),
                    coordinates: Some(Rect { x: 0, y: 0, width: 100, height: 100 }),
                    output_path: None,
                }],
            },
            narration_script: NarrationScript {
                segments: vec![AudioSegment {
                    index: 0,
                    id: "s1".to_string(),
                    text: "hello".to_string(),
                    voice: "alloy".to_string(),
                    speaking_rate: 1.0,
                    planned_duration: 2.0,
                    actual_duration: None,
                    audio_path: None,
                }],
            },
            text_to_video_plan: TextToVideoPlan {
                segments: vec![SceneSegment {
                    id: "bg1".to_string(),
                    prompt: "ocean waves".to_string(),
                    style: "realistic".to_string(),
                    duration: 10.0,
                    start_time: 0.0,
                    clip_path: None,
                }],
            },
            video_composition: VideoComposition {
                layers: vec![],
                transitions: vec![],
                timeline: Default::default(),
                output_format: "mp4".to_string(),
                render_settings: Default::default(),
            },
            processing_workflow: ProcessingWorkflow::full_pipeline(),
        }
    }

    // -----------------------------------------------------------------------
    // Parse / serialize roundtrip
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_roundtrip() {
        let plan = minimal_plan();
        let json = serialize_plan_json(&plan).unwrap();
        let parsed = parse_plan_json(&json).unwrap();
        assert_eq!(parsed.meta_info.title, "t");
        assert_eq!(parsed.cutting_plan.regions.len(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let err = parse_plan_json("{ not json").unwrap_err();
        assert!(matches!(err, PlanError::Parse(_)));
    }

    // -----------------------------------------------------------------------
    // Validation failures
    // -----------------------------------------------------------------------

    #[test]
    fn test_rejects_nonpositive_target_duration() {
        let mut plan = minimal_plan();
        plan.meta_info.target_duration = 0.0;
        let err = validate_plan(&plan).unwrap_err();
        assert!(err.to_string().contains("target duration"), "got: {err}");
    }

    #[test]
    fn test_rejects_duplicate_region_ids() {
        let mut plan = minimal_plan();
        let duplicate = plan.cutting_plan.regions[0].clone();
        plan.cutting_plan.regions.push(duplicate);
        let err = validate_plan(&plan).unwrap_err();
        assert!(err.to_string().contains("duplicate region ID"), "got: {err}");
    }

    #[test]
    fn test_rejects_out_of_bounds_coordinates() {
        let mut plan = minimal_plan();
        plan.cutting_plan.regions[0].coordinates =
            Some(Rect { x: 750, y: 0, width: 100, height: 100 });
        let err = validate_plan(&plan).unwrap_err();
        assert!(err.to_string().contains("bounds"), "got: {err}");
    }

    #[test]
    fn test_unresolved_coordinates_are_allowed() {
        let mut plan = minimal_plan();
        plan.cutting_plan.regions[0].coordinates = None;
        assert!(validate_plan(&plan).is_ok());
    }

    #[test]
    fn test_rejects_empty_narration_text() {
        let mut plan = minimal_plan();
        plan.narration_script.segments[0].text = "   ".to_string();
        let err = validate_plan(&plan).unwrap_err();
        assert!(err.to_string().contains("empty text"), "got: {err}");
    }

    #[test]
    fn test_rejects_speaking_rate_out_of_range() {
        let mut plan = minimal_plan();
        plan.narration_script.segments[0].speaking_rate = 2.5;
        let err = validate_plan(&plan).unwrap_err();
        assert!(err.to_string().contains("speaking rate"), "got: {err}");
    }

    #[test]
    fn test_rejects_negative_actual_duration() {
        let mut plan = minimal_plan();
        plan.narration_script.segments[0].actual_duration = Some(-0.1);
        let err = validate_plan(&plan).unwrap_err();
        assert!(err.to_string().contains("negative actual duration"), "got: {err}");
    }

    #[test]
    fn test_rejects_empty_scene_prompt() {
        let mut plan = minimal_plan();
        plan.text_to_video_plan.segments[0].prompt = String::new();
        let err = validate_plan(&plan).unwrap_err();
        assert!(err.to_string().contains("empty prompt"), "got: {err}");
    }

    #[test]
    fn test_rejects_duplicate_workflow_entries() {
        let mut plan = minimal_plan();
        plan.processing_workflow.steps.push(StepPlanEntry {
            step: renderflow_types::workflow::StepId::CutImages,
            optional: false,
        });
        let err = validate_plan(&plan).unwrap_err();
        assert!(err.to_string().contains("duplicate workflow step"), "got: {err}");
    }

    // -----------------------------------------------------------------------
    // Filesystem roundtrip
    // -----------------------------------------------------------------------

    #[test]
    fn test_save_and_load_plan_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans/video_plan.json");

        let plan = minimal_plan();
        save_plan_file(&path, &plan).expect("should save");

        let loaded = load_plan_file(&path).expect("should load");
        assert_eq!(loaded.meta_info.title, "t");
        assert_eq!(loaded.processing_workflow.steps.len(), 5);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_plan_file(Path::new("/nonexistent/plan.json")).unwrap_err();
        assert!(matches!(err, PlanError::Io(_)));
    }
}
