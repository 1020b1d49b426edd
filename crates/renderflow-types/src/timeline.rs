//! Timeline types: per-segment timing entries and the drift warning.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TimelineEntry
// ---------------------------------------------------------------------------

/// Timing of one narration segment on the reconciled timeline.
///
/// Entries are kept in segment order. Invariants maintained by the
/// reconciler: `reconciled_start` of the first entry is 0, and each later
/// entry starts where the previous entry's effective duration ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub segment_id: String,
    pub planned_start: f64,
    pub planned_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<f64>,
    #[serde(default)]
    pub reconciled_start: f64,
}

impl TimelineEntry {
    /// A planned entry with no actual duration yet.
    pub fn planned(segment_id: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            segment_id: segment_id.into(),
            planned_start: start,
            planned_duration: duration,
            actual_duration: None,
            reconciled_start: 0.0,
        }
    }

    /// Actual duration when known, planned otherwise.
    pub fn effective_duration(&self) -> f64 {
        self.actual_duration.unwrap_or(self.planned_duration)
    }
}

// ---------------------------------------------------------------------------
// TimelineDriftWarning
// ---------------------------------------------------------------------------

/// Raised (but never fatal) when the reconciled total diverges from the
/// planned total by more than the configured tolerance. Downstream
/// composition must accommodate the new total either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineDriftWarning {
    pub planned_total: f64,
    pub reconciled_total: f64,
    pub drift: f64,
    pub tolerance: f64,
}

impl std::fmt::Display for TimelineDriftWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reconciled timeline drifted {:.3}s from plan ({:.3}s -> {:.3}s, tolerance {:.3}s)",
            self.drift, self.planned_total, self.reconciled_total, self.tolerance
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
