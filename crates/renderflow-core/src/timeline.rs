//! Timeline reconciliation.
//!
//! Planned segment durations are estimates; synthesis produces the real
//! ones. [`reconcile`] recomputes every segment's start from the effective
//! (actual-or-planned) durations. It is a pure function of its inputs so it
//! can be re-run whenever any actual duration changes without accumulating
//! drift, and it never fails: a divergence beyond tolerance only attaches a
//! [`TimelineDriftWarning`].

use std::collections::BTreeMap;

use renderflow_types::plan::NarrationScript;
use renderflow_types::timeline::{TimelineDriftWarning, TimelineEntry};

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Entries in segment order with `reconciled_start` populated.
    pub entries: Vec<TimelineEntry>,
    /// Sum of effective durations.
    pub total_duration: f64,
    /// Signed divergence from the planned total (reconciled - planned).
    pub drift: f64,
    /// Present when `|drift|` exceeds the tolerance. Non-fatal.
    pub warning: Option<TimelineDriftWarning>,
}

/// Recompute segment starts from effective durations.
///
/// Walks `planned` in order; each entry's `actual_duration` is taken from
/// `actual` when present (falling back to any value already on the entry,
/// then to the planned duration). The first entry starts at 0 and each
/// subsequent entry starts where the previous effective duration ends.
pub fn reconcile(
    planned: &[TimelineEntry],
    actual: &BTreeMap<String, f64>,
    tolerance: f64,
) -> Reconciliation {
    let mut entries = Vec::with_capacity(planned.len());
    let mut cursor = 0.0;
    let mut planned_total = 0.0;

    for entry in planned {
        let mut reconciled = entry.clone();
        if let Some(&duration) = actual.get(&entry.segment_id) {
            reconciled.actual_duration = Some(duration);
        }
        reconciled.reconciled_start = cursor;
        cursor += reconciled.effective_duration();
        planned_total += reconciled.planned_duration;
        entries.push(reconciled);
    }

    let total_duration = cursor;
    let drift = total_duration - planned_total;
    let warning = (drift.abs() > tolerance).then(|| TimelineDriftWarning {
        planned_total,
        reconciled_total: total_duration,
        drift,
        tolerance,
    });

    Reconciliation {
        entries,
        total_duration,
        drift,
        warning,
    }
}

/// Build planned timeline entries from a narration script, with planned
/// starts accumulated from planned durations.
pub fn entries_from_script(script: &NarrationScript) -> Vec<TimelineEntry> {
    let mut cursor = 0.0;
    script
        .segments
        .iter()
        .map(|segment| {
            let entry = TimelineEntry::planned(&segment.id, cursor, segment.planned_duration);
            cursor += segment.planned_duration;
            entry
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use renderflow_types::plan::AudioSegment;

    fn planned_entries(durations: &[f64]) -> Vec<TimelineEntry> {
        let mut cursor = 0.0;
        durations
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                let entry = TimelineEntry::planned(format!("seg-{i}"), cursor, d);
                cursor += d;
                entry
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Reference case: [2.0, 3.0, 2.5] planned, [2.4, 2.8, 2.5] actual
    // -----------------------------------------------------------------------

    #[test]
    fn test_reference_example() {
        let planned = planned_entries(&[2.0, 3.0, 2.5]);
        let actual = BTreeMap::from([
            ("seg-0".to_string(), 2.4),
            ("seg-1".to_string(), 2.8),
            ("seg-2".to_string(), 2.5),
        ]);

        let result = reconcile(&planned, &actual, 1.0);

        let starts: Vec<f64> = result.entries.iter().map(|e| e.reconciled_start).collect();
        assert!((starts[0] - 0.0).abs() < 1e-9);
        assert!((starts[1] - 2.4).abs() < 1e-9);
        assert!((starts[2] - 5.2).abs() < 1e-9);
        assert!((result.total_duration - 7.7).abs() < 1e-9);
        assert!((result.drift - 0.2).abs() < 1e-9);
        assert!(result.warning.is_none(), "0.2s drift is below 1.0s tolerance");
    }

    // -----------------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------------

    #[test]
    fn test_first_start_is_always_zero() {
        let planned = planned_entries(&[5.0, 1.0]);
        let result = reconcile(&planned, &BTreeMap::new(), 1.0);
        assert!((result.entries[0].reconciled_start - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_starts_are_cumulative_effective_durations() {
        let planned = planned_entries(&[1.0, 2.0, 3.0, 4.0]);
        // Only segment 1 has an actual duration.
        let actual = BTreeMap::from([("seg-1".to_string(), 2.5)]);
        let result = reconcile(&planned, &actual, 10.0);

        for i in 1..result.entries.len() {
            let prev = &result.entries[i - 1];
            let expected = prev.reconciled_start + prev.effective_duration();
            assert!(
                (result.entries[i].reconciled_start - expected).abs() < 1e-9,
                "entry {i} start mismatch"
            );
        }
        assert!((result.total_duration - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_total_equals_sum_of_effective_durations() {
        let planned = planned_entries(&[2.0, 3.0]);
        let actual = BTreeMap::from([("seg-0".to_string(), 1.5)]);
        let result = reconcile(&planned, &actual, 10.0);
        assert!((result.total_duration - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic_across_reruns() {
        let planned = planned_entries(&[2.0, 3.0, 2.5, 4.25]);
        let actual = BTreeMap::from([
            ("seg-0".to_string(), 2.4),
            ("seg-2".to_string(), 2.0),
        ]);
        let first = reconcile(&planned, &actual, 0.5);
        let second = reconcile(&planned, &actual, 0.5);
        assert_eq!(first, second);

        // Re-running on its own output does not accumulate drift.
        let third = reconcile(&first.entries, &actual, 0.5);
        assert_eq!(
            first.entries.iter().map(|e| e.reconciled_start).collect::<Vec<_>>(),
            third.entries.iter().map(|e| e.reconciled_start).collect::<Vec<_>>(),
        );
    }

    #[test]
    fn test_empty_timeline() {
        let result = reconcile(&[], &BTreeMap::new(), 1.0);
        assert!(result.entries.is_empty());
        assert!((result.total_duration - 0.0).abs() < 1e-9);
        assert!(result.warning.is_none());
    }

    // -----------------------------------------------------------------------
    // Drift warning
    // -----------------------------------------------------------------------

    #[test]
    fn test_drift_beyond_tolerance_warns_but_does_not_fail() {
        let planned = planned_entries(&[2.0, 2.0]);
        let actual = BTreeMap::from([
            ("seg-0".to_string(), 4.0),
            ("seg-1".to_string(), 4.0),
        ]);
        let result = reconcile(&planned, &actual, 1.0);

        let warning = result.warning.expect("4.0s drift must warn");
        assert!((warning.drift - 4.0).abs() < 1e-9);
        assert!((warning.planned_total - 4.0).abs() < 1e-9);
        assert!((warning.reconciled_total - 8.0).abs() < 1e-9);
        // The reconciled entries are still fully populated.
        assert!((result.entries[1].reconciled_start - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_drift_also_warns() {
        let planned = planned_entries(&[5.0]);
        let actual = BTreeMap::from([("seg-0".to_string(), 2.0)]);
        let result = reconcile(&planned, &actual, 1.0);
        let warning = result.warning.expect("shrinking timelines drift too");
        assert!((warning.drift + 3.0).abs() < 1e-9);
    }

    // -----------------------------------------------------------------------
    // entries_from_script
    // -----------------------------------------------------------------------

    #[test]
    fn test_entries_from_script_accumulates_planned_starts() {
        let script = NarrationScript {
            segments: vec![
                AudioSegment {
                    index: 0,
                    id: "intro".to_string(),
                    text: "a".to_string(),
                    voice: "alloy".to_string(),
                    speaking_rate: 1.0,
                    planned_duration: 2.0,
                    actual_duration: None,
                    audio_path: None,
                },
                AudioSegment {
                    index: 1,
                    id: "body".to_string(),
                    text: "b".to_string(),
                    voice: "alloy".to_string(),
                    speaking_rate: 1.0,
                    planned_duration: 3.0,
                    actual_duration: None,
                    audio_path: None,
                },
            ],
        };
        let entries = entries_from_script(&script);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].segment_id, "intro");
        assert!((entries[1].planned_start - 2.0).abs() < 1e-9);
        assert!(entries.iter().all(|e| e.actual_duration.is_none()));
    }
}
