//! Dependency graph validation and deterministic execution ordering.
//!
//! Uses `petgraph` to model step dependencies as a directed graph.
//! Topological sort detects cycles before anything executes; depth-based
//! grouping then yields an order in which a step never precedes one of its
//! dependencies, with ties broken by pipeline declaration order so the
//! sequence is stable across runs.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use thiserror::Error;

use renderflow_types::workflow::{StepId, StepPlanEntry};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Structural configuration errors, all fatal before execution begins.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The dependency graph contains a cycle.
    #[error("cycle detected involving step '{0}'")]
    CycleDetected(StepId),

    /// A step appears more than once in the declared workflow.
    #[error("duplicate step entry: '{0}'")]
    DuplicateStep(StepId),

    /// An enabled step depends on a step that is not part of the run.
    #[error("step '{step}' depends on step '{dependency}' which is not part of the run")]
    MissingDependency { step: StepId, dependency: StepId },
}

// ---------------------------------------------------------------------------
// Entry validation
// ---------------------------------------------------------------------------

/// Reject duplicate entries and enabled steps whose dependencies are not
/// themselves enabled.
pub fn validate_entries(
    entries: &[StepPlanEntry],
    dependencies_of: impl Fn(StepId) -> &'static [StepId],
) -> Result<(), GraphError> {
    let mut seen = HashSet::new();
    for entry in entries {
        if !seen.insert(entry.step) {
            return Err(GraphError::DuplicateStep(entry.step));
        }
    }
    for entry in entries {
        for &dependency in dependencies_of(entry.step) {
            if !seen.contains(&dependency) {
                return Err(GraphError::MissingDependency {
                    step: entry.step,
                    dependency,
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Execution order
// ---------------------------------------------------------------------------

/// Compute a deterministic execution order for `steps`, given each step's
/// declared dependencies.
///
/// 1. Build a `DiGraph` with an edge from each dependency to its dependent.
/// 2. `petgraph::algo::toposort` verifies acyclicity.
/// 3. Compute each step's depth (max dependency depth + 1) and group by
///    depth; steps within a depth group are ordered by `StepId`.
///
/// Execution itself is strictly sequential: every step mutates the shared
/// plan and shared files, so the depth groups only serve determinism here.
pub fn execution_order(
    steps: &[(StepId, &'static [StepId])],
) -> Result<Vec<StepId>, GraphError> {
    if steps.is_empty() {
        return Ok(vec![]);
    }

    let index_of: HashMap<StepId, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (*id, i))
        .collect();

    let mut graph = DiGraph::<StepId, ()>::new();
    let nodes: Vec<_> = steps.iter().map(|(id, _)| graph.add_node(*id)).collect();

    for (id, deps) in steps {
        let to = index_of[id];
        for dep in *deps {
            let from = index_of.get(dep).copied().ok_or(GraphError::MissingDependency {
                step: *id,
                dependency: *dep,
            })?;
            graph.add_edge(nodes[from], nodes[to], ());
        }
    }

    let sorted = toposort(&graph, None)
        .map_err(|cycle| GraphError::CycleDetected(graph[cycle.node_id()]))?;

    // Depth of each step: roots are 0, dependents one past their deepest
    // dependency. Toposort order guarantees dependencies are seen first.
    let mut depths: HashMap<StepId, usize> = HashMap::new();
    for node in &sorted {
        let id = graph[*node];
        let (_, deps) = steps[index_of[&id]];
        let depth = deps
            .iter()
            .map(|dep| depths.get(dep).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        depths.insert(id, depth);
    }

    let mut groups: BTreeMap<usize, Vec<StepId>> = BTreeMap::new();
    for (id, _) in steps {
        groups.entry(depths[id]).or_default().push(*id);
    }

    let mut order = Vec::with_capacity(steps.len());
    for (_, mut group) in groups {
        group.sort();
        order.extend(group);
    }
    Ok(order)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use renderflow_types::workflow::StepId::*;

    /// The real pipeline's declared dependencies.
    fn pipeline_deps(step: StepId) -> &'static [StepId] {
        match step {
            CutImages => &[],
            SynthesizeAudio => &[],
            RecalculateTimeline => &[SynthesizeAudio],
            GenerateScenes => &[RecalculateTimeline],
            ComposeVideo => &[CutImages, SynthesizeAudio, GenerateScenes],
        }
    }

    fn entries(steps: &[StepId]) -> Vec<StepPlanEntry> {
        steps
            .iter()
            .map(|&step| StepPlanEntry { step, optional: false })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Execution order
    // -----------------------------------------------------------------------

    #[test]
    fn test_full_pipeline_order_is_deterministic() {
        let steps: Vec<(StepId, &'static [StepId])> =
            StepId::ALL.iter().map(|&id| (id, pipeline_deps(id))).collect();
        let order = execution_order(&steps).unwrap();
        assert_eq!(
            order,
            vec![
                CutImages,
                SynthesizeAudio,
                RecalculateTimeline,
                GenerateScenes,
                ComposeVideo
            ]
        );

        // Declaring the steps in reverse produces the same order.
        let reversed: Vec<(StepId, &'static [StepId])> = StepId::ALL
            .iter()
            .rev()
            .map(|&id| (id, pipeline_deps(id)))
            .collect();
        assert_eq!(execution_order(&reversed).unwrap(), order);
    }

    #[test]
    fn test_no_step_precedes_its_dependencies() {
        let steps: Vec<(StepId, &'static [StepId])> =
            StepId::ALL.iter().map(|&id| (id, pipeline_deps(id))).collect();
        let order = execution_order(&steps).unwrap();
        let position: HashMap<StepId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        for (id, deps) in &steps {
            for dep in *deps {
                assert!(
                    position[dep] < position[id],
                    "{dep} must come before {id}"
                );
            }
        }
    }

    #[test]
    fn test_cycle_is_detected() {
        // Synthetic cycle: compose -> cut -> compose.
        let steps: Vec<(StepId, &'static [StepId])> = vec![
            (CutImages, &[ComposeVideo]),
            (ComposeVideo, &[CutImages]),
        ];
        let err = execution_order(&steps).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected(_)), "got: {err}");
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let steps: Vec<(StepId, &'static [StepId])> = vec![(CutImages, &[CutImages])];
        let err = execution_order(&steps).unwrap_err();
        assert_eq!(err, GraphError::CycleDetected(CutImages));
    }

    #[test]
    fn test_empty_input() {
        assert!(execution_order(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_subset_order() {
        let steps: Vec<(StepId, &'static [StepId])> = vec![
            (SynthesizeAudio, pipeline_deps(SynthesizeAudio)),
            (RecalculateTimeline, pipeline_deps(RecalculateTimeline)),
        ];
        assert_eq!(
            execution_order(&steps).unwrap(),
            vec![SynthesizeAudio, RecalculateTimeline]
        );
    }

    // -----------------------------------------------------------------------
    // Entry validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_duplicate_entries_rejected() {
        let mut list = entries(&StepId::ALL);
        list.push(StepPlanEntry { step: CutImages, optional: true });
        let err = validate_entries(&list, pipeline_deps).unwrap_err();
        assert_eq!(err, GraphError::DuplicateStep(CutImages));
    }

    #[test]
    fn test_missing_dependency_rejected() {
        // RecalculateTimeline requires SynthesizeAudio, which is absent.
        let list = entries(&[CutImages, RecalculateTimeline]);
        let err = validate_entries(&list, pipeline_deps).unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingDependency {
                step: RecalculateTimeline,
                dependency: SynthesizeAudio,
            }
        );
    }

    #[test]
    fn test_complete_pipeline_validates() {
        assert!(validate_entries(&entries(&StepId::ALL), pipeline_deps).is_ok());
    }

    #[test]
    fn test_independent_subset_validates() {
        assert!(validate_entries(&entries(&[CutImages, SynthesizeAudio]), pipeline_deps).is_ok());
    }
}
