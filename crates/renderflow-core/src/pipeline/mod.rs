//! The pipeline engine: step contract, dependency graph, retry policy, and
//! the sequential executor.
//!
//! - `step` -- the `PipelineStep` trait, outcomes, and step errors
//! - `steps` -- the five concrete steps and the typed registry
//! - `graph` -- dependency validation and deterministic execution order
//! - `retry` -- bounded exponential backoff for transient failures
//! - `executor` -- the scheduler: ordering, validation gating, retries,
//!   fail-fast, idempotent resume, cancellation, and the run record

pub mod executor;
pub mod graph;
pub mod retry;
pub mod step;
pub mod steps;
