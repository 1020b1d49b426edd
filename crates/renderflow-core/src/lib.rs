//! Workflow engine core for Renderflow.
//!
//! This crate is the "brain" of the pipeline:
//! - `pipeline` -- step contract, dependency graph, sequential executor with
//!   retries, fail-fast, resume, and cancellation
//! - `timeline` -- pure timeline reconciliation against actual durations
//! - `cache` -- content-addressed response cache with TTL and LRU eviction
//! - `plan` -- plan document parsing, validation, filesystem load/save
//! - `media` -- the port external media services implement
//! - `env` -- per-run output directory context
//!
//! It depends only on `renderflow-types`; service and storage
//! implementations live in `renderflow-infra`.

pub mod cache;
pub mod env;
pub mod media;
pub mod pipeline;
pub mod plan;
pub mod timeline;
