//! Shared domain types for Renderflow.
//!
//! This crate defines the plan document, workflow tracking types, cache
//! metadata, and engine configuration. It holds data and serde derives only;
//! behavior lives in `renderflow-core` and IO in `renderflow-infra`.

pub mod cache;
pub mod config;
pub mod plan;
pub mod timeline;
pub mod workflow;
