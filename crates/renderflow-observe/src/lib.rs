//! Observability setup for Renderflow.

pub mod tracing_setup;
