//! Infrastructure implementations for Renderflow.
//!
//! This crate implements the ports defined in `renderflow-core`:
//! - `cache` -- filesystem cache backend (category directory tree)
//! - `media` -- HTTP media service adapters, local image cropping, and
//!   ffmpeg composition
//! - `config` -- TOML configuration loading

pub mod cache;
pub mod config;
pub mod media;
