//! Engine configuration.
//!
//! All knobs carry serde defaults so a partial (or absent) config file still
//! yields a working engine. The TTL tiers and the 10 GiB cache budget are
//! defaults here, not constants anywhere in the engine.

use serde::{Deserialize, Serialize};

use crate::cache::CacheCategory;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Top-level engine configuration, loaded from `renderflow.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for transient step failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum execution attempts per step (first attempt included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

/// Cache capacity and per-category TTL tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Total size budget across all live entries.
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,
    /// TTL for cached API responses (default 24 h).
    #[serde(default = "default_api_response_ttl_secs")]
    pub api_response_ttl_secs: u64,
    /// TTL for processed image artifacts (default 7 d).
    #[serde(default = "default_processed_image_ttl_secs")]
    pub processed_image_ttl_secs: u64,
    /// TTL for transient scratch files (default 1 h).
    #[serde(default = "default_temp_file_ttl_secs")]
    pub temp_file_ttl_secs: u64,
}

fn default_capacity_bytes() -> u64 {
    10 * 1024 * 1024 * 1024
}

fn default_api_response_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_processed_image_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_temp_file_ttl_secs() -> u64 {
    60 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: default_capacity_bytes(),
            api_response_ttl_secs: default_api_response_ttl_secs(),
            processed_image_ttl_secs: default_processed_image_ttl_secs(),
            temp_file_ttl_secs: default_temp_file_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// TTL in seconds for entries of the given category.
    pub fn ttl_secs_for(&self, category: CacheCategory) -> u64 {
        match category {
            CacheCategory::ApiResponses => self.api_response_ttl_secs,
            CacheCategory::ProcessedImages => self.processed_image_ttl_secs,
            CacheCategory::TempFiles => self.temp_file_ttl_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// TimelineConfig
// ---------------------------------------------------------------------------

/// Timeline reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Drift (seconds) between planned and reconciled totals above which a
    /// drift warning is raised.
    #[serde(default = "default_drift_tolerance_secs")]
    pub drift_tolerance_secs: f64,
}

fn default_drift_tolerance_secs() -> f64 {
    1.0
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            drift_tolerance_secs: default_drift_tolerance_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
