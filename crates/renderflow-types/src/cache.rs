//! Cache metadata types: categories, per-entry bookkeeping, and counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CacheCategory
// ---------------------------------------------------------------------------

/// Storage category of a cache entry. Each category maps to its own
/// directory in the persistent backend and carries its own TTL tier:
/// API responses are short-lived, processed image artifacts are kept for
/// days, scratch files for minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    ApiResponses,
    ProcessedImages,
    TempFiles,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 3] = [
        CacheCategory::ApiResponses,
        CacheCategory::ProcessedImages,
        CacheCategory::TempFiles,
    ];

    /// Directory name used by filesystem backends.
    pub fn dir_name(&self) -> &'static str {
        match self {
            CacheCategory::ApiResponses => "api_responses",
            CacheCategory::ProcessedImages => "processed_images",
            CacheCategory::TempFiles => "temp_files",
        }
    }
}

impl std::fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

// ---------------------------------------------------------------------------
// CacheEntryMeta
// ---------------------------------------------------------------------------

/// Bookkeeping for one live cache entry. The payload itself lives in the
/// backend; the index holds only this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryMeta {
    pub category: CacheCategory,
    pub created_at: DateTime<Utc>,
    /// Time-to-live in seconds from `created_at`.
    pub ttl_secs: u64,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the payload, verified on read.
    pub checksum: String,
    /// Last read or write, drives LRU eviction under size pressure.
    pub last_access: DateTime<Utc>,
}

impl CacheEntryMeta {
    /// Whether the entry has outlived its TTL as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_seconds() >= 0 && age.num_seconds() as u64 > self.ttl_secs
    }
}

// ---------------------------------------------------------------------------
// CacheStats
// ---------------------------------------------------------------------------

/// Snapshot of cache health counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
