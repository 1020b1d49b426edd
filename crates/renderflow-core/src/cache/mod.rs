//! Content-addressed response cache with TTL and size-bounded eviction.
//!
//! [`ResponseCache`] keeps an in-memory index (a `DashMap`, so mutations are
//! serialized per key while distinct keys are read concurrently) over an
//! opaque [`CacheBackend`] that persists the payloads. Two independent
//! sweeps keep the cache bounded:
//!
//! - the TTL sweep drops entries older than their category's time-to-live,
//! - the capacity sweep runs after any `put` that pushes the live total over
//!   budget and evicts least-recently-used entries until back under,
//!   regardless of remaining TTL.
//!
//! Cache-layer failures never escape a lookup: a payload that cannot be
//! read, or whose checksum no longer matches, is evicted and reported as a
//! miss so the caller recomputes.

pub mod key;

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;

use renderflow_types::cache::{CacheCategory, CacheEntryMeta, CacheStats};
use renderflow_types::config::CacheConfig;

pub use key::{checksum, CacheKey};

// ---------------------------------------------------------------------------
// CacheBackend trait
// ---------------------------------------------------------------------------

/// Persistence boundary for cache payloads. The engine depends only on this
/// contract; the directory-tree implementation lives in `renderflow-infra`.
pub trait CacheBackend: Send + Sync {
    /// Read a payload. `Ok(None)` when the backend has no such entry.
    fn read(&self, category: CacheCategory, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write a payload, replacing any previous one for the key.
    fn write(&self, category: CacheCategory, key: &CacheKey, bytes: &[u8])
    -> Result<(), CacheError>;

    /// Remove a payload. Must be a no-op when the entry is already gone.
    fn remove(&self, category: CacheCategory, key: &CacheKey) -> Result<(), CacheError>;
}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Cache-layer failures. Lookup paths absorb these into misses; only `put`
/// surfaces backend write failures to the caller.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored payload failed its integrity check. Treated as a miss.
    #[error("cache entry '{0}' failed integrity check")]
    Corruption(String),
}

// ---------------------------------------------------------------------------
// ResponseCache
// ---------------------------------------------------------------------------

/// TTL + LRU-bounded cache over an arbitrary backend.
pub struct ResponseCache<B: CacheBackend> {
    backend: B,
    config: CacheConfig,
    index: DashMap<CacheKey, CacheEntryMeta>,
    total_bytes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<B: CacheBackend> ResponseCache<B> {
    pub fn new(backend: B, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            index: DashMap::new(),
            total_bytes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a payload. Expired, unreadable, and corrupted entries are
    /// evicted and reported as misses; errors never propagate from here.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let (category, expected_checksum) = match self.index.get(key) {
            Some(meta) => {
                if meta.is_expired(Utc::now()) {
                    drop(meta);
                    self.evict_key(key);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                (meta.category, meta.checksum.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let bytes = match self.backend.read(category, key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                // Index points at a payload the backend no longer has.
                self.evict_key(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "cache read failed, treating as miss");
                self.evict_key(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if checksum(&bytes) != expected_checksum {
            let err = CacheError::Corruption(key.to_string());
            tracing::warn!(key = %key, error = %err, "evicting corrupted cache entry");
            self.evict_key(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        if let Some(mut meta) = self.index.get_mut(key) {
            meta.last_access = Utc::now();
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(bytes)
    }

    /// Store a payload under the category's configured TTL, then enforce the
    /// capacity budget.
    pub fn put(
        &self,
        key: &CacheKey,
        category: CacheCategory,
        bytes: &[u8],
    ) -> Result<(), CacheError> {
        self.put_with_ttl(key, category, bytes, self.config.ttl_secs_for(category))
    }

    /// Store a payload with an explicit TTL.
    pub fn put_with_ttl(
        &self,
        key: &CacheKey,
        category: CacheCategory,
        bytes: &[u8],
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        self.backend.write(category, key, bytes)?;

        let now = Utc::now();
        let meta = CacheEntryMeta {
            category,
            created_at: now,
            ttl_secs,
            size_bytes: bytes.len() as u64,
            checksum: checksum(bytes),
            last_access: now,
        };

        if let Some(previous) = self.index.insert(key.clone(), meta) {
            self.total_bytes
                .fetch_sub(previous.size_bytes, Ordering::Relaxed);
        }
        self.total_bytes
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);

        if self.total_bytes.load(Ordering::Relaxed) > self.config.capacity_bytes {
            self.evict_to_capacity(self.config.capacity_bytes);
        }
        Ok(())
    }

    /// TTL sweep: drop every entry past its time-to-live. Returns the number
    /// of entries evicted.
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<CacheKey> = self
            .index
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let count = expired.len();
        for key in expired {
            self.evict_key(&key);
        }
        if count > 0 {
            tracing::debug!(evicted = count, "ttl sweep removed expired cache entries");
        }
        count
    }

    /// Capacity sweep: evict least-recently-used entries (TTL regardless)
    /// until the live total is within `max_bytes`. Returns the number of
    /// entries evicted.
    pub fn evict_to_capacity(&self, max_bytes: u64) -> usize {
        let mut by_age: Vec<(CacheKey, chrono::DateTime<Utc>)> = self
            .index
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_access))
            .collect();
        by_age.sort_by_key(|(_, last_access)| *last_access);

        let mut evicted = 0;
        for (key, _) in by_age {
            if self.total_bytes.load(Ordering::Relaxed) <= max_bytes {
                break;
            }
            if self.evict_key(&key) {
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::debug!(evicted, max_bytes, "capacity sweep evicted lru cache entries");
        }
        evicted
    }

    /// Counter and size snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.index.len() as u64,
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Remove one entry. The index removal is the atomic commit point: a
    /// concurrent reader either resolved the meta before this call (and is
    /// guarded by the payload checksum) or sees a plain miss.
    fn evict_key(&self, key: &CacheKey) -> bool {
        let Some((_, meta)) = self.index.remove(key) else {
            return false;
        };
        self.total_bytes.fetch_sub(meta.size_bytes, Ordering::Relaxed);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.backend.remove(meta.category, key) {
            tracing::warn!(key = %key, error = %err, "failed to remove evicted cache payload");
        }
        true
    }
}

// ---------------------------------------------------------------------------
// In-memory backend (tests and ephemeral runs)
// ---------------------------------------------------------------------------

/// Backend that keeps payloads in memory. Used by unit tests and available
/// for cache-less experimentation; production runs use the filesystem
/// backend from `renderflow-infra`.
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<(CacheCategory, CacheKey), Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn read(&self, category: CacheCategory, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self
            .entries
            .get(&(category, key.clone()))
            .map(|entry| entry.value().clone()))
    }

    fn write(
        &self,
        category: CacheCategory,
        key: &CacheKey,
        bytes: &[u8],
    ) -> Result<(), CacheError> {
        self.entries.insert((category, key.clone()), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, category: CacheCategory, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.remove(&(category, key.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn small_cache(capacity_bytes: u64) -> ResponseCache<MemoryBackend> {
        let config = CacheConfig {
            capacity_bytes,
            ..CacheConfig::default()
        };
        ResponseCache::new(MemoryBackend::new(), config)
    }

    fn key(n: u32) -> CacheKey {
        CacheKey::derive("test.op", &json!({ "n": n }))
    }

    // -----------------------------------------------------------------------
    // Put / get idempotence
    // -----------------------------------------------------------------------

    #[test]
    fn test_put_then_get_returns_identical_bytes() {
        let cache = small_cache(1024);
        let k = key(1);
        cache.put(&k, CacheCategory::ApiResponses, b"response body").unwrap();
        assert_eq!(cache.get(&k).as_deref(), Some(b"response body".as_slice()));
    }

    #[test]
    fn test_get_unknown_key_is_a_miss() {
        let cache = small_cache(1024);
        assert_eq!(cache.get(&key(99)), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let cache = small_cache(1024);
        let k = key(1);
        cache.put(&k, CacheCategory::ApiResponses, b"first").unwrap();
        cache.put(&k, CacheCategory::ApiResponses, b"second-longer").unwrap();
        assert_eq!(cache.get(&k).as_deref(), Some(b"second-longer".as_slice()));
        // Size accounting reflects only the live payload.
        assert_eq!(cache.stats().total_bytes, b"second-longer".len() as u64);
        assert_eq!(cache.stats().entries, 1);
    }

    // -----------------------------------------------------------------------
    // TTL expiry
    // -----------------------------------------------------------------------

    #[test]
    fn test_expired_entry_reads_as_miss_and_is_evicted() {
        let cache = small_cache(1024);
        let k = key(1);
        cache.put(&k, CacheCategory::ApiResponses, b"stale").unwrap();

        // Backdate the entry past its TTL.
        cache.index.get_mut(&k).unwrap().created_at = Utc::now() - Duration::days(2);

        assert_eq!(cache.get(&k), None);
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_ttl_sweep_respects_per_category_ttls() {
        let config = CacheConfig {
            capacity_bytes: 4096,
            api_response_ttl_secs: 60,
            processed_image_ttl_secs: 3600,
            ..CacheConfig::default()
        };
        let cache = ResponseCache::new(MemoryBackend::new(), config);

        let short = key(1);
        let long = key(2);
        cache.put(&short, CacheCategory::ApiResponses, b"short ttl").unwrap();
        cache.put(&long, CacheCategory::ProcessedImages, b"long ttl").unwrap();

        // Age both entries by ten minutes: past the API TTL, inside the
        // processed-image TTL.
        let aged = Utc::now() - Duration::minutes(10);
        cache.index.get_mut(&short).unwrap().created_at = aged;
        cache.index.get_mut(&long).unwrap().created_at = aged;

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.get(&short), None);
        assert!(cache.get(&long).is_some());
    }

    // -----------------------------------------------------------------------
    // Capacity / LRU eviction
    // -----------------------------------------------------------------------

    #[test]
    fn test_capacity_sweep_evicts_least_recently_used() {
        let cache = small_cache(30);
        let (a, b, c) = (key(1), key(2), key(3));

        cache.put(&a, CacheCategory::ApiResponses, &[0u8; 10]).unwrap();
        cache.put(&b, CacheCategory::ApiResponses, &[0u8; 10]).unwrap();
        cache.index.get_mut(&a).unwrap().last_access = Utc::now() - Duration::seconds(30);
        cache.index.get_mut(&b).unwrap().last_access = Utc::now() - Duration::seconds(20);

        // Third put exceeds the 30-byte budget; `a` is the oldest access.
        cache.put(&c, CacheCategory::ApiResponses, &[0u8; 15]).unwrap();

        assert_eq!(cache.get(&a), None, "lru entry should be evicted");
        assert!(cache.get(&b).is_some());
        assert!(cache.get(&c).is_some());
        assert!(cache.stats().total_bytes <= 30);
    }

    #[test]
    fn test_capacity_invariant_holds_after_every_put() {
        let cache = small_cache(64);
        for n in 0..20 {
            cache.put(&key(n), CacheCategory::TempFiles, &[0u8; 16]).unwrap();
            assert!(
                cache.stats().total_bytes <= 64,
                "capacity exceeded after put {n}"
            );
        }
    }

    #[test]
    fn test_recently_read_entry_survives_capacity_pressure() {
        let cache = small_cache(30);
        let (a, b) = (key(1), key(2));
        cache.put(&a, CacheCategory::ApiResponses, &[0u8; 10]).unwrap();
        cache.put(&b, CacheCategory::ApiResponses, &[0u8; 10]).unwrap();
        cache.index.get_mut(&a).unwrap().last_access = Utc::now() - Duration::seconds(60);
        cache.index.get_mut(&b).unwrap().last_access = Utc::now() - Duration::seconds(60);

        // Reading `a` refreshes its LRU position.
        assert!(cache.get(&a).is_some());

        cache.put(&key(3), CacheCategory::ApiResponses, &[0u8; 15]).unwrap();
        assert!(cache.get(&a).is_some(), "recently read entry was evicted");
        assert_eq!(cache.get(&b), None);
    }

    // -----------------------------------------------------------------------
    // Corruption handling
    // -----------------------------------------------------------------------

    #[test]
    fn test_corrupted_payload_degrades_to_miss() {
        let cache = small_cache(1024);
        let k = key(1);
        cache.put(&k, CacheCategory::ApiResponses, b"pristine").unwrap();

        // Corrupt the stored payload behind the index's back.
        cache
            .backend
            .entries
            .insert((CacheCategory::ApiResponses, k.clone()), b"tampered".to_vec());

        assert_eq!(cache.get(&k), None);
        // The entry is gone; a recompute-and-put works again.
        cache.put(&k, CacheCategory::ApiResponses, b"fresh").unwrap();
        assert_eq!(cache.get(&k).as_deref(), Some(b"fresh".as_slice()));
    }

    #[test]
    fn test_missing_backend_payload_degrades_to_miss() {
        let cache = small_cache(1024);
        let k = key(1);
        cache.put(&k, CacheCategory::ApiResponses, b"bytes").unwrap();
        cache
            .backend
            .entries
            .remove(&(CacheCategory::ApiResponses, k.clone()));

        assert_eq!(cache.get(&k), None);
        assert_eq!(cache.stats().entries, 0);
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = small_cache(1024);
        let k = key(1);
        cache.put(&k, CacheCategory::ApiResponses, b"x").unwrap();
        cache.get(&k);
        cache.get(&k);
        cache.get(&key(2));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }
}
