//! Filesystem cache backend.
//!
//! Payloads live in a directory tree keyed by category
//! (`api_responses/`, `processed_images/`, `temp_files/`), one file per
//! content hash. Writes go through a temp file and rename so a concurrent
//! reader never sees a half-written payload.

use std::path::PathBuf;

use renderflow_core::cache::{CacheBackend, CacheError, CacheKey};
use renderflow_types::cache::CacheCategory;

// ---------------------------------------------------------------------------
// FsCacheBackend
// ---------------------------------------------------------------------------

pub struct FsCacheBackend {
    root: PathBuf,
}

impl FsCacheBackend {
    /// Open (creating if needed) the cache directory tree under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        for category in CacheCategory::ALL {
            std::fs::create_dir_all(root.join(category.dir_name()))?;
        }
        Ok(Self { root })
    }

    fn payload_path(&self, category: CacheCategory, key: &CacheKey) -> PathBuf {
        self.root.join(category.dir_name()).join(key.as_str())
    }
}

impl CacheBackend for FsCacheBackend {
    fn read(&self, category: CacheCategory, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        match std::fs::read(self.payload_path(category, key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(
        &self,
        category: CacheCategory,
        key: &CacheKey,
        bytes: &[u8],
    ) -> Result<(), CacheError> {
        let path = self.payload_path(category, key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, category: CacheCategory, key: &CacheKey) -> Result<(), CacheError> {
        match std::fs::remove_file(self.payload_path(category, key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
