//! Content-addressed cache keys and payload checksums.
//!
//! A key is the hex-encoded SHA-256 of the API name and the canonically
//! serialized request parameters. `serde_json` maps keep their keys sorted,
//! so identical requests hash identically across runs; that determinism is
//! what makes re-running a partially failed pipeline cheap.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// CacheKey
// ---------------------------------------------------------------------------

/// Content hash identifying one cached request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from an API name and its serialized parameters.
    pub fn derive(api_name: &str, params: &serde_json::Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(api_name.as_bytes());
        hasher.update([0u8]);
        // Canonical form: serde_json::Value maps are BTreeMaps, so the
        // string rendering is order-stable.
        hasher.update(params.to_string().as_bytes());
        Self(hex_encode(&hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Checksums
// ---------------------------------------------------------------------------

/// Hex-encoded SHA-256 of a payload, stored alongside each cache entry and
/// verified on read.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_requests_share_a_key() {
        let a = CacheKey::derive("tts.synthesize", &json!({"text": "hi", "voice": "alloy"}));
        let b = CacheKey::derive("tts.synthesize", &json!({"voice": "alloy", "text": "hi"}));
        // Key order in the literal differs; the canonical form does not.
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_params_differ() {
        let a = CacheKey::derive("tts.synthesize", &json!({"text": "hi"}));
        let b = CacheKey::derive("tts.synthesize", &json!({"text": "hello"}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_api_name_is_part_of_the_key() {
        let params = json!({"text": "hi"});
        let a = CacheKey::derive("tts.synthesize", &params);
        let b = CacheKey::derive("vision.analyze", &params);
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = CacheKey::derive("x", &json!({}));
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_checksum_detects_changes() {
        let a = checksum(b"payload");
        let b = checksum(b"payloae");
        assert_ne!(a, b);
        assert_eq!(a, checksum(b"payload"));
    }
}
