use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::Result;
use crate::store::{BoundedStore, StoreLimits};
use crate::types::SynthesisResult;

/// Number of encoded prompt characters kept by [`FingerprintStrategy::Prefix`].
pub const PROMPT_PREFIX_LEN: usize = 20;

/// How a (file identity, prompt) pair is turned into a cache key.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintStrategy {
    /// File key plus the first 20 characters of the base64-encoded prompt.
    /// Prompts that share their first 15 bytes collide.
    #[default]
    Prefix,
    /// File key plus the hex SHA-256 of the prompt.
    #[serde(rename = "sha256")]
    Digest,
}

impl FingerprintStrategy {
    pub fn fingerprint(&self, file_key: &str, prompt: &str) -> String {
        match self {
            FingerprintStrategy::Prefix => {
                let encoded = BASE64.encode(prompt.as_bytes());
                let end = encoded.len().min(PROMPT_PREFIX_LEN);
                format!("{}-{}", file_key, &encoded[..end])
            }
            FingerprintStrategy::Digest => {
                let digest = Sha256::digest(prompt.as_bytes());
                format!("{}-{}", file_key, hex::encode(digest))
            }
        }
    }
}

/// Default limits: 100 entries, 50 MiB of serialized results, one hour.
pub fn default_cache_limits() -> StoreLimits {
    StoreLimits::new(100, 50 * 1024 * 1024, Duration::from_secs(3600))
}

/// Point-in-time view of the cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub ttl: Duration,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Measured hit ratio over the cache's lifetime, 0 when nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Bounded cache of synthesis results keyed by fingerprint.
///
/// Entry size is the byte length of the result's JSON serialization.
pub struct ResultCache {
    inner: Mutex<BoundedStore<SynthesisResult>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            inner: Mutex::new(BoundedStore::new(limits)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoundedStore<SynthesisResult>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached result for `key`, if present and younger than the TTL.
    /// Does not extend the entry's life.
    pub fn get(&self, key: &str) -> Option<SynthesisResult> {
        let mut store = self.lock();
        store.remove_if_expired(key);
        let found = store.peek(key).cloned();
        drop(store);

        match found {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        let mut store = self.lock();
        store.remove_if_expired(key);
        store.contains(key)
    }

    /// Store `value` under `key`, evicting the oldest entries as needed.
    /// A result whose serialization alone exceeds the size budget is not stored.
    pub fn set(&self, key: &str, value: SynthesisResult) -> Result<()> {
        let size = serde_json::to_vec(&value)?.len();
        let evicted = self.lock().insert(key.to_string(), value, size);
        for e in &evicted {
            log::debug!("Result cache dropped an entry ({})", e.reason.as_str());
        }
        Ok(())
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.lock().clear().len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let mut store = self.lock();
        store.purge_expired();
        store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let mut store = self.lock();
        store.purge_expired();
        let limits = store.limits();
        CacheStats {
            entries: store.len(),
            total_bytes: store.total_bytes(),
            max_entries: limits.max_entries,
            max_bytes: limits.max_bytes,
            ttl: limits.ttl,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(default_cache_limits())
    }
}
