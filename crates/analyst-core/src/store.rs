//! Insertion-ordered key/value store bounded by entry count, cumulative
//! size and a fixed per-entry time-to-live.
//!
//! The store never runs callbacks itself. Every mutating call hands back the
//! entries it dropped as [`Evicted`] values so the owner can release whatever
//! those values hold after its lock is gone.
//!
//! Reads do not refresh recency: the oldest *inserted* entry is always the
//! first to go when a limit is exceeded, and an entry's age is measured from
//! its insertion only.

use indexmap::IndexMap;
use std::time::{Duration, Instant};

use crate::error::{AnalystError, Result};

/// Capacity and lifetime limits for a [`BoundedStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_entries: usize,
    /// Upper bound on the summed size of all live entries.
    pub max_bytes: usize,
    pub ttl: Duration,
}

impl StoreLimits {
    pub fn new(max_entries: usize, max_bytes: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            max_bytes,
            ttl,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(AnalystError::Validation("max_entries must be > 0".into()));
        }
        if self.max_bytes == 0 {
            return Err(AnalystError::Validation("max_bytes must be > 0".into()));
        }
        if self.ttl.is_zero() {
            return Err(AnalystError::Validation("ttl must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Dropped to make room under the count or size limit.
    Capacity,
    /// Older than the TTL.
    Expired,
    /// Overwritten by a `set` on the same key.
    Replaced,
    /// Never stored: larger than the whole size budget on its own, or the
    /// store admits no entries at all.
    Rejected,
    /// Removed by `clear`.
    Cleared,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Capacity => "capacity",
            EvictionReason::Expired => "expired",
            EvictionReason::Replaced => "replaced",
            EvictionReason::Rejected => "rejected",
            EvictionReason::Cleared => "cleared",
        }
    }
}

/// An entry that left the store.
#[derive(Debug)]
pub struct Evicted<V> {
    pub key: String,
    pub value: V,
    pub reason: EvictionReason,
}

struct StoredEntry<V> {
    value: V,
    size: usize,
    inserted_at: Instant,
}

pub struct BoundedStore<V> {
    entries: IndexMap<String, StoredEntry<V>>,
    limits: StoreLimits,
    total_bytes: usize,
}

impl<V> BoundedStore<V> {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            entries: IndexMap::new(),
            limits,
            total_bytes: 0,
        }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    /// Number of entries physically held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summed size of all held entries.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    fn is_expired(&self, entry: &StoredEntry<V>) -> bool {
        entry.inserted_at.elapsed() >= self.limits.ttl
    }

    /// Live value for `key`. Expired entries read as absent.
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|e| !self.is_expired(e))
            .map(|e| &e.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Remove `key` if it is present but past its TTL.
    pub fn remove_if_expired(&mut self, key: &str) -> Option<Evicted<V>> {
        let expired = self.entries.get(key).map(|e| self.is_expired(e))?;
        if !expired {
            return None;
        }
        self.remove(key, EvictionReason::Expired)
    }

    /// Drop every expired entry.
    pub fn purge_expired(&mut self) -> Vec<Evicted<V>> {
        // Same TTL for every entry and insertion order == age order, so the
        // expired entries form a prefix.
        let mut evicted = Vec::new();
        while let Some((_, first)) = self.entries.first() {
            if !self.is_expired(first) {
                break;
            }
            if let Some(e) = self.pop_oldest(EvictionReason::Expired) {
                evicted.push(e);
            }
        }
        evicted
    }

    /// Insert `value` under `key` with the given size, evicting as needed.
    ///
    /// Returns everything that left the store, including the new value
    /// itself when it alone exceeds `max_bytes` or `max_entries` is zero
    /// (reason `Rejected`).
    pub fn insert(&mut self, key: String, value: V, size: usize) -> Vec<Evicted<V>> {
        let mut evicted = Vec::new();

        if let Some(old) = self.remove(&key, EvictionReason::Replaced) {
            evicted.push(old);
        }

        if size > self.limits.max_bytes || self.limits.max_entries == 0 {
            evicted.push(Evicted {
                key,
                value,
                reason: EvictionReason::Rejected,
            });
            return evicted;
        }

        evicted.extend(self.purge_expired());

        while !self.entries.is_empty()
            && (self.entries.len() + 1 > self.limits.max_entries
                || self.total_bytes + size > self.limits.max_bytes)
        {
            match self.pop_oldest(EvictionReason::Capacity) {
                Some(e) => evicted.push(e),
                None => break,
            }
        }

        self.total_bytes += size;
        self.entries.insert(
            key,
            StoredEntry {
                value,
                size,
                inserted_at: Instant::now(),
            },
        );

        evicted
    }

    /// Remove every entry.
    pub fn clear(&mut self) -> Vec<Evicted<V>> {
        self.total_bytes = 0;
        self.entries
            .drain(..)
            .map(|(key, e)| Evicted {
                key,
                value: e.value,
                reason: EvictionReason::Cleared,
            })
            .collect()
    }

    /// Live entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries
            .iter()
            .filter(|(_, e)| !self.is_expired(e))
            .map(|(k, e)| (k, &e.value))
    }

    fn remove(&mut self, key: &str, reason: EvictionReason) -> Option<Evicted<V>> {
        let (key, entry) = self.entries.shift_remove_entry(key)?;
        self.total_bytes -= entry.size;
        Some(Evicted {
            key,
            value: entry.value,
            reason,
        })
    }

    fn pop_oldest(&mut self, reason: EvictionReason) -> Option<Evicted<V>> {
        let (key, entry) = self.entries.shift_remove_index(0)?;
        self.total_bytes -= entry.size;
        Some(Evicted {
            key,
            value: entry.value,
            reason,
        })
    }
}
