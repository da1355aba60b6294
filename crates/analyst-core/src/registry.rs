use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::store::{BoundedStore, EvictionReason, Evicted, StoreLimits};
use crate::types::FileRecord;

/// Default limits: 50 files, 100 MiB of uploads, 24 hours.
pub fn default_registry_limits() -> StoreLimits {
    StoreLimits::new(50, 100 * 1024 * 1024, Duration::from_secs(24 * 3600))
}

/// Called once for every record that leaves the registry.
///
/// Runs synchronously inside the registry call that caused the eviction.
/// Errors are logged by the registry and never reach its caller.
pub trait EvictionHook: Send + Sync {
    fn on_evict(&self, key: &str, record: &FileRecord, reason: EvictionReason)
        -> std::io::Result<()>;
}

/// Deletes the stored bytes of evicted records.
pub struct RemoveStoredFile;

impl EvictionHook for RemoveStoredFile {
    fn on_evict(
        &self,
        _key: &str,
        record: &FileRecord,
        _reason: EvictionReason,
    ) -> std::io::Result<()> {
        match std::fs::remove_file(&record.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Leaves stored bytes alone.
pub struct KeepStoredFile;

impl EvictionHook for KeepStoredFile {
    fn on_evict(&self, _: &str, _: &FileRecord, _: EvictionReason) -> std::io::Result<()> {
        Ok(())
    }
}

/// Metadata for received files, keyed by `name-size`, with the same count,
/// size and TTL bounds as the result cache. Record size is the file's byte
/// length.
pub struct FileRegistry {
    inner: Mutex<BoundedStore<FileRecord>>,
    hook: Box<dyn EvictionHook>,
}

impl FileRegistry {
    /// Registry that deletes stored files on eviction.
    pub fn new(limits: StoreLimits) -> Self {
        Self::with_hook(limits, RemoveStoredFile)
    }

    pub fn with_hook(limits: StoreLimits, hook: impl EvictionHook + 'static) -> Self {
        Self {
            inner: Mutex::new(BoundedStore::new(limits)),
            hook: Box::new(hook),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoundedStore<FileRecord>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `record` under its identity key. Returns `false` when the
    /// record alone exceeds the size budget and was discarded instead.
    pub fn put(&self, record: FileRecord) -> bool {
        let key = record.key();
        let size = usize::try_from(record.size).unwrap_or(usize::MAX);
        let new_path = record.path.clone();

        let evicted = self.lock().insert(key, record, size);
        let rejected = evicted
            .iter()
            .any(|e| e.reason == EvictionReason::Rejected);

        // Re-registering the very same stored file must not delete it.
        let evicted = evicted
            .into_iter()
            .filter(|e| !(e.reason == EvictionReason::Replaced && e.value.path == new_path))
            .collect();
        self.dispose(evicted);

        !rejected
    }

    pub fn get(&self, key: &str) -> Option<FileRecord> {
        let mut store = self.lock();
        let expired = store.remove_if_expired(key);
        let found = store.peek(key).cloned();
        drop(store);

        if let Some(e) = expired {
            self.dispose(vec![e]);
        }
        found
    }

    /// Live records in registration order.
    pub fn list(&self) -> Vec<(String, FileRecord)> {
        let mut store = self.lock();
        let expired = store.purge_expired();
        let records = store
            .iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        drop(store);

        self.dispose(expired);
        records
    }

    pub fn len(&self) -> usize {
        let mut store = self.lock();
        let expired = store.purge_expired();
        let len = store.len();
        drop(store);

        self.dispose(expired);
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes()
    }

    fn dispose(&self, evicted: Vec<Evicted<FileRecord>>) {
        for e in evicted {
            match self.hook.on_evict(&e.key, &e.value, e.reason) {
                Ok(()) => log::info!(
                    "Released file {} ({})",
                    e.value.original_name,
                    e.reason.as_str()
                ),
                Err(err) => log::error!(
                    "Failed to release file {}: {}",
                    e.value.original_name,
                    err
                ),
            }
        }
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new(default_registry_limits())
    }
}
