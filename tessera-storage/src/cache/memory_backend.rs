//! In-process shared cache backend.
//!
//! Behaves like a plain key-value cache server: no key enumeration, so
//! prefix invalidation falls back to a full flush. Availability can be
//! switched off to exercise degraded paths, and every operation is counted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tessera_core::CacheError;

use super::traits::{CacheResult, SharedCacheBackend};

/// Operation counters for [`MemorySharedCache`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBackendCounters {
    pub adds: u64,
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub flushes: u64,
}

#[derive(Debug)]
pub struct MemorySharedCache {
    entries: RwLock<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
    available: AtomicBool,
    adds: AtomicU64,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    flushes: AtomicU64,
}

impl Default for MemorySharedCache {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            adds: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }
}

impl MemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn counters(&self) -> MemoryBackendCounters {
        MemoryBackendCounters {
            adds: self.adds.load(Ordering::SeqCst),
            gets: self.gets.load(Ordering::SeqCst),
            sets: self.sets.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            flushes: self.flushes.load(Ordering::SeqCst),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().map(|e| e.contains_key(key)).unwrap_or(false)
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::BackendUnavailable {
                reason: "memory backend switched off".to_string(),
            })
        }
    }
}

fn poisoned() -> CacheError {
    CacheError::BackendUnavailable {
        reason: "memory backend lock poisoned".to_string(),
    }
}

#[async_trait]
impl SharedCacheBackend for MemorySharedCache {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn add_if_absent(&self, key: &str, value: &[u8]) -> CacheResult<bool> {
        self.check_available()?;
        self.adds.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_vec(), Utc::now()));
        Ok(true)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<(Vec<u8>, DateTime<Utc>)>> {
        self.check_available()?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8], cached_at: DateTime<Utc>) -> CacheResult<()> {
        self.check_available()?;
        self.sets.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), (value.to_vec(), cached_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check_available()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(key).is_some())
    }

    async fn flush(&self) -> CacheResult<u64> {
        self.check_available()?;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }
}
