//! Shared cache backend trait and coordinator statistics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tessera_core::CacheError;

/// Result type for shared backend calls.
pub type CacheResult<T> = Result<T, CacheError>;

/// The shared (cross-process) cache tier.
///
/// Values are opaque bytes; the coordinator owns their encoding. Every call
/// may fail, and the coordinator treats a failure as "tier unavailable for
/// this call".
///
/// # Key Format
///
/// Keys are `<entity_type>:<hex digest>` strings, so all keys of one entity
/// type share a prefix.
#[async_trait]
pub trait SharedCacheBackend: Send + Sync {
    /// Cheap liveness probe, consulted before each use.
    async fn is_available(&self) -> bool;

    /// Store `value` only if `key` is absent. Returns true when stored.
    async fn add_if_absent(&self, key: &str, value: &[u8]) -> CacheResult<bool>;

    /// The stored bytes and when they were stored.
    async fn get(&self, key: &str) -> CacheResult<Option<(Vec<u8>, DateTime<Utc>)>>;

    async fn set(&self, key: &str, value: &[u8], cached_at: DateTime<Utc>) -> CacheResult<()>;

    /// Remove `key`. Returns true when something was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove everything. Returns the number of removed entries when known.
    async fn flush(&self) -> CacheResult<u64>;

    /// Remove every key starting with `prefix`.
    ///
    /// Backends that cannot enumerate keys flush everything instead.
    async fn invalidate_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let _ = prefix;
        self.flush().await
    }
}

/// Statistics about coordinator cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered by the process-local tier.
    pub local_hits: u64,
    /// Reads answered by the shared tier.
    pub shared_hits: u64,
    /// Reads answered by neither tier.
    pub misses: u64,
    /// Number of entries currently in the local tier.
    pub local_entries: u64,
    /// Calls where the shared tier was unavailable or failed.
    pub shared_degradations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.shared_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            local_hits: 60,
            shared_hits: 20,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
