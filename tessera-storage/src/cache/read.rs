//! Cache read results.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Which tier answered a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Local,
    Shared,
}

/// A cached value together with the tier that answered and the time it was
/// first cached. A shared-tier value copied into the local tier keeps its
/// original timestamp.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: DateTime<Utc>,
    tier: CacheTier,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, cached_at: DateTime<Utc>, tier: CacheTier) -> Self {
        Self {
            value,
            cached_at,
            tier,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    pub fn tier(&self) -> CacheTier {
        self.tier
    }

    /// Time since caching; zero for timestamps from a skewed future clock.
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn is_older_than(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}
