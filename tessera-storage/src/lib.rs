//! Tessera Storage - Relational Executor, Persistence and Caching
//!
//! Defines the relational executor abstraction, key-based entity
//! persistence on top of it, an in-memory executor for tests, and the
//! two-tier entity cache.

pub mod cache;
pub mod executor;
pub mod mock;
pub mod persistence;

pub use executor::{ColumnDescriptor, InsertOutcome, RelationalExecutor, SelectQuery};
pub use mock::MockExecutor;
pub use persistence::{check_key_arity, primary_key_criteria, EntityPersistence};

// Re-export cache types for callers that only need the coordinator
pub use cache::{
    CacheCoordinator, CacheKey, CachePolicy, CacheRead, CacheResult, CacheStats, CacheTier,
    LmdbCacheError, LmdbSharedCache, MemoryBackendCounters, MemorySharedCache, PrefetchQuery,
    SharedCacheBackend,
};
