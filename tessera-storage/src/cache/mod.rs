//! Two-tier entity cache.
//!
//! A process-local tier sits in front of an optional shared tier that other
//! processes can see. Reads return [`CacheRead<T>`], which carries the tier
//! that answered and when the value was cached.
//!
//! # Keys
//!
//! Every key is `<entity_type>:<hex sha-256>`. Entity keys digest the
//! primary-key values; prefetch keys digest the canonical form of the
//! query. The shared prefix lets one entity type be invalidated at once.
//!
//! # Example
//!
//! ```ignore
//! let coordinator = CacheCoordinator::new(executor, &config)
//!     .with_shared_backend(Arc::new(LmdbSharedCache::from_config(&config)?));
//! coordinator.register(users_schema);
//!
//! let user = coordinator.fetch_by_key("user", &[Value::Int(7)], &["name"]).await?;
//! ```

pub mod coordinator;
pub mod key;
pub mod lmdb_backend;
pub(crate) mod local;
pub mod memory_backend;
pub mod read;
pub mod traits;

pub use coordinator::{CacheCoordinator, CachePolicy};
pub use key::{CacheKey, PrefetchQuery};
pub use lmdb_backend::{LmdbCacheError, LmdbSharedCache};
pub use memory_backend::{MemoryBackendCounters, MemorySharedCache};
pub use read::{CacheRead, CacheTier};
pub use traits::{CacheResult, CacheStats, SharedCacheBackend};
