//! LMDB-backed shared cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) as a memory-mapped key-value
//! store that several processes on one host can open at once.
//!
//! # Value Format
//!
//! `[cached_at millis: 8 bytes LE][payload]`
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get` and prefix scans
//! - Write transactions for `set`, `delete`, `flush` and `invalidate_prefix`
//! - One write transaction for the whole of `add_if_absent`, so the check and
//!   the insert are atomic

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tessera_core::CacheError;
use tracing::debug;

use super::traits::{CacheResult, SharedCacheBackend};

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes do not follow the value format.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Corrupt(reason) => CacheError::Deserialization { reason },
            other => CacheError::BackendUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed shared cache.
///
/// # Example
///
/// ```ignore
/// let backend = LmdbSharedCache::new("/var/cache/tessera", 100)?;
/// let coordinator = CacheCoordinator::new(executor, &config)
///     .with_shared_backend(Arc::new(backend));
/// ```
pub struct LmdbSharedCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LmdbSharedCache {
    /// Open the cache environment in `path`, creating the directory when
    /// needed. `max_size_mb` bounds the memory map.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Open using the LMDB settings of a [`TesseraConfig`](tessera_core::TesseraConfig).
    pub fn from_config(config: &tessera_core::TesseraConfig) -> Result<Self, LmdbCacheError> {
        let path = config.lmdb_path.as_ref().ok_or_else(|| {
            LmdbCacheError::EnvOpen("lmdb_path is not configured".to_string())
        })?;
        Self::new(path, config.lmdb_map_size_mb)
    }

    /// `(hits, misses)` observed by `get`.
    pub fn hit_counts(&self) -> (u64, u64) {
        (self.hits.load(Ordering::SeqCst), self.misses.load(Ordering::SeqCst))
    }

    pub fn entry_count(&self) -> Result<u64, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        self.db.len(&rtxn).map_err(txn_error)
    }

    fn encode(value: &[u8], cached_at: DateTime<Utc>) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + value.len());
        bytes.extend_from_slice(&cached_at.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(value);
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<(Vec<u8>, DateTime<Utc>), LmdbCacheError> {
        if bytes.len() < 8 {
            return Err(LmdbCacheError::Corrupt("entry shorter than its header".into()));
        }
        let timestamp_bytes: [u8; 8] = bytes[0..8]
            .try_into()
            .map_err(|_| LmdbCacheError::Corrupt("invalid timestamp".into()))?;
        let cached_at = DateTime::from_timestamp_millis(i64::from_le_bytes(timestamp_bytes))
            .ok_or_else(|| LmdbCacheError::Corrupt("timestamp out of range".into()))?;
        Ok((bytes[8..].to_vec(), cached_at))
    }

    /// Keys starting with `prefix`, collected in one read transaction.
    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(txn_error)? {
            let (key, _) = result.map_err(txn_error)?;
            if key.starts_with(prefix) {
                keys.push(key.to_vec());
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl SharedCacheBackend for LmdbSharedCache {
    async fn is_available(&self) -> bool {
        self.env.read_txn().is_ok()
    }

    async fn add_if_absent(&self, key: &str, value: &[u8]) -> CacheResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let present = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(txn_error)?
            .is_some();
        if present {
            wtxn.abort();
            return Ok(false);
        }
        self.db
            .put(&mut wtxn, key.as_bytes(), &Self::encode(value, Utc::now()))
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(true)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<(Vec<u8>, DateTime<Utc>)>> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        match self.db.get(&rtxn, key.as_bytes()).map_err(txn_error)? {
            Some(bytes) => {
                self.hits.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Self::decode(bytes)?))
            }
            None => {
                self.misses.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], cached_at: DateTime<Utc>) -> CacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &Self::encode(value, cached_at))
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    async fn flush(&self) -> CacheResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let removed = self.db.len(&wtxn).map_err(txn_error)?;
        self.db.clear(&mut wtxn).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        debug!(removed, "flushed lmdb cache");
        Ok(removed)
    }

    async fn invalidate_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let keys = self.collect_keys_with_prefix(prefix.as_bytes())?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut deleted = 0u64;
        for key in &keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_error)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;

        debug!(prefix, deleted, "invalidated lmdb cache prefix");
        Ok(deleted)
    }
}
