//! The two-tier cache coordinator.
//!
//! Reads consult the process-local tier, then the shared tier, then storage.
//! Writes go through the mutation hooks, which keep both tiers consistent
//! with storage:
//!
//! - on a namespace with prefetch caching, any mutation drops every cached
//!   entry of the namespace (coarse invalidation), since no cached result
//!   set can be proven unaffected;
//! - otherwise only the touched key is dropped or re-cached.
//!
//! Shared-tier failures never surface. Each failing call is logged and
//! counted, and the coordinator carries on with the local tier alone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::{
    CacheError, CastingConfig, ConfigError, Entity, EntitySchema, EntitySnapshot, PrefetchTier,
    SchemaError, TesseraConfig, TesseraResult, Value,
};
use tokio::sync::Mutex;

use super::key::{CacheKey, PrefetchQuery};
use super::local::{LocalSlot, LocalTier};
use super::read::{CacheRead, CacheTier};
use super::traits::{CacheStats, SharedCacheBackend};
use crate::executor::RelationalExecutor;
use crate::persistence::{check_key_arity, EntityPersistence};

/// Stored in the shared tier by the existence probe.
const PLACEHOLDER: &[u8] = b"";

/// Caching policy of one entity-type namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub use_shared_cache: bool,
    pub prefetch: PrefetchTier,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from_config(&TesseraConfig::default())
    }
}

impl CachePolicy {
    pub fn from_config(config: &TesseraConfig) -> Self {
        Self {
            use_shared_cache: config.use_shared_cache,
            prefetch: config.prefetch,
        }
    }

    pub fn local_only() -> Self {
        Self {
            use_shared_cache: false,
            prefetch: PrefetchTier::Disabled,
        }
    }

    pub fn with_shared_cache(mut self, enabled: bool) -> Self {
        self.use_shared_cache = enabled;
        self
    }

    pub fn with_prefetch(mut self, tier: PrefetchTier) -> Self {
        self.prefetch = tier;
        self
    }
}

struct Namespace {
    schema: Arc<EntitySchema>,
    policy: CachePolicy,
    writes: Mutex<()>,
}

/// Shared-tier wire form. Result sets carry the canonical query input so a
/// digest collision reads as a miss.
#[derive(Debug, Serialize, Deserialize)]
enum SharedPayload {
    Entity(EntitySnapshot),
    Rows { input: String, rows: Vec<EntitySnapshot> },
}

fn encode_payload(payload: &SharedPayload) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(payload).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })
}

fn decode_payload(bytes: &[u8]) -> Result<Option<SharedPayload>, CacheError> {
    if bytes == PLACEHOLDER {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| CacheError::Deserialization {
            reason: e.to_string(),
        })
}

fn restore(schema: &Arc<EntitySchema>, snapshot: EntitySnapshot) -> Result<Arc<Entity>, CacheError> {
    Entity::from_snapshot(schema.clone(), snapshot)
        .map(Arc::new)
        .map_err(|e| CacheError::Deserialization {
            reason: e.to_string(),
        })
}

enum Lookup {
    Hit(CacheRead<Arc<Entity>>),
    /// A negative marker answered the read.
    Missing,
    Miss,
}

#[derive(Debug, Default)]
struct Counters {
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    misses: AtomicU64,
    degradations: AtomicU64,
}

/// Coordinates the process-local and shared cache tiers over entity reads,
/// writes, deletes and prefetch result sets.
pub struct CacheCoordinator {
    persistence: EntityPersistence,
    shared: Option<Arc<dyn SharedCacheBackend>>,
    local: LocalTier,
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
    defaults: CachePolicy,
    casting: CastingConfig,
    counters: Counters,
}

impl CacheCoordinator {
    pub fn new(executor: Arc<dyn RelationalExecutor>, config: &TesseraConfig) -> Self {
        Self {
            persistence: EntityPersistence::new(executor),
            shared: None,
            local: LocalTier::new(),
            namespaces: RwLock::new(HashMap::new()),
            defaults: CachePolicy::from_config(config),
            casting: config.casting,
            counters: Counters::default(),
        }
    }

    pub fn with_shared_backend(mut self, backend: Arc<dyn SharedCacheBackend>) -> Self {
        self.shared = Some(backend);
        self
    }

    pub fn persistence(&self) -> &EntityPersistence {
        &self.persistence
    }

    /// Register an entity type with the configured default policy.
    pub fn register(&self, schema: impl Into<Arc<EntitySchema>>) -> Arc<EntitySchema> {
        self.register_with_policy(schema, self.defaults)
    }

    /// Register an entity type. Re-registering replaces the schema and
    /// policy; cached entries are kept.
    pub fn register_with_policy(
        &self,
        schema: impl Into<Arc<EntitySchema>>,
        policy: CachePolicy,
    ) -> Arc<EntitySchema> {
        let schema = schema.into();
        let namespace = Arc::new(Namespace {
            schema: schema.clone(),
            policy,
            writes: Mutex::new(()),
        });
        self.namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema.entity_type().to_string(), namespace);
        tracing::debug!(
            entity_type = schema.entity_type(),
            shared = policy.use_shared_cache,
            prefetch = ?policy.prefetch,
            "Registered cache namespace"
        );
        schema
    }

    pub fn schema(&self, entity_type: &str) -> TesseraResult<Arc<EntitySchema>> {
        Ok(self.namespace(entity_type)?.schema.clone())
    }

    pub fn policy(&self, entity_type: &str) -> TesseraResult<CachePolicy> {
        Ok(self.namespace(entity_type)?.policy)
    }

    /// The cache key of the `entity_type` entity with primary key `key`.
    pub fn key_for(&self, entity_type: &str, key: &[Value]) -> TesseraResult<CacheKey> {
        let ns = self.namespace(entity_type)?;
        Self::entity_key(&ns, key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            shared_hits: self.counters.shared_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            local_entries: self.local.len() as u64,
            shared_degradations: self.counters.degradations.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Find a cached entity. Storage is never consulted.
    pub async fn lookup_by_key(
        &self,
        entity_type: &str,
        key: &[Value],
    ) -> TesseraResult<Option<CacheRead<Arc<Entity>>>> {
        let ns = self.namespace(entity_type)?;
        let cache_key = Self::entity_key(&ns, key)?;
        Ok(match self.lookup(&ns, &cache_key).await {
            Lookup::Hit(read) => Some(read),
            Lookup::Missing | Lookup::Miss => None,
        })
    }

    /// Whether the entity exists, answered from the cheapest source that
    /// can answer it. Storage is asked only when the shared tier is disabled
    /// or unavailable.
    pub async fn exists_by_key(&self, entity_type: &str, key: &[Value]) -> TesseraResult<bool> {
        let ns = self.namespace(entity_type)?;
        let cache_key = Self::entity_key(&ns, key)?;

        if let Some(entry) = self.local.get(&cache_key) {
            match entry.slot {
                LocalSlot::Entity(_) => return Ok(true),
                LocalSlot::Missing => return Ok(false),
                LocalSlot::Rows(_) => {}
            }
        }

        if let Some(shared) = self.shared_tier(ns.policy.use_shared_cache).await {
            match shared.add_if_absent(cache_key.as_str(), PLACEHOLDER).await {
                Ok(false) => return Ok(true),
                // the add succeeded, so nothing was cached under the key
                Ok(true) => {
                    if let Err(e) = shared.delete(cache_key.as_str()).await {
                        self.degrade("delete", &cache_key, &e);
                    }
                    return Ok(false);
                }
                Err(e) => self.degrade("add_if_absent", &cache_key, &e),
            }
        }

        self.persistence.exists(&ns.schema, key).await
    }

    /// Read-through fetch of `attributes` (every attribute when empty).
    ///
    /// A cached entity that is sparse for the request is completed with
    /// exactly the missing attributes and re-cached. A row that does not
    /// exist is remembered with a local negative marker.
    pub async fn fetch_by_key<S: AsRef<str>>(
        &self,
        entity_type: &str,
        key: &[Value],
        attributes: &[S],
    ) -> TesseraResult<Option<Arc<Entity>>> {
        let ns = self.namespace(entity_type)?;
        let cache_key = Self::entity_key(&ns, key)?;
        let strict = self.casting.strict_validation;
        let use_shared = ns.policy.use_shared_cache;

        let requested: Vec<String> = if attributes.is_empty() {
            ns.schema.attribute_names().into_iter().map(str::to_string).collect()
        } else {
            let mut names = Vec::with_capacity(attributes.len());
            for a in attributes {
                let name = a.as_ref();
                if !ns.schema.has_attribute(name) {
                    return Err(SchemaError::UnknownAttribute {
                        entity_type: entity_type.to_string(),
                        attribute: name.to_string(),
                    }
                    .into());
                }
                names.push(name.to_string());
            }
            names
        };

        match self.lookup(&ns, &cache_key).await {
            Lookup::Missing => Ok(None),
            Lookup::Hit(read) => {
                let cached = read.into_value();
                if !cached.is_sparse(&requested) {
                    return Ok(Some(cached));
                }

                let missing = cached.missing_attributes(&requested);
                tracing::debug!(
                    entity_type,
                    key = %cache_key,
                    missing = ?missing,
                    "Completing sparse cached entity"
                );
                match self.persistence.select_by_key(&ns.schema, key, &missing).await? {
                    Some(row) => {
                        let mut merged = Entity::clone(&cached);
                        merged.on_attributes_retrieved(row, strict)?;
                        Ok(Some(self.put(merged, use_shared, true).await?))
                    }
                    None => {
                        self.remember_missing(&ns, &cache_key, Some(&cached)).await;
                        Ok(None)
                    }
                }
            }
            Lookup::Miss => {
                let columns: &[String] = if attributes.is_empty() { &[] } else { &requested };
                match self.persistence.select_by_key(&ns.schema, key, columns).await? {
                    Some(row) => {
                        let entity = Entity::from_row(ns.schema.clone(), row, strict)?;
                        Ok(Some(self.put(entity, use_shared, false).await?))
                    }
                    None => {
                        self.remember_missing(&ns, &cache_key, None).await;
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Run `query` against `entity_type`, reusing a cached result set when
    /// prefetch caching is enabled for the namespace.
    pub async fn prefetch(
        &self,
        entity_type: &str,
        query: &PrefetchQuery,
    ) -> TesseraResult<Vec<Arc<Entity>>> {
        let ns = self.namespace(entity_type)?;
        let policy = ns.policy;

        if !policy.prefetch.is_enabled() {
            let rows = self.run_query(&ns, query).await?;
            return self.cache_query_result(rows, policy.use_shared_cache).await;
        }

        let key = CacheKey::for_prefetch(entity_type, query);
        if let Some(rows) = self.cached_rows(&ns, &key).await {
            tracing::debug!(entity_type, key = %key, rows = rows.len(), "Prefetch served from cache");
            return self
                .cache_query_result(rows.iter().cloned(), policy.use_shared_cache)
                .await;
        }

        let rows = self.run_query(&ns, query).await?;
        let entities = self.cache_query_result(rows, policy.use_shared_cache).await?;

        let _guard = ns.writes.lock().await;
        let now = Utc::now();
        match policy.prefetch {
            PrefetchTier::Shared => {
                // a local copy would outlive invalidations made by other coordinators
                if let Some(shared) = self.shared_tier(true).await {
                    let snapshots = entities.iter().map(|e| e.snapshot()).collect();
                    match encode_payload(&SharedPayload::Rows {
                        input: key.input().to_string(),
                        rows: snapshots,
                    }) {
                        Ok(bytes) => {
                            if let Err(e) = shared.set(key.as_str(), &bytes, now).await {
                                self.degrade("set", &key, &e);
                            }
                        }
                        Err(e) => self.degrade("encode", &key, &e),
                    }
                }
            }
            PrefetchTier::Local | PrefetchTier::Disabled => {
                self.local
                    .insert_at(&key, LocalSlot::Rows(Arc::new(entities.clone())), now);
            }
        }
        Ok(entities)
    }

    // ========================================================================
    // CACHE WRITES
    // ========================================================================

    /// Cache an entity.
    ///
    /// Without `overwrite`, an entity already cached under the same key in
    /// an enabled tier wins and is returned instead.
    pub async fn put(
        &self,
        entity: impl Into<Arc<Entity>>,
        use_shared_cache: bool,
        overwrite: bool,
    ) -> TesseraResult<Arc<Entity>> {
        let entity = entity.into();
        let ns = self.namespace(entity.entity_type())?;
        let _guard = ns.writes.lock().await;
        self.put_locked(&ns, entity, use_shared_cache, overwrite).await
    }

    /// Non-overwriting [`put`](Self::put) of every row, in order.
    pub async fn cache_query_result<I, E>(
        &self,
        rows: I,
        use_shared_cache: bool,
    ) -> TesseraResult<Vec<Arc<Entity>>>
    where
        I: IntoIterator<Item = E>,
        E: Into<Arc<Entity>>,
    {
        let rows = rows.into_iter();
        let mut cached = Vec::with_capacity(rows.size_hint().0);
        for row in rows {
            cached.push(self.put(row, use_shared_cache, false).await?);
        }
        Ok(cached)
    }

    /// Drop one key from the local tier and, if requested, the shared tier.
    pub async fn invalidate(&self, key: &CacheKey, use_shared_cache: bool) -> TesseraResult<()> {
        let ns = self.namespace(key.entity_type())?;
        let _guard = ns.writes.lock().await;
        self.invalidate_locked(key, use_shared_cache).await;
        Ok(())
    }

    /// Drop every cached entry of `entity_type`.
    pub async fn invalidate_all(&self, entity_type: &str, use_shared_cache: bool) -> TesseraResult<()> {
        let ns = self.namespace(entity_type)?;
        let _guard = ns.writes.lock().await;
        self.invalidate_namespace_locked(&ns, use_shared_cache).await;
        Ok(())
    }

    // ========================================================================
    // MUTATION HOOKS
    // ========================================================================

    /// Persist a new entity and cache it as stored.
    pub async fn on_create(&self, entity: Entity) -> TesseraResult<Arc<Entity>> {
        let ns = self.namespace(entity.entity_type())?;
        let _guard = ns.writes.lock().await;
        let use_shared = ns.policy.use_shared_cache;

        if ns.policy.prefetch.is_enabled() {
            self.invalidate_namespace_locked(&ns, use_shared).await;
        } else if let Ok(key) = Self::entity_key(&ns, &entity.primary_key_values()) {
            self.invalidate_locked(&key, use_shared).await;
        }

        let stored = self
            .persistence
            .insert(&entity, self.casting.strict_validation)
            .await?;
        tracing::debug!(entity_type = entity.entity_type(), uuid = %stored.uuid(), "Created entity");
        self.put_locked(&ns, Arc::new(stored), use_shared, true).await
    }

    /// Persist changes to an entity and publish it to the cache.
    pub async fn on_update(&self, entity: Entity) -> TesseraResult<Arc<Entity>> {
        let ns = self.namespace(entity.entity_type())?;
        let _guard = ns.writes.lock().await;
        let use_shared = ns.policy.use_shared_cache;

        let affected = self.persistence.update(&entity).await?;
        tracing::debug!(entity_type = entity.entity_type(), uuid = %entity.uuid(), affected, "Updated entity");

        if ns.policy.prefetch.is_enabled() {
            self.invalidate_namespace_locked(&ns, use_shared).await;
        }
        self.put_locked(&ns, Arc::new(entity), use_shared, true).await
    }

    /// Invalidate, then delete the entity from storage. Returns the number
    /// of deleted rows.
    pub async fn on_delete(&self, entity_type: &str, key: &[Value]) -> TesseraResult<u64> {
        let ns = self.namespace(entity_type)?;
        let cache_key = Self::entity_key(&ns, key)?;
        let _guard = ns.writes.lock().await;
        let use_shared = ns.policy.use_shared_cache;

        if ns.policy.prefetch.is_enabled() {
            self.invalidate_namespace_locked(&ns, use_shared).await;
        } else {
            self.invalidate_locked(&cache_key, use_shared).await;
        }

        let affected = self.persistence.delete(&ns.schema, key).await?;
        tracing::debug!(entity_type, key = %cache_key, affected, "Deleted entity");
        Ok(affected)
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn namespace(&self, entity_type: &str) -> TesseraResult<Arc<Namespace>> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_type)
            .cloned()
            .ok_or_else(|| {
                ConfigError::UnknownEntityType {
                    entity_type: entity_type.to_string(),
                }
                .into()
            })
    }

    fn entity_key(ns: &Namespace, key: &[Value]) -> TesseraResult<CacheKey> {
        check_key_arity(&ns.schema, key)?;
        Ok(CacheKey::for_entity(ns.schema.entity_type(), key))
    }

    /// The shared backend, if requested, configured, and answering its probe.
    async fn shared_tier(&self, requested: bool) -> Option<&Arc<dyn SharedCacheBackend>> {
        if !requested {
            return None;
        }
        let backend = self.shared.as_ref()?;
        if backend.is_available().await {
            Some(backend)
        } else {
            self.counters.degradations.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Shared cache unavailable, using local tier only");
            None
        }
    }

    fn degrade(&self, operation: &'static str, key: &CacheKey, error: &CacheError) {
        self.counters.degradations.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            error = %error,
            operation,
            key = %key,
            "Shared cache call failed, using local tier only"
        );
    }

    async fn lookup(&self, ns: &Namespace, key: &CacheKey) -> Lookup {
        if let Some(entry) = self.local.get(key) {
            match entry.slot {
                LocalSlot::Entity(entity) => {
                    self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
                    return Lookup::Hit(CacheRead::new(entity, entry.cached_at, CacheTier::Local));
                }
                LocalSlot::Missing => {
                    self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
                    return Lookup::Missing;
                }
                LocalSlot::Rows(_) => {}
            }
        }

        if let Some((entity, cached_at)) = self.shared_entity(ns, key, ns.policy.use_shared_cache).await {
            self.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
            return Lookup::Hit(CacheRead::new(entity, cached_at, CacheTier::Shared));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        Lookup::Miss
    }

    /// Read and decode an entity from the shared tier, populating the local
    /// tier on success. The entity must carry the primary key the key was
    /// derived from.
    async fn shared_entity(
        &self,
        ns: &Namespace,
        key: &CacheKey,
        use_shared: bool,
    ) -> Option<(Arc<Entity>, DateTime<Utc>)> {
        let shared = self.shared_tier(use_shared).await?;
        let (bytes, cached_at) = match shared.get(key.as_str()).await {
            Ok(found) => found?,
            Err(e) => {
                self.degrade("get", key, &e);
                return None;
            }
        };

        let entity = match decode_payload(&bytes) {
            Ok(Some(SharedPayload::Entity(snapshot))) => restore(&ns.schema, snapshot),
            Ok(Some(SharedPayload::Rows { .. })) | Ok(None) => return None,
            Err(e) => Err(e),
        };
        match entity {
            // a digest collision with another key of the namespace
            Ok(entity) if !key.identifies(&entity.primary_key_values()) => None,
            Ok(entity) => {
                self.local
                    .insert_at(key, LocalSlot::Entity(entity.clone()), cached_at);
                Some((entity, cached_at))
            }
            Err(e) => {
                self.degrade("decode", key, &e);
                None
            }
        }
    }

    /// The cached result set under `key`, from the tier the namespace's
    /// prefetch policy selects.
    async fn cached_rows(&self, ns: &Namespace, key: &CacheKey) -> Option<Arc<Vec<Arc<Entity>>>> {
        if ns.policy.prefetch != PrefetchTier::Shared {
            if let Some(LocalSlot::Rows(rows)) = self.local.get(key).map(|entry| entry.slot) {
                self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
                return Some(rows);
            }
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let rows = self.shared_rows(ns, key).await;
        let counter = if rows.is_some() {
            &self.counters.shared_hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        rows
    }

    async fn shared_rows(&self, ns: &Namespace, key: &CacheKey) -> Option<Arc<Vec<Arc<Entity>>>> {
        let shared = self.shared_tier(true).await?;
        let (bytes, cached_at) = match shared.get(key.as_str()).await {
            Ok(found) => found?,
            Err(e) => {
                self.degrade("get", key, &e);
                return None;
            }
        };

        let snapshots = match decode_payload(&bytes) {
            Ok(Some(SharedPayload::Rows { input, rows })) if input == key.input() => rows,
            Ok(Some(SharedPayload::Rows { .. })) => return None,
            Ok(Some(SharedPayload::Entity(_))) | Ok(None) => return None,
            Err(e) => {
                self.degrade("decode", key, &e);
                return None;
            }
        };

        let mut rows = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            match restore(&ns.schema, snapshot) {
                Ok(entity) => rows.push(entity),
                Err(e) => {
                    self.degrade("decode", key, &e);
                    return None;
                }
            }
        }
        tracing::trace!(key = %key, cached_at = %cached_at, rows = rows.len(), "Result set read from shared tier");
        Some(Arc::new(rows))
    }

    async fn run_query(&self, ns: &Namespace, query: &PrefetchQuery) -> TesseraResult<Vec<Entity>> {
        let select = query.to_select(&ns.schema);
        let rows = self.persistence.executor().select(&select).await?;
        rows.into_iter()
            .map(|row| Entity::from_row(ns.schema.clone(), row, self.casting.strict_validation))
            .collect()
    }

    async fn put_locked(
        &self,
        ns: &Namespace,
        entity: Arc<Entity>,
        use_shared: bool,
        overwrite: bool,
    ) -> TesseraResult<Arc<Entity>> {
        let key = Self::entity_key(ns, &entity.primary_key_values())?;

        if !overwrite {
            if let Some(entry) = self.local.get(&key) {
                if let LocalSlot::Entity(existing) = entry.slot {
                    return Ok(existing);
                }
            }
            if let Some((existing, _)) = self.shared_entity(ns, &key, use_shared).await {
                return Ok(existing);
            }
        }

        let now = Utc::now();
        self.local.insert_at(&key, LocalSlot::Entity(entity.clone()), now);
        if let Some(shared) = self.shared_tier(use_shared).await {
            match encode_payload(&SharedPayload::Entity(entity.snapshot())) {
                Ok(bytes) => {
                    if let Err(e) = shared.set(key.as_str(), &bytes, now).await {
                        self.degrade("set", &key, &e);
                    }
                }
                Err(e) => self.degrade("encode", &key, &e),
            }
        }
        Ok(entity)
    }

    /// Record that storage had no row for `key`. The select ran without the
    /// namespace lock, so a hook may have cached the entity meanwhile; that
    /// entity is kept.
    async fn remember_missing(&self, ns: &Namespace, key: &CacheKey, seen: Option<&Arc<Entity>>) {
        let _guard = ns.writes.lock().await;
        if self.local.mark_missing(key, seen) {
            tracing::debug!(key = %key, "Cached negative marker");
        } else {
            tracing::debug!(key = %key, "Entity cached during fetch, negative marker skipped");
        }
    }

    async fn invalidate_locked(&self, key: &CacheKey, use_shared: bool) {
        self.local.remove(key);
        if let Some(shared) = self.shared_tier(use_shared).await {
            if let Err(e) = shared.delete(key.as_str()).await {
                self.degrade("delete", key, &e);
            }
        }
    }

    async fn invalidate_namespace_locked(&self, ns: &Namespace, use_shared: bool) {
        let prefix = CacheKey::namespace_prefix(ns.schema.entity_type());
        let local_removed = self.local.remove_prefix(&prefix);

        // shared result sets go regardless of the entity-level shared setting
        let shared_requested = use_shared || ns.policy.prefetch == PrefetchTier::Shared;
        let mut shared_removed = 0;
        if let Some(shared) = self.shared_tier(shared_requested).await {
            match shared.invalidate_prefix(&prefix).await {
                Ok(n) => shared_removed = n,
                Err(e) => {
                    self.counters.degradations.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        error = %e,
                        prefix = %prefix,
                        "Shared cache invalidation failed, using local tier only"
                    );
                }
            }
        }

        tracing::debug!(
            entity_type = ns.schema.entity_type(),
            local_removed,
            shared_removed,
            "Invalidated cache namespace"
        );
    }
}
