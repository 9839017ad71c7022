//! Coordinator behaviour across both cache tiers, backed by the in-memory
//! executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tessera_core::{AttributeDef, Entity, PrefetchTier, Row, TesseraConfig, TesseraResult, Value};
use tessera_storage::{
    CacheCoordinator, CachePolicy, CacheTier, ColumnDescriptor, InsertOutcome, LmdbSharedCache,
    MemorySharedCache, MockExecutor, PrefetchQuery, RelationalExecutor, SelectQuery,
    SharedCacheBackend,
};
use tessera_test_utils::assertions::{assert_config_error, assert_schema_violation, assert_write_violation};
use tessera_test_utils::fixtures::{
    local_config, membership_schema, shared_prefetch_config, user, user_row, users_schema,
};
use tokio::sync::Notify;
use tessera_test_utils::init_tracing;

const ALL: &[&str] = &[];

async fn executor() -> Arc<MockExecutor> {
    let exec = Arc::new(MockExecutor::new());
    let schema = users_schema();
    exec.create_table(schema.table(), schema.attributes(), schema.primary_key())
        .await
        .unwrap();
    exec
}

fn coordinator(
    exec: &Arc<MockExecutor>,
    shared: &Arc<MemorySharedCache>,
    config: &TesseraConfig,
) -> CacheCoordinator {
    let coordinator = CacheCoordinator::new(exec.clone(), config).with_shared_backend(shared.clone());
    coordinator.register(users_schema());
    coordinator
}

async fn setup(config: TesseraConfig) -> (Arc<MockExecutor>, Arc<MemorySharedCache>, CacheCoordinator) {
    init_tracing();
    let exec = executor().await;
    let shared = Arc::new(MemorySharedCache::new());
    let coordinator = coordinator(&exec, &shared, &config);
    (exec, shared, coordinator)
}

// ============================================================================
// PUT
// ============================================================================

#[tokio::test]
async fn test_put_without_overwrite_keeps_first_entity() {
    let (_exec, _shared, coordinator) = setup(TesseraConfig::default()).await;

    let first = coordinator.put(user(1, "Ada"), true, false).await.unwrap();
    let second = coordinator.put(user(1, "Bob"), true, false).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.get("name"), Some(&Value::from("Ada")));
}

#[tokio::test]
async fn test_put_with_overwrite_replaces_entity() {
    let (_exec, _shared, coordinator) = setup(TesseraConfig::default()).await;

    coordinator.put(user(1, "Ada"), true, false).await.unwrap();
    coordinator.put(user(1, "Bob"), true, true).await.unwrap();

    let read = coordinator
        .lookup_by_key("user", &[Value::Int(1)])
        .await
        .unwrap()
        .expect("entity should be cached");
    assert_eq!(read.value().get("name"), Some(&Value::from("Bob")));
    assert_eq!(read.tier(), CacheTier::Local);
}

#[tokio::test]
async fn test_shared_tier_is_visible_to_other_coordinators() {
    let (exec, shared, writer) = setup(TesseraConfig::default()).await;
    let reader = coordinator(&exec, &shared, &TesseraConfig::default());

    writer.put(user(7, "Ada"), true, false).await.unwrap();

    let first = reader.lookup_by_key("user", &[Value::Int(7)]).await.unwrap().unwrap();
    assert_eq!(first.tier(), CacheTier::Shared);
    assert_eq!(first.value().get("name"), Some(&Value::from("Ada")));

    let second = reader.lookup_by_key("user", &[Value::Int(7)]).await.unwrap().unwrap();
    assert_eq!(second.tier(), CacheTier::Local);
    assert_eq!(second.cached_at(), first.cached_at());

    let stats = reader.stats();
    assert_eq!(stats.shared_hits, 1);
    assert_eq!(stats.local_hits, 1);
}

#[tokio::test]
async fn test_put_without_shared_cache_stays_local() {
    let (exec, shared, writer) = setup(TesseraConfig::default()).await;
    let reader = coordinator(&exec, &shared, &TesseraConfig::default());

    writer.put(user(3, "Ada"), false, false).await.unwrap();

    assert!(shared.is_empty());
    assert!(reader.lookup_by_key("user", &[Value::Int(3)]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cache_query_result_preserves_order_and_existing_entries() {
    let (_exec, _shared, coordinator) = setup(TesseraConfig::default()).await;
    let cached = coordinator.put(user(2, "Cached"), true, false).await.unwrap();

    let rows = coordinator
        .cache_query_result(vec![user(1, "Ada"), user(2, "Fresh"), user(3, "Cy")], true)
        .await
        .unwrap();

    let ids: Vec<_> = rows.iter().map(|e| e.get("id").cloned()).collect();
    assert_eq!(ids, vec![Some(Value::Int(1)), Some(Value::Int(2)), Some(Value::Int(3))]);
    assert!(Arc::ptr_eq(&rows[1], &cached));
}

// ============================================================================
// EXISTENCE
// ============================================================================

#[tokio::test]
async fn test_exists_probe_on_absent_key_leaves_no_placeholder() {
    let (exec, shared, coordinator) = setup(TesseraConfig::default()).await;

    assert!(!coordinator.exists_by_key("user", &[Value::Int(99)]).await.unwrap());

    let key = coordinator.key_for("user", &[Value::Int(99)]).unwrap();
    assert!(!shared.contains(key.as_str()));
    assert_eq!(shared.counters().adds, 1);
    assert_eq!(shared.counters().deletes, 1);
    assert_eq!(exec.exists_count(), 0);
}

#[tokio::test]
async fn test_exists_takes_shared_tier_absence_as_final() {
    let (exec, shared, coordinator) = setup(TesseraConfig::default()).await;
    // stored behind the cache's back, so neither tier knows it
    exec.insert("users", &user_row(3, "Ada"), false).await.unwrap();

    assert!(!coordinator.exists_by_key("user", &[Value::Int(3)]).await.unwrap());
    assert_eq!(exec.exists_count(), 0);
    assert!(shared.is_empty());
}

#[tokio::test]
async fn test_exists_answered_by_shared_tier() {
    let (exec, shared, writer) = setup(TesseraConfig::default()).await;
    let reader = coordinator(&exec, &shared, &TesseraConfig::default());

    writer.put(user(5, "Ada"), true, false).await.unwrap();

    assert!(reader.exists_by_key("user", &[Value::Int(5)]).await.unwrap());
    assert_eq!(exec.exists_count(), 0);
    // the probe must not clobber the cached entity
    assert!(reader.lookup_by_key("user", &[Value::Int(5)]).await.unwrap().is_some());
}

#[tokio::test]
async fn test_exists_falls_back_to_storage() {
    let (exec, _shared, coordinator) = setup(local_config()).await;
    exec.insert("users", &user_row(4, "Ada"), false).await.unwrap();

    assert!(coordinator.exists_by_key("user", &[Value::Int(4)]).await.unwrap());
    assert_eq!(exec.exists_count(), 1);
}

// ============================================================================
// READ-THROUGH FETCH
// ============================================================================

#[tokio::test]
async fn test_fetch_missing_row_caches_negative_marker() {
    let (exec, _shared, coordinator) = setup(TesseraConfig::default()).await;

    assert!(coordinator.fetch_by_key("user", &[Value::Int(42)], ALL).await.unwrap().is_none());
    assert!(coordinator.fetch_by_key("user", &[Value::Int(42)], ALL).await.unwrap().is_none());
    assert!(!coordinator.exists_by_key("user", &[Value::Int(42)]).await.unwrap());

    assert_eq!(exec.select_count(), 1);
    assert_eq!(exec.exists_count(), 0);
}

#[tokio::test]
async fn test_fetch_completes_sparse_entity_with_missing_attributes_only() {
    let (exec, _shared, coordinator) = setup(TesseraConfig::default()).await;
    exec.insert("users", &user_row(1, "Ada"), false).await.unwrap();

    let partial = coordinator
        .fetch_by_key("user", &[Value::Int(1)], &["name"])
        .await
        .unwrap()
        .unwrap();
    assert!(partial.retrieval_state().is_partial());
    assert!(partial.get("status").is_none());
    assert_eq!(exec.select_count(), 1);

    coordinator.fetch_by_key("user", &[Value::Int(1)], &["name"]).await.unwrap();
    assert_eq!(exec.select_count(), 1);

    let merged = coordinator
        .fetch_by_key("user", &[Value::Int(1)], &["status"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exec.select_count(), 2);
    assert_eq!(merged.get("name"), Some(&Value::from("Ada")));
    assert_eq!(merged.get("status"), Some(&Value::from("active")));

    coordinator.fetch_by_key("user", &[Value::Int(1)], ALL).await.unwrap();
    assert_eq!(exec.select_count(), 2);
}

#[tokio::test]
async fn test_fetch_miss_keeps_entity_created_during_select() {
    init_tracing();
    let storage = executor().await;
    let exec = Arc::new(PausingExecutor::new(storage.clone()));
    let coordinator = CacheCoordinator::new(exec.clone(), &local_config());
    coordinator.register(users_schema());

    let fetch = coordinator.fetch_by_key("user", &[Value::Int(1)], ALL);
    let create = async {
        exec.selected.notified().await;
        coordinator.on_create(user(1, "Ada")).await.unwrap();
        exec.release.notify_one();
    };
    let (fetched, ()) = tokio::join!(fetch, create);
    assert!(fetched.unwrap().is_none());

    assert_eq!(storage.row_count("users"), 1);
    assert!(coordinator.exists_by_key("user", &[Value::Int(1)]).await.unwrap());
    let read = coordinator.lookup_by_key("user", &[Value::Int(1)]).await.unwrap().unwrap();
    assert_eq!(read.value().get("name"), Some(&Value::from("Ada")));
}

#[tokio::test]
async fn test_fetch_rejects_unknown_attribute() {
    let (_exec, _shared, coordinator) = setup(TesseraConfig::default()).await;
    let result = coordinator.fetch_by_key("user", &[Value::Int(1)], &["nickname"]).await;
    assert_schema_violation(&result);
}

#[tokio::test]
async fn test_wrong_key_arity_is_schema_violation() {
    let (_exec, _shared, coordinator) = setup(TesseraConfig::default()).await;
    let result = coordinator
        .lookup_by_key("user", &[Value::Int(1), Value::Int(2)])
        .await;
    assert_schema_violation(&result);
}

#[tokio::test]
async fn test_unregistered_entity_type_is_config_error() {
    let (_exec, _shared, coordinator) = setup(TesseraConfig::default()).await;
    let result = coordinator.exists_by_key("invoice", &[Value::Int(1)]).await;
    assert_config_error(&result);
}

// ============================================================================
// MUTATION HOOKS
// ============================================================================

#[tokio::test]
async fn test_create_then_delete() {
    let (exec, shared, coordinator) = setup(TesseraConfig::default()).await;
    let entity = Entity::new(users_schema(), Row::new().with("name", "Ada"), true).unwrap();

    let created = coordinator.on_create(entity).await.unwrap();
    assert_eq!(created.get("id"), Some(&Value::Int(1)));
    assert!(coordinator.exists_by_key("user", &[Value::Int(1)]).await.unwrap());
    assert_eq!(exec.exists_count(), 0);

    assert_eq!(coordinator.on_delete("user", &[Value::Int(1)]).await.unwrap(), 1);
    assert!(coordinator.lookup_by_key("user", &[Value::Int(1)]).await.unwrap().is_none());
    assert!(!coordinator.exists_by_key("user", &[Value::Int(1)]).await.unwrap());

    let key = coordinator.key_for("user", &[Value::Int(1)]).unwrap();
    assert!(!shared.contains(key.as_str()));
    assert_eq!(exec.row_count("users"), 0);
}

#[tokio::test]
async fn test_create_reports_affected_row_mismatch() {
    let (exec, _shared, coordinator) = setup(TesseraConfig::default()).await;
    exec.set_insert_affected(Some(0));

    let result = coordinator.on_create(user(1, "Ada")).await;
    assert_write_violation(&result);
    assert!(coordinator.lookup_by_key("user", &[Value::Int(1)]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_publishes_new_values() {
    let (exec, shared, writer) = setup(TesseraConfig::default()).await;
    let reader = coordinator(&exec, &shared, &TesseraConfig::default());
    writer.on_create(user(1, "Ada")).await.unwrap();

    let mut changed = user(1, "Grace");
    changed.set("status", "inactive", true).unwrap();
    writer.on_update(changed).await.unwrap();

    let read = reader.lookup_by_key("user", &[Value::Int(1)]).await.unwrap().unwrap();
    assert_eq!(read.value().get("name"), Some(&Value::from("Grace")));
    assert_eq!(exec.table_rows("users").unwrap()[0].get("status"), Some(&Value::from("inactive")));
}

#[tokio::test]
async fn test_invalidate_single_key() {
    let (_exec, shared, coordinator) = setup(TesseraConfig::default()).await;
    coordinator.put(user(1, "Ada"), true, false).await.unwrap();
    coordinator.put(user(2, "Bob"), true, false).await.unwrap();

    let key = coordinator.key_for("user", &[Value::Int(1)]).unwrap();
    coordinator.invalidate(&key, true).await.unwrap();

    assert!(!shared.contains(key.as_str()));
    assert!(coordinator.lookup_by_key("user", &[Value::Int(1)]).await.unwrap().is_none());
    assert!(coordinator.lookup_by_key("user", &[Value::Int(2)]).await.unwrap().is_some());
}

// ============================================================================
// PREFETCH
// ============================================================================

#[tokio::test]
async fn test_prefetch_reexecutes_after_mutation() {
    let config = local_config().with_prefetch(PrefetchTier::Local);
    let (exec, _shared, coordinator) = setup(config).await;
    exec.insert("users", &user_row(1, "Ada"), false).await.unwrap();
    exec.insert("users", &user_row(2, "Bob"), false).await.unwrap();
    let query = PrefetchQuery::new().order_by("id");

    let rows = coordinator.prefetch("user", &query).await.unwrap();
    assert_eq!(rows.len(), 2);
    coordinator.prefetch("user", &query).await.unwrap();
    assert_eq!(exec.select_count(), 1);

    let mut changed = Entity::clone(&rows[0]);
    changed.set("name", "Grace", true).unwrap();
    coordinator.on_update(changed).await.unwrap();

    let rows = coordinator.prefetch("user", &query).await.unwrap();
    assert_eq!(exec.select_count(), 2);
    assert_eq!(rows[0].get("name"), Some(&Value::from("Grace")));
}

#[tokio::test]
async fn test_prefetch_reexecutes_after_delete() {
    let config = local_config().with_prefetch(PrefetchTier::Local);
    let (exec, _shared, coordinator) = setup(config).await;
    exec.insert("users", &user_row(1, "Ada"), false).await.unwrap();
    exec.insert("users", &user_row(2, "Bob"), false).await.unwrap();
    let query = PrefetchQuery::new().order_by("id");

    assert_eq!(coordinator.prefetch("user", &query).await.unwrap().len(), 2);
    assert_eq!(coordinator.on_delete("user", &[Value::Int(1)]).await.unwrap(), 1);

    let rows = coordinator.prefetch("user", &query).await.unwrap();
    assert_eq!(exec.select_count(), 2);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn test_prefetch_distinguishes_null_from_empty_param() {
    let config = local_config().with_prefetch(PrefetchTier::Local);
    let (exec, _shared, coordinator) = setup(config).await;
    exec.insert("users", &user_row(1, ""), false).await.unwrap();

    let null = PrefetchQuery::new().filter("name = ?", vec![Value::Null]);
    let empty = PrefetchQuery::new().filter("name = ?", vec![Value::from("")]);

    assert!(coordinator.prefetch("user", &null).await.unwrap().is_empty());
    assert_eq!(coordinator.prefetch("user", &empty).await.unwrap().len(), 1);
    assert_eq!(exec.select_count(), 2);
}

#[tokio::test]
async fn test_prefetch_sees_created_rows() {
    let config = local_config().with_prefetch(PrefetchTier::Local);
    let (_exec, _shared, coordinator) = setup(config).await;
    let query = PrefetchQuery::new().filter("status = ?", vec![Value::from("active")]);

    assert!(coordinator.prefetch("user", &query).await.unwrap().is_empty());
    coordinator.on_create(user(1, "Ada")).await.unwrap();
    assert_eq!(coordinator.prefetch("user", &query).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_prefetch_disabled_always_queries() {
    let (exec, _shared, coordinator) = setup(local_config()).await;
    exec.insert("users", &user_row(1, "Ada"), false).await.unwrap();
    let query = PrefetchQuery::new();

    coordinator.prefetch("user", &query).await.unwrap();
    coordinator.prefetch("user", &query).await.unwrap();
    assert_eq!(exec.select_count(), 2);
    // rows were still cached individually
    assert!(coordinator.lookup_by_key("user", &[Value::Int(1)]).await.unwrap().is_some());
}

#[tokio::test]
async fn test_shared_prefetch_serves_other_coordinators() {
    let (exec, shared, first) = setup(shared_prefetch_config()).await;
    let second = coordinator(&exec, &shared, &shared_prefetch_config());
    exec.insert("users", &user_row(1, "Ada"), false).await.unwrap();
    let query = PrefetchQuery::new().attributes(["name"]).limit(10);

    first.prefetch("user", &query).await.unwrap();
    let rows = second.prefetch("user", &query).await.unwrap();

    assert_eq!(exec.select_count(), 1);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].retrieval_state().is_partial());
}

#[tokio::test]
async fn test_shared_prefetch_reexecutes_after_other_coordinator_mutates() {
    let (exec, shared, writer) = setup(shared_prefetch_config()).await;
    let reader = coordinator(&exec, &shared, &shared_prefetch_config());
    exec.insert("users", &user_row(1, "Ada"), false).await.unwrap();
    let query = PrefetchQuery::new().order_by("id");

    assert_eq!(reader.prefetch("user", &query).await.unwrap().len(), 1);
    assert_eq!(writer.prefetch("user", &query).await.unwrap().len(), 1);
    assert_eq!(exec.select_count(), 1);

    writer.on_create(user(2, "Bob")).await.unwrap();
    assert_eq!(reader.prefetch("user", &query).await.unwrap().len(), 2);
    assert_eq!(exec.select_count(), 2);

    let mut changed = user(2, "Grace");
    changed.set("status", "inactive", true).unwrap();
    writer.on_update(changed).await.unwrap();
    reader.prefetch("user", &query).await.unwrap();
    assert_eq!(exec.select_count(), 3);

    writer.on_delete("user", &[Value::Int(1)]).await.unwrap();
    let rows = reader.prefetch("user", &query).await.unwrap();
    assert_eq!(exec.select_count(), 4);
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_shared_prefetch_invalidated_without_shared_entities() {
    let config = local_config().with_prefetch(PrefetchTier::Shared);
    let (exec, shared, writer) = setup(config.clone()).await;
    let reader = coordinator(&exec, &shared, &config);
    let query = PrefetchQuery::new();

    assert!(reader.prefetch("user", &query).await.unwrap().is_empty());
    writer.on_create(user(1, "Ada")).await.unwrap();

    assert_eq!(reader.prefetch("user", &query).await.unwrap().len(), 1);
    assert_eq!(exec.select_count(), 2);
}

#[tokio::test]
async fn test_register_with_policy_overrides_defaults() {
    let (exec, _shared, coordinator) = setup(TesseraConfig::default()).await;
    coordinator.register_with_policy(users_schema(), CachePolicy::local_only().with_prefetch(PrefetchTier::Local));
    exec.insert("users", &user_row(1, "Ada"), false).await.unwrap();

    assert_eq!(coordinator.policy("user").unwrap().prefetch, PrefetchTier::Local);
    coordinator.prefetch("user", &PrefetchQuery::new()).await.unwrap();
    coordinator.prefetch("user", &PrefetchQuery::new()).await.unwrap();
    assert_eq!(exec.select_count(), 1);
}

// ============================================================================
// DEGRADED SHARED TIER
// ============================================================================

#[tokio::test]
async fn test_unavailable_shared_tier_degrades_to_local() {
    let (exec, shared, coordinator) = setup(TesseraConfig::default()).await;
    shared.set_available(false);

    coordinator.put(user(1, "Ada"), true, false).await.unwrap();
    assert!(coordinator.lookup_by_key("user", &[Value::Int(1)]).await.unwrap().is_some());
    assert!(!coordinator.exists_by_key("user", &[Value::Int(2)]).await.unwrap());

    assert_eq!(exec.exists_count(), 1);
    assert!(coordinator.stats().shared_degradations > 0);
    assert!(shared.is_empty());
}

#[tokio::test]
async fn test_garbage_in_shared_tier_is_a_miss() {
    let (exec, shared, coordinator) = setup(TesseraConfig::default()).await;
    let key = coordinator.key_for("user", &[Value::Int(1)]).unwrap();
    shared.set(key.as_str(), b"{broken", chrono::Utc::now()).await.unwrap();
    exec.insert("users", &user_row(1, "Ada"), false).await.unwrap();

    let fetched = coordinator.fetch_by_key("user", &[Value::Int(1)], ALL).await.unwrap();
    assert!(fetched.is_some());
    assert_eq!(exec.select_count(), 1);
    assert!(coordinator.stats().shared_degradations > 0);
}

// ============================================================================
// LMDB SHARED TIER
// ============================================================================

#[tokio::test]
async fn test_lmdb_backed_coordinators_share_entities() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = TesseraConfig::default().with_lmdb(dir.path(), 10);
    let backend: Arc<dyn SharedCacheBackend> = Arc::new(LmdbSharedCache::from_config(&config).unwrap());
    let exec = executor().await;

    let writer = CacheCoordinator::new(exec.clone(), &config).with_shared_backend(backend.clone());
    let reader = CacheCoordinator::new(exec.clone(), &config).with_shared_backend(backend.clone());
    writer.register(users_schema());
    reader.register(users_schema());

    writer.on_create(user(1, "Ada")).await.unwrap();
    let read = reader.lookup_by_key("user", &[Value::Int(1)]).await.unwrap().unwrap();
    assert_eq!(read.tier(), CacheTier::Shared);
    assert_eq!(read.value().uuid(), "1.user.tessera");

    writer.on_delete("user", &[Value::Int(1)]).await.unwrap();
    let fresh = CacheCoordinator::new(exec.clone(), &config).with_shared_backend(backend);
    fresh.register(users_schema());
    assert!(fresh.lookup_by_key("user", &[Value::Int(1)]).await.unwrap().is_none());
    assert!(!fresh.exists_by_key("user", &[Value::Int(1)]).await.unwrap());
}

// ============================================================================
// COMPOSITE KEYS
// ============================================================================

async fn membership_setup(
    config: TesseraConfig,
) -> (Arc<MockExecutor>, Arc<MemorySharedCache>, CacheCoordinator) {
    let (exec, shared, coordinator) = setup(config).await;
    let schema = membership_schema();
    exec.create_table(schema.table(), schema.attributes(), schema.primary_key())
        .await
        .unwrap();
    coordinator.register(schema);
    (exec, shared, coordinator)
}

fn membership_row(user_id: i64, group: &str) -> Row {
    Row::new()
        .with("user_id", user_id)
        .with("group_name", group)
        .with("admin", false)
}

fn membership(user_id: i64, group: &str) -> Entity {
    Entity::new(membership_schema(), membership_row(user_id, group), true).unwrap()
}

#[tokio::test]
async fn test_composite_key_put_lookup_and_exists() {
    let (exec, shared, coordinator) = membership_setup(TesseraConfig::default()).await;
    let reader = coordinator_for(&exec, &shared);

    coordinator.put(membership(1, "ops"), true, false).await.unwrap();

    let key = [Value::Int(1), Value::from("ops")];
    assert!(coordinator.lookup_by_key("membership", &key).await.unwrap().is_some());
    assert!(coordinator.exists_by_key("membership", &key).await.unwrap());
    let read = reader.lookup_by_key("membership", &key).await.unwrap().unwrap();
    assert_eq!(read.tier(), CacheTier::Shared);
    assert_eq!(read.value().uuid(), "1.ops.membership.tessera");

    let other = [Value::Int(1), Value::from("dev")];
    assert!(coordinator.lookup_by_key("membership", &other).await.unwrap().is_none());
    assert!(!coordinator.exists_by_key("membership", &other).await.unwrap());
    assert_eq!(exec.exists_count(), 0);
}

#[tokio::test]
async fn test_composite_key_fetch_and_delete() {
    let (exec, _shared, coordinator) = membership_setup(TesseraConfig::default()).await;
    exec.insert("memberships", &membership_row(2, "a-b"), false).await.unwrap();
    let key = [Value::Int(2), Value::from("a-b")];

    let fetched = coordinator.fetch_by_key("membership", &key, ALL).await.unwrap().unwrap();
    assert_eq!(fetched.get("admin"), Some(&Value::Bool(false)));
    assert_eq!(coordinator.on_delete("membership", &key).await.unwrap(), 1);
    assert!(coordinator.lookup_by_key("membership", &key).await.unwrap().is_none());
    assert!(!coordinator.exists_by_key("membership", &key).await.unwrap());
}

#[tokio::test]
async fn test_dashed_composite_keys_never_return_each_other() {
    let (exec, shared, writer) = membership_setup(TesseraConfig::default()).await;
    let reader = coordinator_for(&exec, &shared);

    writer.put(membership(1, "a-b"), true, false).await.unwrap();
    let stored = [Value::Int(1), Value::from("a-b")];
    let colliding = [Value::from("1-a"), Value::from("b")];
    assert_eq!(
        writer.key_for("membership", &stored).unwrap().as_str(),
        writer.key_for("membership", &colliding).unwrap().as_str()
    );

    // local tier
    assert!(writer.lookup_by_key("membership", &colliding).await.unwrap().is_none());
    assert!(writer.lookup_by_key("membership", &stored).await.unwrap().is_some());

    // shared tier
    assert!(reader.lookup_by_key("membership", &colliding).await.unwrap().is_none());
    assert!(reader.lookup_by_key("membership", &stored).await.unwrap().is_some());
}

fn coordinator_for(exec: &Arc<MockExecutor>, shared: &Arc<MemorySharedCache>) -> CacheCoordinator {
    let coordinator = coordinator(exec, shared, &TesseraConfig::default());
    coordinator.register(membership_schema());
    coordinator
}

// ============================================================================
// PAUSING EXECUTOR
// ============================================================================

/// Holds the first select after it has read storage until `release` fires,
/// so a hook can run between the read and the caching of its outcome.
struct PausingExecutor {
    inner: Arc<MockExecutor>,
    armed: AtomicBool,
    selected: Notify,
    release: Notify,
}

impl PausingExecutor {
    fn new(inner: Arc<MockExecutor>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            selected: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl RelationalExecutor for PausingExecutor {
    async fn select(&self, query: &SelectQuery) -> TesseraResult<Vec<Row>> {
        let rows = self.inner.select(query).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.selected.notify_one();
            self.release.notified().await;
        }
        Ok(rows)
    }

    async fn exists(&self, table: &str, criteria: Option<&str>, params: &[Value]) -> TesseraResult<bool> {
        self.inner.exists(table, criteria, params).await
    }

    async fn insert(&self, table: &str, values: &Row, replace: bool) -> TesseraResult<InsertOutcome> {
        self.inner.insert(table, values, replace).await
    }

    async fn insert_many(
        &self,
        table: &str,
        attributes: &[String],
        rows: &[Vec<Value>],
        replace: bool,
    ) -> TesseraResult<u64> {
        self.inner.insert_many(table, attributes, rows, replace).await
    }

    async fn update(
        &self,
        table: &str,
        values: &Row,
        criteria: &str,
        params: &Row,
        limit: Option<u64>,
    ) -> TesseraResult<u64> {
        self.inner.update(table, values, criteria, params, limit).await
    }

    async fn delete(
        &self,
        table: &str,
        criteria: &str,
        params: &[Value],
        limit: Option<u64>,
    ) -> TesseraResult<u64> {
        self.inner.delete(table, criteria, params, limit).await
    }

    async fn describe_table(&self, table: &str) -> TesseraResult<Option<Vec<ColumnDescriptor>>> {
        self.inner.describe_table(table).await
    }

    async fn create_table(
        &self,
        table: &str,
        attributes: &[AttributeDef],
        primary_key: &[String],
    ) -> TesseraResult<()> {
        self.inner.create_table(table, attributes, primary_key).await
    }

    async fn add_attribute(
        &self,
        table: &str,
        attribute: &AttributeDef,
        primary_key: bool,
        after: Option<&str>,
    ) -> TesseraResult<()> {
        self.inner.add_attribute(table, attribute, primary_key, after).await
    }

    async fn alter_attribute(
        &self,
        table: &str,
        attribute: &AttributeDef,
        primary_key: bool,
    ) -> TesseraResult<()> {
        self.inner.alter_attribute(table, attribute, primary_key).await
    }

    async fn rename_attribute(
        &self,
        table: &str,
        old_name: &str,
        attribute: &AttributeDef,
        primary_key: bool,
    ) -> TesseraResult<()> {
        self.inner.rename_attribute(table, old_name, attribute, primary_key).await
    }

    async fn drop_attribute(&self, table: &str, name: &str) -> TesseraResult<()> {
        self.inner.drop_attribute(table, name).await
    }
}
