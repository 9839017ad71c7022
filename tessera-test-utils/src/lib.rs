//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - Proptest generators for values and rows
//! - Schema fixtures for common scenarios
//! - Custom assertions for the error taxonomy
//! - Test log initialization

// Re-export core types for convenience
pub use tessera_core::{
    AttributeDef, CacheError, ConfigError, Entity, EntitySchema, PrefetchTier, Row, SchemaError,
    StorageError, TesseraConfig, TesseraError, TesseraResult, Value, ValueKind, WriteError,
};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn` so degraded cache paths show up in
/// failing test output.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for values, rows and attribute kinds.

    use super::*;
    use proptest::prelude::*;

    /// Generate any value, floats restricted to finite ones.
    pub fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1.0e9f64..1.0e9).prop_map(Value::Float),
            "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::Text),
        ]
    }

    /// Generate a value suitable as a primary-key component.
    pub fn arb_key_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            (1i64..1_000_000).prop_map(Value::Int),
            "[a-z0-9]{1,12}".prop_map(Value::Text),
        ]
    }

    /// Generate a valid attribute name.
    pub fn arb_attribute_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}"
    }

    /// Generate a value kind, enumerations with one to four options.
    pub fn arb_value_kind() -> impl Strategy<Value = ValueKind> {
        prop_oneof![
            Just(ValueKind::Boolean),
            Just(ValueKind::Integer),
            Just(ValueKind::Float),
            Just(ValueKind::String),
            prop::collection::btree_set("[a-z]{1,8}", 1..5)
                .prop_map(|set| ValueKind::Enumeration(set.into_iter().collect())),
        ]
    }

    /// Generate a users row as storage would return it.
    pub fn arb_user_row() -> impl Strategy<Value = Row> {
        (1i64..10_000, "[A-Za-z]{1,16}", any::<bool>()).prop_map(|(id, name, active)| {
            Row::new()
                .with("id", id)
                .with("name", name)
                .with("status", if active { "active" } else { "inactive" })
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built schemas and configurations for common testing scenarios.

    use super::*;
    use std::sync::Arc;

    /// `user` entity over table `users`: auto-increment `id`, `name` and an
    /// `status` enumeration defaulting to `active`.
    pub fn users_schema() -> Arc<EntitySchema> {
        Arc::new(
            EntitySchema::builder("user")
                .table("users")
                .attribute(AttributeDef::integer("id").extra("auto_increment"))
                .attribute(AttributeDef::string("name", 64))
                .attribute(
                    AttributeDef::enumeration("status", ["active", "inactive"])
                        .default_value("active"),
                )
                .primary_key(["id"])
                .build()
                .expect("users fixture schema is valid"),
        )
    }

    /// `membership` entity with a composite primary key.
    pub fn membership_schema() -> Arc<EntitySchema> {
        Arc::new(
            EntitySchema::builder("membership")
                .table("memberships")
                .attribute(AttributeDef::integer("user_id"))
                .attribute(AttributeDef::string("group_name", 32))
                .attribute(AttributeDef::boolean("admin").default_value(false))
                .primary_key(["user_id", "group_name"])
                .build()
                .expect("membership fixture schema is valid"),
        )
    }

    /// A users row with every attribute present.
    pub fn user_row(id: i64, name: &str) -> Row {
        Row::new()
            .with("id", id)
            .with("name", name)
            .with("status", "active")
    }

    /// A fully loaded user entity.
    pub fn user(id: i64, name: &str) -> Entity {
        Entity::new(users_schema(), user_row(id, name), true).expect("user fixture row is valid")
    }

    /// Default configuration without a shared tier.
    pub fn local_config() -> TesseraConfig {
        TesseraConfig::default().with_shared_cache(false)
    }

    /// Configuration with shared entity caching and shared prefetch.
    pub fn shared_prefetch_config() -> TesseraConfig {
        TesseraConfig::default()
            .with_shared_cache(true)
            .with_prefetch(PrefetchTier::Shared)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for the Tessera error taxonomy.

    use super::*;

    /// Assert that a TesseraResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a TesseraResult is a schema violation.
    #[track_caller]
    pub fn assert_schema_violation<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(e) if e.is_schema_violation() => {}
            other => panic!("Expected schema violation, got: {:?}", other),
        }
    }

    /// Assert that a TesseraResult is a write contract violation.
    #[track_caller]
    pub fn assert_write_violation<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(e) if e.is_write_contract_violation() => {}
            other => panic!("Expected write contract violation, got: {:?}", other),
        }
    }

    /// Assert that a TesseraResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a TesseraResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }
}
