//! Error types for Tessera operations

use thiserror::Error;

/// Errors raised by the relational executor or the persistence path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Table already exists: {table}")]
    TableExists { table: String },

    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    #[error("Query on {table} failed: {reason}")]
    QueryFailed { table: String, reason: String },

    #[error("Duplicate primary key {key} in table {table}")]
    DuplicateKey { table: String, key: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Schema violations: values outside a declared shape, or structural changes
/// the synchronizer cannot express.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Value '{value}' for {attribute} is not one of [{}]", options.join(", "))]
    EnumOutOfRange {
        attribute: String,
        value: String,
        options: Vec<String>,
    },

    #[error("Cannot cast value for {attribute}: {reason}")]
    InvalidValue { attribute: String, reason: String },

    #[error("Attribute {attribute} is not declared on {entity_type}")]
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },

    #[error("Invalid schema for {entity_type}: {reason}")]
    InvalidDeclaration { entity_type: String, reason: String },

    #[error("Unsupported change to {table}.{attribute}: {reason}")]
    UnsupportedChange {
        table: String,
        attribute: String,
        reason: String,
    },

    #[error("Ambiguous rename on {table}: both {old_name} and {new_name} exist")]
    AmbiguousRename {
        table: String,
        old_name: String,
        new_name: String,
    },
}

/// Write contract violations. Always surfaced, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("Write to {table} affected {actual} rows, expected {expected}")]
    AffectedRowMismatch {
        table: String,
        expected: u64,
        actual: u64,
    },

    #[error("Row {row} for {table} has {got} values, expected {expected}")]
    RowWidthMismatch {
        table: String,
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("Parameter :{name} used in both the value set and the where clause of {table}")]
    DuplicateParameter { table: String, name: String },
}

/// Shared cache backend errors.
///
/// The coordinator treats every one of these as "tier unavailable for this
/// call" and falls back to local-only caching.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Shared cache backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Deserialization error: {reason}")]
    Deserialization { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Entity type not registered: {entity_type}")]
    UnknownEntityType { entity_type: String },
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TesseraError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Schema violation: {0}")]
    Schema(#[from] SchemaError),

    #[error("Write contract violation: {0}")]
    Write(#[from] WriteError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TesseraError {
    /// True for errors in the schema violation class.
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// True for errors in the write contract violation class.
    pub fn is_write_contract_violation(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

// =============================================================================
// TESTS
// =============================================================================
