//! Deterministic cache keys.
//!
//! A key renders as `<entity_type>:<hex sha256(input)>`. The input is the
//! dash-joined primary-key values for a single entity, or the tagged JSON
//! encoding of the query shape for a result set. Every key of a
//! namespace therefore shares the `<entity_type>:` prefix, which is what
//! coarse invalidation scans for.

use crate::executor::SelectQuery;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tessera_core::{EntitySchema, Value};

/// Separator between primary-key values in a single-entity input.
const KEY_SEPARATOR: &str = "-";

/// Leading field of every prefetch input.
const PREFETCH_TAG: &str = "prefetch+";

/// The shape of a bulk query whose result set may be cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrefetchQuery {
    pub criteria: Option<String>,
    pub params: Vec<Value>,
    /// Attributes to retrieve; empty retrieves every attribute. A strict
    /// subset yields sparse entities.
    pub attributes: Vec<String>,
    pub group_by: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl PrefetchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, criteria: impl Into<String>, params: Vec<Value>) -> Self {
        self.criteria = Some(criteria.into());
        self.params = params;
        self
    }

    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The SELECT this query runs against `schema`'s table. Primary-key
    /// attributes are always selected when a subset is requested.
    pub fn to_select(&self, schema: &EntitySchema) -> SelectQuery {
        let mut attributes = Vec::new();
        if !self.attributes.is_empty() {
            attributes.extend(schema.primary_key().iter().cloned());
            for a in &self.attributes {
                if !attributes.contains(a) {
                    attributes.push(a.clone());
                }
            }
        }
        SelectQuery {
            table: schema.table().to_string(),
            attributes,
            criteria: self.criteria.clone(),
            params: self.params.clone(),
            group_by: self.group_by.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }

    /// Tagged, escaped rendering of every shape field. Params keep their
    /// value kind, so `Null` and `""` or `["a,b"]` and `["a", "b"]` differ.
    fn canonical(&self) -> String {
        let shape = serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self));
        format!("{}{}", PREFETCH_TAG, shape)
    }
}

/// A cache key plus the canonical input it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    entity_type: String,
    encoded: String,
    input: String,
    /// Rendered primary-key values of an entity key, `None` for null.
    key_parts: Vec<Option<String>>,
    prefetch: bool,
}

impl CacheKey {
    /// Key for the single entity of `entity_type` with primary key `key`.
    pub fn for_entity(entity_type: &str, key: &[Value]) -> Self {
        let mut derived = Self::derive(entity_type, entity_input(key), false);
        derived.key_parts = key_parts(key);
        derived
    }

    /// Key for the result set of `query` over `entity_type`.
    pub fn for_prefetch(entity_type: &str, query: &PrefetchQuery) -> Self {
        Self::derive(entity_type, query.canonical(), true)
    }

    /// The prefix every key of `entity_type` starts with.
    pub fn namespace_prefix(entity_type: &str) -> String {
        format!("{}:", entity_type)
    }

    fn derive(entity_type: &str, input: String, prefetch: bool) -> Self {
        let digest = Sha256::digest(input.as_bytes());
        Self {
            entity_type: entity_type.to_string(),
            encoded: format!("{}{}", Self::namespace_prefix(entity_type), hex::encode(digest)),
            input,
            key_parts: Vec::new(),
            prefetch,
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// The canonical input the digest was computed from.
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_prefetch(&self) -> bool {
        self.prefetch
    }

    /// Whether `key` is the primary key this entity key was derived from,
    /// compared value by value rather than through the joined input.
    pub fn identifies(&self, key: &[Value]) -> bool {
        !self.prefetch && self.key_parts == key_parts(key)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// Canonical single-entity input for a primary-key value list.
fn entity_input(key: &[Value]) -> String {
    key.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

fn key_parts(key: &[Value]) -> Vec<Option<String>> {
    key.iter()
        .map(|v| (!v.is_null()).then(|| v.to_string()))
        .collect()
}
