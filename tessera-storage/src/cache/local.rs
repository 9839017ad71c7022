//! The process-local cache tier.
//!
//! Owned by one [`CacheCoordinator`](super::CacheCoordinator) and scoped to
//! its lifetime. Slots hold shared entity references, so a read never
//! clones or re-decodes an entity. Guards are held only for the duration of
//! a map operation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tessera_core::Entity;

use super::key::CacheKey;

#[derive(Debug, Clone)]
pub(crate) enum LocalSlot {
    Entity(Arc<Entity>),
    /// Negative marker: storage reported no such row.
    Missing,
    /// A cached prefetch result set.
    Rows(Arc<Vec<Arc<Entity>>>),
}

#[derive(Debug, Clone)]
pub(crate) struct LocalEntry {
    pub slot: LocalSlot,
    pub cached_at: DateTime<Utc>,
    input: String,
}

#[derive(Debug, Default)]
pub(crate) struct LocalTier {
    entries: RwLock<HashMap<String, LocalEntry>>,
}

impl LocalTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry under `key`, if it was stored for the same canonical input
    /// and, for entities, still belongs to that primary key.
    pub fn get(&self, key: &CacheKey) -> Option<LocalEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key.as_str())?;
        if entry.input != key.input() {
            return None;
        }
        match (&entry.slot, key.is_prefetch()) {
            (LocalSlot::Rows(_), true) => Some(entry.clone()),
            (LocalSlot::Missing, false) => Some(entry.clone()),
            (LocalSlot::Entity(e), false) if key.identifies(&e.primary_key_values()) => Some(entry.clone()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn insert(&self, key: &CacheKey, slot: LocalSlot) {
        self.insert_at(key, slot, Utc::now());
    }

    pub fn insert_at(&self, key: &CacheKey, slot: LocalSlot, cached_at: DateTime<Utc>) {
        let entry = LocalEntry {
            slot,
            cached_at,
            input: key.input().to_string(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.as_str().to_string(), entry);
    }

    /// Store a negative marker unless the slot was filled since `seen` was
    /// read. `seen` is the entity a caller found there, if any; only that
    /// entity (or an empty slot) may be replaced.
    pub fn mark_missing(&self, key: &CacheKey, seen: Option<&Arc<Entity>>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let replaceable = match entries.get(key.as_str()) {
            None => true,
            Some(entry) => match (&entry.slot, seen) {
                (LocalSlot::Entity(current), Some(seen)) => Arc::ptr_eq(current, seen),
                (LocalSlot::Missing, _) => true,
                _ => false,
            },
        };
        if replaceable {
            entries.insert(
                key.as_str().to_string(),
                LocalEntry {
                    slot: LocalSlot::Missing,
                    cached_at: Utc::now(),
                    input: key.input().to_string(),
                },
            );
        }
        replaceable
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key.as_str())
            .is_some()
    }

    /// Remove every entry whose key starts with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
