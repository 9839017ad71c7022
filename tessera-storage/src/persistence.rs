//! Entity persistence over a [`RelationalExecutor`], enforcing the write
//! contracts on this side of the boundary.
//!
//! - a single-row insert must affect exactly one row;
//! - every row of a multi-row insert must be as wide as the column list,
//!   checked before anything executes;
//! - an update's value names must not collide with its where-parameter
//!   names, checked before anything executes.

use crate::executor::{InsertOutcome, RelationalExecutor, SelectQuery};
use std::sync::Arc;
use tessera_core::{Entity, EntitySchema, Row, SchemaError, TesseraResult, Value, WriteError};

/// Build `a = ? AND b = ?` over the primary key.
pub fn primary_key_criteria(schema: &EntitySchema) -> String {
    schema
        .primary_key()
        .iter()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Check that `key` supplies one value per primary-key attribute.
pub fn check_key_arity(schema: &EntitySchema, key: &[Value]) -> Result<(), SchemaError> {
    let expected = schema.primary_key().len();
    if key.len() != expected {
        return Err(SchemaError::InvalidValue {
            attribute: schema.primary_key().join(","),
            reason: format!("expected {} key values, got {}", expected, key.len()),
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct EntityPersistence {
    executor: Arc<dyn RelationalExecutor>,
}

impl EntityPersistence {
    pub fn new(executor: Arc<dyn RelationalExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<dyn RelationalExecutor> {
        &self.executor
    }

    /// Select `attributes` (every attribute when empty) of the row with
    /// primary key `key`. The primary key is always selected.
    pub async fn select_by_key<S: AsRef<str>>(
        &self,
        schema: &EntitySchema,
        key: &[Value],
        attributes: &[S],
    ) -> TesseraResult<Option<Row>> {
        check_key_arity(schema, key)?;

        let mut columns: Vec<String> = Vec::new();
        if !attributes.is_empty() {
            for k in schema.primary_key() {
                columns.push(k.clone());
            }
            for attribute in attributes {
                let name = attribute.as_ref();
                if !schema.has_attribute(name) {
                    return Err(SchemaError::UnknownAttribute {
                        entity_type: schema.entity_type().to_string(),
                        attribute: name.to_string(),
                    }
                    .into());
                }
                if !columns.iter().any(|c| c == name) {
                    columns.push(name.to_string());
                }
            }
        }

        let query = SelectQuery::from_table(schema.table())
            .attributes(columns)
            .filter(primary_key_criteria(schema), key.to_vec())
            .limit(1);
        let mut rows = self.executor.select(&query).await?;
        Ok(rows.pop())
    }

    pub async fn exists(&self, schema: &EntitySchema, key: &[Value]) -> TesseraResult<bool> {
        check_key_arity(schema, key)?;
        let criteria = primary_key_criteria(schema);
        self.executor.exists(schema.table(), Some(&criteria), key).await
    }

    /// Insert an entity and return it as stored: when the store generated
    /// the key for a single auto-increment primary-key attribute, the
    /// returned entity carries it.
    pub async fn insert(&self, entity: &Entity, strict: bool) -> TesseraResult<Entity> {
        let schema = entity.schema();
        let outcome = self.insert_row(schema.table(), &entity.values(false), false).await?;

        let mut stored = entity.clone();
        if let (Some(id), [key]) = (outcome.last_insert_id, schema.primary_key()) {
            let generated = schema
                .attribute(key)
                .and_then(|a| a.extra.as_deref())
                .is_some_and(|e| e.to_ascii_lowercase().contains("auto_increment"));
            if generated {
                stored.set(key, id, strict)?;
            }
        }
        Ok(stored)
    }

    /// Single-row insert with the affected-row contract.
    pub async fn insert_row(&self, table: &str, values: &Row, replace: bool) -> TesseraResult<InsertOutcome> {
        let outcome = self.executor.insert(table, values, replace).await?;
        if outcome.affected != 1 {
            return Err(WriteError::AffectedRowMismatch {
                table: table.to_string(),
                expected: 1,
                actual: outcome.affected,
            }
            .into());
        }
        Ok(outcome)
    }

    /// Multi-row insert. Every row must carry one value per attribute.
    pub async fn insert_many(
        &self,
        table: &str,
        attributes: &[String],
        rows: &[Vec<Value>],
        replace: bool,
    ) -> TesseraResult<u64> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != attributes.len() {
                return Err(WriteError::RowWidthMismatch {
                    table: table.to_string(),
                    row: i,
                    expected: attributes.len(),
                    got: row.len(),
                }
                .into());
            }
        }
        if rows.is_empty() {
            return Ok(0);
        }
        self.executor.insert_many(table, attributes, rows, replace).await
    }

    /// Persist the retrieved non-key attributes of `entity`, addressed by
    /// its primary key.
    pub async fn update(&self, entity: &Entity) -> TesseraResult<u64> {
        let schema = entity.schema();
        let key = entity.primary_key_values();
        check_key_arity(schema, &key)?;

        let mut values = Row::new();
        for (name, value) in entity.values(false).iter() {
            if !schema.is_primary_key(name) {
                values.push(name, value.clone());
            }
        }
        if values.is_empty() {
            return Ok(0);
        }

        let criteria = schema
            .primary_key()
            .iter()
            .map(|k| format!("{} = :{}", k, k))
            .collect::<Vec<_>>()
            .join(" AND ");
        let params: Row = schema.primary_key().iter().cloned().zip(key).collect();
        self.update_where(schema.table(), &values, &criteria, &params, Some(1)).await
    }

    /// Update with named where parameters. Value names and parameter names
    /// must be disjoint.
    pub async fn update_where(
        &self,
        table: &str,
        values: &Row,
        criteria: &str,
        params: &Row,
        limit: Option<u64>,
    ) -> TesseraResult<u64> {
        if let Some(name) = values.names().find(|n| params.contains(n)) {
            return Err(WriteError::DuplicateParameter {
                table: table.to_string(),
                name: name.to_string(),
            }
            .into());
        }
        self.executor.update(table, values, criteria, params, limit).await
    }

    pub async fn delete(&self, schema: &EntitySchema, key: &[Value]) -> TesseraResult<u64> {
        check_key_arity(schema, key)?;
        let criteria = primary_key_criteria(schema);
        self.executor.delete(schema.table(), &criteria, key, Some(1)).await
    }
}
