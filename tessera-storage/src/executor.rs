//! The relational executor boundary.
//!
//! Tessera never builds SQL text beyond simple conjunctive predicates; the
//! executor owns statement construction, parameter binding, and
//! introspection. [`MockExecutor`](crate::MockExecutor) implements the whole
//! contract in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_core::{AttributeDef, Row, TesseraResult, Value};

/// A parameterized SELECT.
///
/// `criteria` uses positional `?` placeholders bound from `params` in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub table: String,
    /// Columns to return. Empty selects every column.
    pub attributes: Vec<String>,
    pub criteria: Option<String>,
    pub params: Vec<Value>,
    pub group_by: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, criteria: impl Into<String>, params: Vec<Value>) -> Self {
        self.criteria = Some(criteria.into());
        self.params = params;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of a single-row insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub affected: u64,
    /// Identity generated by the store, when it generated one.
    pub last_insert_id: Option<i64>,
}

/// A live column as reported by table introspection.
///
/// Mirrors the shape of a MySQL `DESCRIBE` row: `null` is `YES`/`NO`, `key`
/// is `PRI`, `UNI`, `MUL` or empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub field: String,
    pub column_type: String,
    pub null: String,
    pub key: String,
    pub default: Option<String>,
    pub extra: String,
}

impl ColumnDescriptor {
    /// The descriptor the store would report after creating `attribute`.
    pub fn from_attribute(attribute: &AttributeDef, primary_key: bool) -> Self {
        Self {
            field: attribute.name.clone(),
            column_type: attribute.column_type.clone(),
            null: if attribute.nullable { "YES" } else { "NO" }.to_string(),
            key: if primary_key { "PRI" } else { "" }.to_string(),
            default: attribute.effective_default().map(Value::to_string),
            extra: attribute.extra.clone().unwrap_or_default(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.null.eq_ignore_ascii_case("YES")
    }

    pub fn is_primary_key(&self) -> bool {
        self.key.eq_ignore_ascii_case("PRI")
    }

    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_ascii_lowercase().contains("auto_increment")
    }
}

/// Relational store operations used by the coordinator, the persistence
/// contracts, and the schema synchronizer.
#[async_trait]
pub trait RelationalExecutor: Send + Sync {
    async fn select(&self, query: &SelectQuery) -> TesseraResult<Vec<Row>>;

    async fn exists(&self, table: &str, criteria: Option<&str>, params: &[Value]) -> TesseraResult<bool>;

    /// Insert one row. With `replace`, an existing row with the same primary
    /// key is replaced.
    async fn insert(&self, table: &str, values: &Row, replace: bool) -> TesseraResult<InsertOutcome>;

    /// Insert many rows sharing one column list. Returns the affected count.
    async fn insert_many(
        &self,
        table: &str,
        attributes: &[String],
        rows: &[Vec<Value>],
        replace: bool,
    ) -> TesseraResult<u64>;

    /// Update rows matching `criteria`. The predicate uses `:name`
    /// placeholders bound from `params`.
    async fn update(
        &self,
        table: &str,
        values: &Row,
        criteria: &str,
        params: &Row,
        limit: Option<u64>,
    ) -> TesseraResult<u64>;

    async fn delete(
        &self,
        table: &str,
        criteria: &str,
        params: &[Value],
        limit: Option<u64>,
    ) -> TesseraResult<u64>;

    /// Live columns of `table` in storage order, or `None` when the table
    /// does not exist.
    async fn describe_table(&self, table: &str) -> TesseraResult<Option<Vec<ColumnDescriptor>>>;

    async fn create_table(
        &self,
        table: &str,
        attributes: &[AttributeDef],
        primary_key: &[String],
    ) -> TesseraResult<()>;

    /// Add a column after `after`, or first when `after` is `None`.
    async fn add_attribute(
        &self,
        table: &str,
        attribute: &AttributeDef,
        primary_key: bool,
        after: Option<&str>,
    ) -> TesseraResult<()>;

    async fn alter_attribute(
        &self,
        table: &str,
        attribute: &AttributeDef,
        primary_key: bool,
    ) -> TesseraResult<()>;

    /// Rename `old_name` to `attribute.name`, applying the full definition.
    async fn rename_attribute(
        &self,
        table: &str,
        old_name: &str,
        attribute: &AttributeDef,
        primary_key: bool,
    ) -> TesseraResult<()>;

    async fn drop_attribute(&self, table: &str, name: &str) -> TesseraResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_attribute() {
        let id = AttributeDef::integer("id").extra("auto_increment");
        let d = ColumnDescriptor::from_attribute(&id, true);
        assert_eq!(d.field, "id");
        assert_eq!(d.column_type, "int(11)");
        assert!(d.is_primary_key());
        assert!(!d.is_nullable());
        assert!(d.is_auto_increment());
        assert_eq!(d.default, None);

        let flag = AttributeDef::boolean("admin").nullable().default_value(true);
        let d = ColumnDescriptor::from_attribute(&flag, false);
        assert!(d.is_nullable());
        assert_eq!(d.key, "");
        assert_eq!(d.default.as_deref(), Some("1"));
    }

    #[test]
    fn test_select_query_builder() {
        let q = SelectQuery::from_table("users")
            .attributes(["id", "name"])
            .filter("status = ?", vec![Value::from("active")])
            .limit(5);
        assert_eq!(q.attributes, vec!["id", "name"]);
        assert_eq!(q.criteria.as_deref(), Some("status = ?"));
        assert_eq!(q.limit, Some(5));
        assert_eq!(q.offset, None);
    }
}
