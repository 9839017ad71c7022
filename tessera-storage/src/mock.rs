//! In-memory relational executor for tests and local development.
//!
//! Supports conjunctive predicates of the forms `col = ?`, `col = :name`,
//! `col = 'literal'`, `col IS NULL` and `col IS NOT NULL` joined by `AND`,
//! single-column `ORDER BY` and `GROUP BY`, limit and offset, and the DDL
//! surface used by the schema synchronizer.

use crate::executor::{ColumnDescriptor, InsertOutcome, RelationalExecutor, SelectQuery};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};
use tessera_core::{AttributeDef, Row, StorageError, TesseraResult, Value};

#[derive(Debug)]
struct MockTable {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Row>,
    next_id: i64,
}

impl MockTable {
    fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == name)
    }

    fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key())
            .map(|c| c.field.as_str())
            .collect()
    }
}

#[derive(Debug, Default)]
struct Counters {
    selects: AtomicU64,
    exists: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

/// In-memory mock executor.
#[derive(Debug, Default)]
pub struct MockExecutor {
    tables: Arc<RwLock<HashMap<String, MockTable>>>,
    counters: Counters,
    ddl_log: RwLock<Vec<String>>,
    forced_insert_affected: RwLock<Option<u64>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following single-row insert report `affected` rows
    /// without storing anything, the way a store silently ignoring an insert
    /// would. `None` restores normal behavior.
    pub fn set_insert_affected(&self, affected: Option<u64>) {
        if let Ok(mut forced) = self.forced_insert_affected.write() {
            *forced = affected;
        }
    }

    /// Every stored row of `table`, with all columns in column order.
    pub fn table_rows(&self, table: &str) -> TesseraResult<Vec<Row>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table(&tables, table)?;
        Ok(t.rows.iter().map(|r| project(t, r, &[])).collect())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(table).map(|t| t.rows.len()))
            .unwrap_or(0)
    }

    pub fn select_count(&self) -> u64 {
        self.counters.selects.load(AtomicOrdering::SeqCst)
    }

    pub fn exists_count(&self) -> u64 {
        self.counters.exists.load(AtomicOrdering::SeqCst)
    }

    pub fn insert_count(&self) -> u64 {
        self.counters.inserts.load(AtomicOrdering::SeqCst)
    }

    pub fn update_count(&self) -> u64 {
        self.counters.updates.load(AtomicOrdering::SeqCst)
    }

    pub fn delete_count(&self) -> u64 {
        self.counters.deletes.load(AtomicOrdering::SeqCst)
    }

    /// DDL statements applied so far, in a compact rendering such as
    /// `ADD users.status AFTER name`.
    pub fn ddl_log(&self) -> Vec<String> {
        self.ddl_log.read().map(|log| log.clone()).unwrap_or_default()
    }

    fn record_ddl(&self, statement: String) {
        if let Ok(mut log) = self.ddl_log.write() {
            log.push(statement);
        }
    }
}

#[async_trait]
impl RelationalExecutor for MockExecutor {
    async fn select(&self, query: &SelectQuery) -> TesseraResult<Vec<Row>> {
        self.counters.selects.fetch_add(1, AtomicOrdering::SeqCst);
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table(&tables, &query.table)?;

        for attribute in &query.attributes {
            if t.column_index(attribute).is_none() {
                return Err(column_not_found(&query.table, attribute));
            }
        }

        let terms = match &query.criteria {
            Some(criteria) => bind_terms(t, &query.table, criteria, &query.params, None)?,
            None => Vec::new(),
        };
        let mut matched: Vec<&Row> = t.rows.iter().filter(|r| matches_all(r, &terms)).collect();

        if let Some(group_by) = &query.group_by {
            let column = group_by.trim();
            if t.column_index(column).is_none() {
                return Err(column_not_found(&query.table, column));
            }
            let mut seen = HashSet::new();
            matched.retain(|r| seen.insert(canonical(r.get(column))));
        }

        if let Some(order_by) = &query.order_by {
            let (column, descending) = parse_order_by(order_by);
            if t.column_index(column).is_none() {
                return Err(column_not_found(&query.table, column));
            }
            matched.sort_by(|a, b| {
                let ord = compare_values(a.get(column), b.get(column));
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| project(t, r, &query.attributes))
            .collect())
    }

    async fn exists(&self, table: &str, criteria: Option<&str>, params: &[Value]) -> TesseraResult<bool> {
        self.counters.exists.fetch_add(1, AtomicOrdering::SeqCst);
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table(&tables, table)?;
        let terms = match criteria {
            Some(criteria) => bind_terms(t, table, criteria, params, None)?,
            None => Vec::new(),
        };
        Ok(t.rows.iter().any(|r| matches_all(r, &terms)))
    }

    async fn insert(&self, table: &str, values: &Row, replace: bool) -> TesseraResult<InsertOutcome> {
        self.counters.inserts.fetch_add(1, AtomicOrdering::SeqCst);
        let forced = *self
            .forced_insert_affected
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        if let Some(affected) = forced {
            return Ok(InsertOutcome {
                affected,
                last_insert_id: None,
            });
        }

        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table_mut(&mut tables, table)?;
        insert_row(t, table, values, replace)
    }

    async fn insert_many(
        &self,
        table: &str,
        attributes: &[String],
        rows: &[Vec<Value>],
        replace: bool,
    ) -> TesseraResult<u64> {
        self.counters.inserts.fetch_add(1, AtomicOrdering::SeqCst);
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table_mut(&mut tables, table)?;

        let mut affected = 0;
        for (i, values) in rows.iter().enumerate() {
            if values.len() != attributes.len() {
                return Err(StorageError::QueryFailed {
                    table: table.to_string(),
                    reason: format!("row {} has {} values for {} columns", i, values.len(), attributes.len()),
                }
                .into());
            }
            let row: Row = attributes.iter().cloned().zip(values.iter().cloned()).collect();
            affected += insert_row(t, table, &row, replace)?.affected;
        }
        Ok(affected)
    }

    async fn update(
        &self,
        table: &str,
        values: &Row,
        criteria: &str,
        params: &Row,
        limit: Option<u64>,
    ) -> TesseraResult<u64> {
        self.counters.updates.fetch_add(1, AtomicOrdering::SeqCst);
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table_mut(&mut tables, table)?;

        for name in values.names() {
            if t.column_index(name).is_none() {
                return Err(column_not_found(table, name));
            }
        }
        let terms = bind_terms(t, table, criteria, &[], Some(params))?;

        let limit = limit.unwrap_or(u64::MAX);
        let mut affected = 0;
        for row in t.rows.iter_mut() {
            if affected >= limit {
                break;
            }
            if matches_all(row, &terms) {
                for (name, value) in values.iter() {
                    row.push(name, value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete(
        &self,
        table: &str,
        criteria: &str,
        params: &[Value],
        limit: Option<u64>,
    ) -> TesseraResult<u64> {
        self.counters.deletes.fetch_add(1, AtomicOrdering::SeqCst);
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table_mut(&mut tables, table)?;
        let terms = bind_terms(t, table, criteria, params, None)?;

        let limit = limit.unwrap_or(u64::MAX);
        let mut affected = 0;
        t.rows.retain(|row| {
            if affected < limit && matches_all(row, &terms) {
                affected += 1;
                false
            } else {
                true
            }
        });
        Ok(affected)
    }

    async fn describe_table(&self, table: &str) -> TesseraResult<Option<Vec<ColumnDescriptor>>> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.get(table).map(|t| t.columns.clone()))
    }

    async fn create_table(
        &self,
        table: &str,
        attributes: &[AttributeDef],
        primary_key: &[String],
    ) -> TesseraResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        if tables.contains_key(table) {
            return Err(StorageError::TableExists {
                table: table.to_string(),
            }
            .into());
        }
        let columns = attributes
            .iter()
            .map(|a| ColumnDescriptor::from_attribute(a, primary_key.contains(&a.name)))
            .collect();
        tables.insert(table.to_string(), MockTable::new(columns));
        self.record_ddl(format!("CREATE {}", table));
        Ok(())
    }

    async fn add_attribute(
        &self,
        table: &str,
        attribute: &AttributeDef,
        primary_key: bool,
        after: Option<&str>,
    ) -> TesseraResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table_mut(&mut tables, table)?;
        if t.column_index(&attribute.name).is_some() {
            return Err(StorageError::QueryFailed {
                table: table.to_string(),
                reason: format!("duplicate column {}", attribute.name),
            }
            .into());
        }
        let position = match after {
            None => 0,
            Some(name) => t.column_index(name).ok_or_else(|| column_not_found(table, name))? + 1,
        };

        let column = ColumnDescriptor::from_attribute(attribute, primary_key);
        let fill = column_default(&column);
        t.columns.insert(position, column);
        for row in t.rows.iter_mut() {
            row.push(attribute.name.clone(), fill.clone());
        }

        self.record_ddl(match after {
            None => format!("ADD {}.{} FIRST", table, attribute.name),
            Some(prev) => format!("ADD {}.{} AFTER {}", table, attribute.name, prev),
        });
        Ok(())
    }

    async fn alter_attribute(
        &self,
        table: &str,
        attribute: &AttributeDef,
        primary_key: bool,
    ) -> TesseraResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table_mut(&mut tables, table)?;
        let idx = t
            .column_index(&attribute.name)
            .ok_or_else(|| column_not_found(table, &attribute.name))?;
        t.columns[idx] = ColumnDescriptor::from_attribute(attribute, primary_key);
        self.record_ddl(format!("ALTER {}.{}", table, attribute.name));
        Ok(())
    }

    async fn rename_attribute(
        &self,
        table: &str,
        old_name: &str,
        attribute: &AttributeDef,
        primary_key: bool,
    ) -> TesseraResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table_mut(&mut tables, table)?;
        let idx = t
            .column_index(old_name)
            .ok_or_else(|| column_not_found(table, old_name))?;
        t.columns[idx] = ColumnDescriptor::from_attribute(attribute, primary_key);

        for row in t.rows.iter_mut() {
            *row = std::mem::take(row)
                .into_iter()
                .map(|(name, value)| {
                    if name == old_name {
                        (attribute.name.clone(), value)
                    } else {
                        (name, value)
                    }
                })
                .collect();
        }

        self.record_ddl(format!("RENAME {}.{} TO {}", table, old_name, attribute.name));
        Ok(())
    }

    async fn drop_attribute(&self, table: &str, name: &str) -> TesseraResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let t = get_table_mut(&mut tables, table)?;
        let idx = t.column_index(name).ok_or_else(|| column_not_found(table, name))?;
        t.columns.remove(idx);
        for row in t.rows.iter_mut() {
            *row = std::mem::take(row).into_iter().filter(|(n, _)| n != name).collect();
        }
        self.record_ddl(format!("DROP {}.{}", table, name));
        Ok(())
    }
}

// ============================================================================
// TABLE HELPERS
// ============================================================================

fn get_table<'a>(tables: &'a HashMap<String, MockTable>, table: &str) -> TesseraResult<&'a MockTable> {
    tables.get(table).ok_or_else(|| {
        StorageError::TableNotFound {
            table: table.to_string(),
        }
        .into()
    })
}

fn get_table_mut<'a>(
    tables: &'a mut HashMap<String, MockTable>,
    table: &str,
) -> TesseraResult<&'a mut MockTable> {
    tables.get_mut(table).ok_or_else(|| {
        StorageError::TableNotFound {
            table: table.to_string(),
        }
        .into()
    })
}

fn column_not_found(table: &str, column: &str) -> tessera_core::TesseraError {
    StorageError::ColumnNotFound {
        table: table.to_string(),
        column: column.to_string(),
    }
    .into()
}

fn column_default(column: &ColumnDescriptor) -> Value {
    column.default.clone().map(Value::Text).unwrap_or(Value::Null)
}

fn project(t: &MockTable, row: &Row, attributes: &[String]) -> Row {
    let mut out = Row::with_capacity(t.columns.len());
    for column in &t.columns {
        if !attributes.is_empty() && !attributes.contains(&column.field) {
            continue;
        }
        let value = row.get(&column.field).cloned().unwrap_or(Value::Null);
        out.push(column.field.clone(), value);
    }
    out
}

fn insert_row(t: &mut MockTable, table: &str, values: &Row, replace: bool) -> TesseraResult<InsertOutcome> {
    for name in values.names() {
        if t.column_index(name).is_none() {
            return Err(column_not_found(table, name));
        }
    }

    let mut row = Row::with_capacity(t.columns.len());
    let mut last_insert_id = None;
    for column in &t.columns {
        let given = values.get(&column.field).cloned();
        let value = if column.is_auto_increment() {
            match given {
                None | Some(Value::Null) => None,
                Some(v) if canonical(Some(&v)) == "0" || canonical(Some(&v)).is_empty() => None,
                Some(v) => Some(v),
            }
        } else {
            Some(given.unwrap_or_else(|| column_default(column)))
        };

        let value = match value {
            Some(v) => {
                if column.is_auto_increment() {
                    if let Ok(id) = canonical(Some(&v)).parse::<i64>() {
                        t.next_id = t.next_id.max(id + 1);
                    }
                }
                v
            }
            None => {
                let id = t.next_id;
                t.next_id += 1;
                last_insert_id = Some(id);
                Value::Int(id)
            }
        };
        row.push(column.field.clone(), value);
    }

    let key_columns: Vec<String> = t.primary_key().into_iter().map(str::to_string).collect();
    if !key_columns.is_empty() {
        let key_of = |r: &Row| -> Vec<String> { key_columns.iter().map(|k| canonical(r.get(k))).collect() };
        let key = key_of(&row);
        if let Some(existing) = t.rows.iter().position(|r| key_of(r) == key) {
            if !replace {
                return Err(StorageError::DuplicateKey {
                    table: table.to_string(),
                    key: key.join("-"),
                }
                .into());
            }
            t.rows.remove(existing);
        }
    }

    t.rows.push(row);
    Ok(InsertOutcome {
        affected: 1,
        last_insert_id,
    })
}

// ============================================================================
// PREDICATES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Positional,
    Named(String),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Equals(String, Operand),
    IsNull(String),
    IsNotNull(String),
}

#[derive(Debug, Clone, PartialEq)]
enum BoundTerm {
    Equals(String, Value),
    IsNull(String),
    IsNotNull(String),
}

fn split_conjunction(criteria: &str) -> Vec<&str> {
    let lower = criteria.to_ascii_lowercase();
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(pos) = lower[start..].find(" and ") {
        parts.push(criteria[start..start + pos].trim());
        start += pos + " and ".len();
    }
    parts.push(criteria[start..].trim());
    parts
}

fn unquote_identifier(raw: &str) -> String {
    raw.trim().trim_matches('`').to_string()
}

fn parse_term(table: &str, raw: &str) -> TesseraResult<Term> {
    let failed = |reason: String| -> tessera_core::TesseraError {
        StorageError::QueryFailed {
            table: table.to_string(),
            reason,
        }
        .into()
    };

    let lower = raw.to_ascii_lowercase();
    if let Some(column) = lower.strip_suffix(" is not null") {
        return Ok(Term::IsNotNull(unquote_identifier(&raw[..column.len()])));
    }
    if let Some(column) = lower.strip_suffix(" is null") {
        return Ok(Term::IsNull(unquote_identifier(&raw[..column.len()])));
    }

    let (column, rhs) = raw
        .split_once('=')
        .ok_or_else(|| failed(format!("unsupported predicate '{}'", raw)))?;
    let rhs = rhs.trim();
    let operand = if rhs == "?" {
        Operand::Positional
    } else if let Some(name) = rhs.strip_prefix(':') {
        Operand::Named(name.to_string())
    } else if rhs.len() >= 2 && rhs.starts_with('\'') && rhs.ends_with('\'') {
        Operand::Literal(Value::Text(rhs[1..rhs.len() - 1].replace("''", "'")))
    } else if let Ok(i) = rhs.parse::<i64>() {
        Operand::Literal(Value::Int(i))
    } else {
        return Err(failed(format!("unsupported operand '{}'", rhs)));
    };
    Ok(Term::Equals(unquote_identifier(column), operand))
}

fn bind_terms(
    t: &MockTable,
    table: &str,
    criteria: &str,
    positional: &[Value],
    named: Option<&Row>,
) -> TesseraResult<Vec<BoundTerm>> {
    let mut next = positional.iter();
    let mut bound = Vec::new();
    for raw in split_conjunction(criteria) {
        if raw.is_empty() {
            continue;
        }
        let term = parse_term(table, raw)?;
        let column = match &term {
            Term::Equals(c, _) | Term::IsNull(c) | Term::IsNotNull(c) => c.clone(),
        };
        if t.column_index(&column).is_none() {
            return Err(column_not_found(table, &column));
        }

        bound.push(match term {
            Term::IsNull(c) => BoundTerm::IsNull(c),
            Term::IsNotNull(c) => BoundTerm::IsNotNull(c),
            Term::Equals(c, Operand::Literal(v)) => BoundTerm::Equals(c, v),
            Term::Equals(c, Operand::Positional) => {
                let value = next.next().ok_or_else(|| StorageError::QueryFailed {
                    table: table.to_string(),
                    reason: "not enough positional parameters".to_string(),
                })?;
                BoundTerm::Equals(c, value.clone())
            }
            Term::Equals(c, Operand::Named(name)) => {
                let value = named.and_then(|p| p.get(&name)).ok_or_else(|| StorageError::QueryFailed {
                    table: table.to_string(),
                    reason: format!("missing parameter :{}", name),
                })?;
                BoundTerm::Equals(c, value.clone())
            }
        });
    }
    Ok(bound)
}

fn matches_all(row: &Row, terms: &[BoundTerm]) -> bool {
    terms.iter().all(|term| match term {
        BoundTerm::IsNull(c) => row.get(c).map_or(true, Value::is_null),
        BoundTerm::IsNotNull(c) => row.get(c).is_some_and(|v| !v.is_null()),
        BoundTerm::Equals(c, expected) => match row.get(c) {
            Some(actual) if !actual.is_null() && !expected.is_null() => {
                canonical(Some(actual)) == canonical(Some(expected))
            }
            _ => false,
        },
    })
}

/// Text form used for comparisons; the store is loosely typed.
fn canonical(value: Option<&Value>) -> String {
    value.map(Value::to_string).unwrap_or_default()
}

fn parse_order_by(order_by: &str) -> (&str, bool) {
    let mut parts = order_by.split_whitespace();
    let column = parts.next().unwrap_or_default().trim_matches('`');
    let descending = parts.next().is_some_and(|d| d.eq_ignore_ascii_case("desc"));
    (column, descending)
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => s.trim().parse().ok(),
        Value::Null => None,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::TesseraError;

    async fn users() -> MockExecutor {
        let exec = MockExecutor::new();
        exec.create_table(
            "users",
            &[
                AttributeDef::integer("id").extra("auto_increment"),
                AttributeDef::string("name", 64),
                AttributeDef::enumeration("status", ["active", "inactive"]).default_value("active"),
            ],
            &["id".to_string()],
        )
        .await
        .unwrap();
        exec
    }

    #[tokio::test]
    async fn test_insert_assigns_auto_increment_id() {
        let exec = users().await;
        let first = exec.insert("users", &Row::new().with("name", "a"), false).await.unwrap();
        let second = exec.insert("users", &Row::new().with("name", "b"), false).await.unwrap();
        assert_eq!(first.last_insert_id, Some(1));
        assert_eq!(second.last_insert_id, Some(2));

        let rows = exec.table_rows("users").unwrap();
        assert_eq!(rows[0].get("status"), Some(&Value::from("active")));
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected_unless_replace() {
        let exec = users().await;
        let row = Row::new().with("id", 5).with("name", "a");
        exec.insert("users", &row, false).await.unwrap();
        let err = exec.insert("users", &row, false).await.unwrap_err();
        assert!(matches!(err, TesseraError::Storage(StorageError::DuplicateKey { .. })));

        let replaced = Row::new().with("id", 5).with("name", "b");
        exec.insert("users", &replaced, true).await.unwrap();
        assert_eq!(exec.row_count("users"), 1);
        assert_eq!(exec.table_rows("users").unwrap()[0].get("name"), Some(&Value::from("b")));
    }

    #[tokio::test]
    async fn test_select_with_predicates_order_and_limit() {
        let exec = users().await;
        for (name, status) in [("c", "active"), ("a", "inactive"), ("b", "active")] {
            exec.insert("users", &Row::new().with("name", name).with("status", status), false)
                .await
                .unwrap();
        }

        let mut query = SelectQuery::from_table("users")
            .attributes(["name"])
            .filter("status = ?", vec![Value::from("active")]);
        query.order_by = Some("name DESC".to_string());
        let rows = exec.select(&query).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.get("name").cloned().unwrap()).collect();
        assert_eq!(names, vec![Value::from("c"), Value::from("b")]);
        assert_eq!(rows[0].len(), 1);

        query.limit = Some(1);
        query.offset = Some(1);
        assert_eq!(exec.select(&query).await.unwrap().len(), 1);
        assert_eq!(exec.select_count(), 2);
    }

    #[tokio::test]
    async fn test_update_with_named_params() {
        let exec = users().await;
        exec.insert("users", &Row::new().with("name", "a"), false).await.unwrap();
        let params = Row::new().with("id", 1);
        let affected = exec
            .update("users", &Row::new().with("name", "z"), "id = :id", &params, Some(1))
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(exec.table_rows("users").unwrap()[0].get("name"), Some(&Value::from("z")));

        let err = exec
            .update("users", &Row::new().with("name", "z"), "id = :uid", &params, None)
            .await
            .unwrap_err();
        assert!(format!("{}", err).contains(":uid"));
    }

    #[tokio::test]
    async fn test_delete_and_exists() {
        let exec = users().await;
        exec.insert("users", &Row::new().with("name", "a"), false).await.unwrap();
        assert!(exec.exists("users", Some("id = ?"), &[Value::Int(1)]).await.unwrap());
        let affected = exec.delete("users", "id = ?", &[Value::Int(1)], None).await.unwrap();
        assert_eq!(affected, 1);
        assert!(!exec.exists("users", Some("id = ?"), &[Value::Int(1)]).await.unwrap());
    }

    #[tokio::test]
    async fn test_ddl_surface() {
        let exec = users().await;
        exec.insert("users", &Row::new().with("name", "a"), false).await.unwrap();

        exec.add_attribute("users", &AttributeDef::boolean("admin"), false, Some("name"))
            .await
            .unwrap();
        exec.rename_attribute("users", "name", &AttributeDef::string("full_name", 64), false)
            .await
            .unwrap();
        exec.drop_attribute("users", "status").await.unwrap();

        let columns = exec.describe_table("users").await.unwrap().unwrap();
        let fields: Vec<_> = columns.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["id", "full_name", "admin"]);

        let rows = exec.table_rows("users").unwrap();
        assert_eq!(rows[0].get("full_name"), Some(&Value::from("a")));
        assert_eq!(
            exec.ddl_log(),
            vec![
                "CREATE users",
                "ADD users.admin AFTER name",
                "RENAME users.name TO full_name",
                "DROP users.status",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_table_and_column() {
        let exec = users().await;
        assert!(exec.describe_table("ghosts").await.unwrap().is_none());
        let err = exec.select(&SelectQuery::from_table("ghosts")).await.unwrap_err();
        assert!(matches!(err, TesseraError::Storage(StorageError::TableNotFound { .. })));

        let err = exec
            .select(&SelectQuery::from_table("users").filter("email = ?", vec![Value::from("x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, TesseraError::Storage(StorageError::ColumnNotFound { .. })));
    }

    #[test]
    fn test_split_conjunction_is_case_insensitive() {
        assert_eq!(
            split_conjunction("a = ? AND b = :b and c IS NULL"),
            vec!["a = ?", "b = :b", "c IS NULL"]
        );
    }
}
