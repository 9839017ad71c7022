//! Declared-versus-live schema reconciliation.
//!
//! # Pipeline
//!
//! ```text
//! EntitySchema ─┐
//!               ├→ diff → SyncPlan → apply (DDL via RelationalExecutor)
//! describe ─────┘
//! ```
//!
//! Planning is pure and can be run as a dry run. Applying executes the plan
//! in order and stops at the first failing operation.

use std::collections::HashSet;
use std::sync::Arc;

use tessera_core::{AttributeDef, EntitySchema, SchemaError, TesseraResult, Value, ValueKind};
use tessera_storage::{ColumnDescriptor, RelationalExecutor};
use tracing::{debug, info, warn};

use crate::operation::{AlterFacet, SchemaOperation, SyncPlan};

/// Compute the operations that bring `live` in line with `schema`.
///
/// `live` is `None` when the table does not exist.
pub fn diff(schema: &EntitySchema, live: Option<&[ColumnDescriptor]>) -> Result<SyncPlan, SchemaError> {
    let mut plan = SyncPlan::new(schema.entity_type(), schema.table());

    let Some(live) = live else {
        plan.push(SchemaOperation::CreateTable {
            attributes: schema.attributes().to_vec(),
            primary_key: schema.primary_key().to_vec(),
        });
        return Ok(plan);
    };

    let live_column = |name: &str| live.iter().find(|c| c.field == name);

    // Renames
    let mut renamed: HashSet<&str> = HashSet::new();
    for (old_name, new_name) in schema.renames() {
        let Some(attribute) = schema.attribute(new_name) else {
            continue;
        };
        if live_column(old_name).is_none() {
            continue;
        }
        if live_column(new_name).is_some() {
            return Err(SchemaError::AmbiguousRename {
                table: schema.table().to_string(),
                old_name: old_name.clone(),
                new_name: new_name.clone(),
            });
        }
        plan.push(SchemaOperation::RenameAttribute {
            old_name: old_name.clone(),
            attribute: attribute.clone(),
            primary_key: schema.is_primary_key(new_name),
        });
        renamed.insert(new_name.as_str());
    }

    // Adds, positioned after the previous declared attribute
    let mut previous: Option<&str> = None;
    for attribute in schema.attributes() {
        let name = attribute.name.as_str();
        if live_column(name).is_none() && !renamed.contains(name) {
            plan.push(SchemaOperation::AddAttribute {
                attribute: attribute.clone(),
                primary_key: schema.is_primary_key(name),
                after: previous.map(str::to_string),
            });
        }
        previous = Some(name);
    }

    // Alters
    for attribute in schema.attributes() {
        let name = attribute.name.as_str();
        if renamed.contains(name) {
            continue;
        }
        let Some(column) = live_column(name) else {
            continue;
        };
        let primary_key = schema.is_primary_key(name);
        let facets = changed_facets(attribute, primary_key, column)?;
        if !facets.is_empty() {
            plan.push(SchemaOperation::AlterAttribute {
                attribute: attribute.clone(),
                primary_key,
                facets,
            });
        }
    }

    // Drops
    for column in live {
        let name = column.field.as_str();
        if !schema.has_attribute(name) && !schema.is_rename_source(name) {
            plan.push(SchemaOperation::DropAttribute {
                name: name.to_string(),
            });
        }
    }

    Ok(plan)
}

/// The facets of `column` that differ from `attribute`.
pub fn changed_facets(
    attribute: &AttributeDef,
    primary_key: bool,
    column: &ColumnDescriptor,
) -> Result<Vec<AlterFacet>, SchemaError> {
    let mut facets = Vec::new();

    if !same_type(attribute, &column.column_type) {
        facets.push(AlterFacet::Type);
    }
    if attribute.nullable != column.is_nullable() {
        facets.push(AlterFacet::Nullability);
    }
    if !same_default(attribute, column.default.as_deref())? {
        facets.push(AlterFacet::Default);
    }
    if normalize(attribute.extra.as_deref().unwrap_or_default()) != normalize(&column.extra) {
        facets.push(AlterFacet::Extra);
    }
    if primary_key != column.is_primary_key() {
        facets.push(AlterFacet::PrimaryKey);
    }

    Ok(facets)
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn same_type(attribute: &AttributeDef, live_type: &str) -> bool {
    if let ValueKind::Enumeration(_) = attribute.kind {
        // option sets are case-sensitive
        return attribute
            .kind
            .enum_type_string()
            .is_some_and(|declared| declared == live_type.trim());
    }
    normalize(&attribute.column_type) == normalize(live_type)
}

/// Compare defaults in the attribute's semantic type. A live default that
/// does not cast cleanly always differs.
fn same_default(attribute: &AttributeDef, live_default: Option<&str>) -> Result<bool, SchemaError> {
    let declared = match attribute.effective_default() {
        Some(raw) => Some(attribute.cast(raw.clone(), true)?),
        None => None,
    };
    let live = match live_default {
        Some(raw) => match attribute.cast(Value::Text(raw.to_string()), true) {
            Ok(value) => Some(value),
            Err(_) => return Ok(false),
        },
        None => None,
    };
    Ok(declared == live)
}

/// Reconciles live tables with declared entity schemas through a
/// [`RelationalExecutor`].
///
/// Runs once per entity type, not concurrently against the same table.
#[derive(Clone)]
pub struct SchemaSynchronizer {
    executor: Arc<dyn RelationalExecutor>,
}

impl SchemaSynchronizer {
    pub fn new(executor: Arc<dyn RelationalExecutor>) -> Self {
        Self { executor }
    }

    /// Introspect the live table and compute the plan without applying it.
    pub async fn plan(&self, schema: &EntitySchema) -> TesseraResult<SyncPlan> {
        let live = self.executor.describe_table(schema.table()).await?;
        let plan = diff(schema, live.as_deref())?;
        debug!(
            entity_type = schema.entity_type(),
            table = schema.table(),
            operations = plan.len(),
            "Planned schema sync"
        );
        Ok(plan)
    }

    /// Execute `plan` in order. Returns the number of applied operations.
    pub async fn apply(&self, plan: &SyncPlan) -> TesseraResult<usize> {
        let table = plan.table.as_str();
        for operation in plan {
            match operation {
                SchemaOperation::CreateTable {
                    attributes,
                    primary_key,
                } => {
                    self.executor.create_table(table, attributes, primary_key).await?;
                }
                SchemaOperation::RenameAttribute {
                    old_name,
                    attribute,
                    primary_key,
                } => {
                    self.executor
                        .rename_attribute(table, old_name, attribute, *primary_key)
                        .await?;
                }
                SchemaOperation::AddAttribute {
                    attribute,
                    primary_key,
                    after,
                } => {
                    self.executor
                        .add_attribute(table, attribute, *primary_key, after.as_deref())
                        .await?;
                }
                SchemaOperation::AlterAttribute {
                    attribute,
                    primary_key,
                    ..
                } => {
                    self.executor.alter_attribute(table, attribute, *primary_key).await?;
                }
                SchemaOperation::DropAttribute { name } => {
                    warn!(table, attribute = %name, "Dropping column");
                    self.executor.drop_attribute(table, name).await?;
                }
            }
            info!(table, operation = %operation, "Applied schema operation");
        }
        Ok(plan.len())
    }

    /// Plan and apply. Returns the applied plan.
    pub async fn synchronize(&self, schema: &EntitySchema) -> TesseraResult<SyncPlan> {
        let plan = self.plan(schema).await?;
        if plan.is_in_sync() {
            info!(entity_type = schema.entity_type(), table = schema.table(), "Schema in sync");
            return Ok(plan);
        }
        self.apply(&plan).await?;
        Ok(plan)
    }
}
