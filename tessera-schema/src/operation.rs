//! Structural operations and the ordered plan that carries them.

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::AttributeDef;

/// A facet of a live column that differs from its declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlterFacet {
    Type,
    Nullability,
    Default,
    Extra,
    PrimaryKey,
}

impl fmt::Display for AlterFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlterFacet::Type => "type",
            AlterFacet::Nullability => "nullability",
            AlterFacet::Default => "default",
            AlterFacet::Extra => "extra",
            AlterFacet::PrimaryKey => "primary key",
        };
        f.write_str(name)
    }
}

/// One structural change to a table.
///
/// Attribute-level operations carry the full declared definition, which is
/// the target state of the column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaOperation {
    CreateTable {
        attributes: Vec<AttributeDef>,
        primary_key: Vec<String>,
    },
    RenameAttribute {
        old_name: String,
        attribute: AttributeDef,
        primary_key: bool,
    },
    /// `after: None` places the column first.
    AddAttribute {
        attribute: AttributeDef,
        primary_key: bool,
        after: Option<String>,
    },
    AlterAttribute {
        attribute: AttributeDef,
        primary_key: bool,
        facets: Vec<AlterFacet>,
    },
    DropAttribute {
        name: String,
    },
}

impl SchemaOperation {
    /// The attribute this operation targets, by its resulting name.
    pub fn attribute_name(&self) -> Option<&str> {
        match self {
            SchemaOperation::CreateTable { .. } => None,
            SchemaOperation::RenameAttribute { attribute, .. }
            | SchemaOperation::AddAttribute { attribute, .. }
            | SchemaOperation::AlterAttribute { attribute, .. } => Some(&attribute.name),
            SchemaOperation::DropAttribute { name } => Some(name),
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, SchemaOperation::DropAttribute { .. })
    }
}

impl fmt::Display for SchemaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaOperation::CreateTable { attributes, .. } => {
                write!(f, "create table ({} attributes)", attributes.len())
            }
            SchemaOperation::RenameAttribute {
                old_name, attribute, ..
            } => write!(f, "rename {} to {} {}", old_name, attribute.name, attribute.column_type),
            SchemaOperation::AddAttribute {
                attribute, after, ..
            } => match after {
                Some(prev) => write!(f, "add {} {} after {}", attribute.name, attribute.column_type, prev),
                None => write!(f, "add {} {} first", attribute.name, attribute.column_type),
            },
            SchemaOperation::AlterAttribute {
                attribute, facets, ..
            } => {
                let facets: Vec<String> = facets.iter().map(ToString::to_string).collect();
                write!(f, "alter {} ({})", attribute.name, facets.join(", "))
            }
            SchemaOperation::DropAttribute { name } => write!(f, "drop {}", name),
        }
    }
}

/// The ordered operations that reconcile one table with its declaration:
/// renames, then adds, then alters, then drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub entity_type: String,
    pub table: String,
    pub operations: Vec<SchemaOperation>,
}

impl SyncPlan {
    pub fn new(entity_type: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            table: table.into(),
            operations: Vec::new(),
        }
    }

    /// True when the live table already matches the declaration.
    pub fn is_in_sync(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SchemaOperation> {
        self.operations.iter()
    }

    pub fn creates_table(&self) -> bool {
        matches!(self.operations.first(), Some(SchemaOperation::CreateTable { .. }))
    }

    /// True if applying the plan would drop a column.
    pub fn has_destructive(&self) -> bool {
        self.operations.iter().any(SchemaOperation::is_destructive)
    }

    pub(crate) fn push(&mut self, operation: SchemaOperation) {
        self.operations.push(operation);
    }
}

impl<'a> IntoIterator for &'a SyncPlan {
    type Item = &'a SchemaOperation;
    type IntoIter = std::slice::Iter<'a, SchemaOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let add = SchemaOperation::AddAttribute {
            attribute: AttributeDef::string("nick", 32),
            primary_key: false,
            after: Some("name".to_string()),
        };
        assert_eq!(add.to_string(), "add nick varchar(32) after name");

        let alter = SchemaOperation::AlterAttribute {
            attribute: AttributeDef::integer("age"),
            primary_key: false,
            facets: vec![AlterFacet::Type, AlterFacet::Default],
        };
        assert_eq!(alter.to_string(), "alter age (type, default)");
    }

    #[test]
    fn test_plan_flags() {
        let mut plan = SyncPlan::new("user", "users");
        assert!(plan.is_in_sync());
        plan.push(SchemaOperation::DropAttribute {
            name: "legacy".to_string(),
        });
        assert!(plan.has_destructive());
        assert!(!plan.creates_table());
        assert_eq!(plan.iter().next().and_then(|op| op.attribute_name()), Some("legacy"));
    }
}
