//! Declared entity schemas.
//!
//! An [`EntitySchema`] is declared once per entity type: an ordered list of
//! [`AttributeDef`]s, the ordered primary key, and an optional rename map used
//! by the schema synchronizer to carry old column names forward.

use crate::{cast_value, SchemaError, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Declaration of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub kind: ValueKind,
    /// Storage column type as the database reports it, e.g. `varchar(255)`.
    pub column_type: String,
    pub nullable: bool,
    pub default: Option<Value>,
    /// Storage extra flags, e.g. `auto_increment`.
    pub extra: Option<String>,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, kind: ValueKind, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            column_type: column_type.into(),
            nullable: false,
            default: None,
            extra: None,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Integer, "int(11)")
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Boolean, "tinyint(1)")
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Float, "double")
    }

    pub fn string(name: impl Into<String>, length: u32) -> Self {
        Self::new(name, ValueKind::String, format!("varchar({})", length))
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::String, "text")
    }

    pub fn enumeration<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = ValueKind::Enumeration(options.into_iter().map(Into::into).collect());
        let column_type = kind.enum_type_string().unwrap_or_default();
        Self::new(name, kind, column_type)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub fn column_type(mut self, column_type: impl Into<String>) -> Self {
        self.column_type = column_type.into();
        self
    }

    /// The declared default, with an explicit `Null` treated as no default.
    pub fn effective_default(&self) -> Option<&Value> {
        self.default.as_ref().filter(|v| !v.is_null())
    }

    /// Cast a raw value for this attribute.
    pub fn cast(&self, raw: Value, strict: bool) -> Result<Value, SchemaError> {
        cast_value(&self.name, &self.kind, self.nullable, raw, strict)
    }

    /// The value this attribute takes when a full record omits it.
    pub fn initial_value(&self, strict: bool) -> Result<Value, SchemaError> {
        let raw = self.effective_default().cloned().unwrap_or(Value::Null);
        self.cast(raw, strict)
    }
}

/// The static schema of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    entity_type: String,
    table: String,
    attributes: Vec<AttributeDef>,
    primary_key: Vec<String>,
    renames: Vec<(String, String)>,
}

impl EntitySchema {
    /// Start declaring a schema for `entity_type`. The table name defaults to
    /// the entity type.
    pub fn builder(entity_type: impl Into<String>) -> EntitySchemaBuilder {
        let entity_type = entity_type.into();
        EntitySchemaBuilder {
            table: entity_type.clone(),
            entity_type,
            attributes: Vec::new(),
            primary_key: Vec::new(),
            renames: Vec::new(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    /// Rename pairs as `(old_name, new_name)`.
    pub fn renames(&self) -> &[(String, String)] {
        &self.renames
    }

    /// The old name an attribute was renamed from, if any.
    pub fn renamed_from(&self, new_name: &str) -> Option<&str> {
        self.renames
            .iter()
            .find(|(_, new)| new == new_name)
            .map(|(old, _)| old.as_str())
    }

    /// True if `old_name` is the source side of a rename.
    pub fn is_rename_source(&self, old_name: &str) -> bool {
        self.renames.iter().any(|(old, _)| old == old_name)
    }

    fn invalid(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::InvalidDeclaration {
            entity_type: self.entity_type.clone(),
            reason: reason.into(),
        }
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.entity_type.trim().is_empty() {
            return Err(self.invalid("entity type must not be empty"));
        }
        if self.entity_type.contains(':') {
            // ':' ends the cache namespace prefix
            return Err(self.invalid("entity type must not contain ':'"));
        }
        if self.attributes.is_empty() {
            return Err(self.invalid("at least one attribute must be declared"));
        }

        let mut seen = HashSet::new();
        for attr in &self.attributes {
            if !seen.insert(attr.name.as_str()) {
                return Err(self.invalid(format!("attribute {} declared twice", attr.name)));
            }
            if let Some(default) = attr.effective_default() {
                attr.cast(default.clone(), true)?;
            }
        }

        if self.primary_key.is_empty() {
            return Err(self.invalid("primary key must name at least one attribute"));
        }
        for key in &self.primary_key {
            if !seen.contains(key.as_str()) {
                return Err(self.invalid(format!("primary key attribute {} is not declared", key)));
            }
        }

        for (old, new) in &self.renames {
            if !seen.contains(new.as_str()) {
                return Err(self.invalid(format!("rename target {} is not declared", new)));
            }
            if seen.contains(old.as_str()) {
                return Err(self.invalid(format!("rename source {} is still declared", old)));
            }
        }

        Ok(())
    }
}

/// Builder for [`EntitySchema`].
#[derive(Debug, Clone)]
pub struct EntitySchemaBuilder {
    entity_type: String,
    table: String,
    attributes: Vec<AttributeDef>,
    primary_key: Vec<String>,
    renames: Vec<(String, String)>,
}

impl EntitySchemaBuilder {
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn primary_key<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn rename(mut self, old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        self.renames.push((old_name.into(), new_name.into()));
        self
    }

    pub fn build(self) -> Result<EntitySchema, SchemaError> {
        let schema = EntitySchema {
            entity_type: self.entity_type,
            table: self.table,
            attributes: self.attributes,
            primary_key: self.primary_key,
            renames: self.renames,
        };
        schema.validate()?;
        Ok(schema)
    }
}
