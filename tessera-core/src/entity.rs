//! The in-memory entity model and its sparse-retrieval bookkeeping.
//!
//! An [`Entity`] is one stored record of a declared [`EntitySchema`]. It
//! knows which of its attributes were actually retrieved from storage:
//! entities built from a full fetch are [`RetrievalState::FullyLoaded`],
//! entities built from a partial fetch are [`RetrievalState::Partial`] and
//! stay partial for life, growing as more attributes are retrieved.
//!
//! Attributes outside the retrieved set are never read, serialized, or
//! cached: [`Entity::get`] and [`Entity::values`] omit them.

use crate::{Row, SchemaError, TesseraResult, Value};
use crate::schema::EntitySchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Tag appended to derived identity strings.
pub const IDENTITY_DOMAIN: &str = "tessera";

/// Which attributes of an entity hold valid values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrievalState {
    /// Every declared attribute is valid.
    FullyLoaded,
    /// Only the named attributes are valid.
    Partial(BTreeSet<String>),
}

impl RetrievalState {
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial(_))
    }

    fn covers(&self, attribute: &str) -> bool {
        match self {
            Self::FullyLoaded => true,
            Self::Partial(set) => set.contains(attribute),
        }
    }
}

/// Serializable form of an entity: only retrieved values, plus the
/// retrieved set when partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_type: String,
    pub values: Row,
    pub retrieved: Option<Vec<String>>,
}

/// One stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    schema: Arc<EntitySchema>,
    values: HashMap<String, Value>,
    retrieval: RetrievalState,
}

impl Entity {
    /// Build a fully loaded entity from raw values.
    ///
    /// Attributes missing from `row` take their declared default (or the
    /// cast of null). Every value is cast.
    pub fn new(schema: Arc<EntitySchema>, row: Row, strict: bool) -> TesseraResult<Self> {
        let mut values = HashMap::with_capacity(schema.attributes().len());
        for (name, raw) in row {
            let attr = lookup(&schema, &name)?;
            values.insert(name, attr.cast(raw, strict)?);
        }
        for attr in schema.attributes() {
            if !values.contains_key(&attr.name) {
                values.insert(attr.name.clone(), attr.initial_value(strict)?);
            }
        }
        Ok(Self {
            schema,
            values,
            retrieval: RetrievalState::FullyLoaded,
        })
    }

    /// Build an entity from a storage row that may cover only some
    /// attributes.
    ///
    /// If the row covers every declared attribute the entity is fully
    /// loaded; otherwise it is partial over exactly the row's attributes.
    pub fn from_row(schema: Arc<EntitySchema>, row: Row, strict: bool) -> TesseraResult<Self> {
        let complete = schema.attributes().iter().all(|a| row.contains(&a.name));
        if complete {
            return Self::new(schema, row, strict);
        }

        let mut entity = Self {
            schema,
            values: HashMap::new(),
            retrieval: RetrievalState::Partial(BTreeSet::new()),
        };
        entity.on_attributes_retrieved(row, strict)?;
        Ok(entity)
    }

    /// Rebuild an entity from its snapshot. Values are trusted as already
    /// canonical; unknown attributes are rejected.
    pub fn from_snapshot(schema: Arc<EntitySchema>, snapshot: EntitySnapshot) -> TesseraResult<Self> {
        if snapshot.entity_type != schema.entity_type() {
            return Err(SchemaError::InvalidDeclaration {
                entity_type: schema.entity_type().to_string(),
                reason: format!("snapshot belongs to {}", snapshot.entity_type),
            }
            .into());
        }

        let mut values = HashMap::with_capacity(snapshot.values.len());
        for (name, value) in snapshot.values {
            lookup(&schema, &name)?;
            values.insert(name, value);
        }

        let retrieval = match snapshot.retrieved {
            None => {
                if let Some(missing) = schema
                    .attributes()
                    .iter()
                    .find(|a| !values.contains_key(&a.name))
                {
                    return Err(SchemaError::InvalidValue {
                        attribute: missing.name.clone(),
                        reason: "missing from a fully loaded snapshot".to_string(),
                    }
                    .into());
                }
                RetrievalState::FullyLoaded
            }
            Some(names) => {
                let set: BTreeSet<String> = names.into_iter().collect();
                for name in &set {
                    lookup(&schema, name)?;
                }
                values.retain(|name, _| set.contains(name));
                RetrievalState::Partial(set)
            }
        };

        Ok(Self {
            schema,
            values,
            retrieval,
        })
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn entity_type(&self) -> &str {
        self.schema.entity_type()
    }

    /// Declared attribute names, in declaration order.
    pub fn attributes(&self) -> Vec<&str> {
        self.schema.attribute_names()
    }

    /// Primary-key attribute names, in key order.
    pub fn primary_key(&self) -> &[String] {
        self.schema.primary_key()
    }

    pub fn retrieval_state(&self) -> &RetrievalState {
        &self.retrieval
    }

    /// The value of a retrieved attribute. Attributes that were not
    /// retrieved yield `None`, never a default.
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        if !self.retrieval.covers(attribute) {
            return None;
        }
        self.values.get(attribute)
    }

    /// Attribute values in declaration order, restricted to the primary key
    /// when `primary_key_only` is set and always restricted to retrieved
    /// attributes.
    pub fn values(&self, primary_key_only: bool) -> Row {
        let mut row = Row::with_capacity(self.values.len());
        for attr in self.schema.attributes() {
            if primary_key_only && !self.schema.is_primary_key(&attr.name) {
                continue;
            }
            if let Some(value) = self.get(&attr.name) {
                row.push(attr.name.clone(), value.clone());
            }
        }
        row
    }

    /// Primary-key values in key order. Key attributes that were not
    /// retrieved are omitted.
    pub fn primary_key_values(&self) -> Vec<Value> {
        self.schema
            .primary_key()
            .iter()
            .filter_map(|k| self.get(k).cloned())
            .collect()
    }

    /// True iff this entity is partial and `attributes` is not a subset of
    /// the retrieved set. Fully loaded entities are never sparse.
    pub fn is_sparse<S: AsRef<str>>(&self, attributes: &[S]) -> bool {
        match &self.retrieval {
            RetrievalState::FullyLoaded => false,
            RetrievalState::Partial(set) => attributes.iter().any(|a| !set.contains(a.as_ref())),
        }
    }

    /// Requested attributes that are not yet retrieved.
    pub fn missing_attributes<S: AsRef<str>>(&self, attributes: &[S]) -> Vec<String> {
        let mut missing = Vec::new();
        for attribute in attributes {
            let name: &str = attribute.as_ref();
            if !self.retrieval.covers(name) {
                missing.push(name.to_string());
            }
        }
        missing
    }

    /// Merge newly retrieved raw values into this entity, casting exactly
    /// those attributes. Fully loaded entities stay fully loaded; partial
    /// entities grow their retrieved set. Applying the same row twice is a
    /// no-op the second time.
    pub fn on_attributes_retrieved(&mut self, row: Row, strict: bool) -> TesseraResult<()> {
        let mut cast = Vec::with_capacity(row.len());
        for (name, raw) in row {
            let attr = lookup(&self.schema, &name)?;
            cast.push((name, attr.cast(raw, strict)?));
        }

        for (name, value) in cast {
            if let RetrievalState::Partial(set) = &mut self.retrieval {
                set.insert(name.clone());
            }
            self.values.insert(name, value);
        }
        Ok(())
    }

    /// Assign a new value to a retrieved attribute.
    pub fn set(&mut self, attribute: &str, raw: impl Into<Value>, strict: bool) -> TesseraResult<()> {
        let attr = lookup(&self.schema, attribute)?;
        if !self.retrieval.covers(attribute) {
            return Err(SchemaError::InvalidValue {
                attribute: attribute.to_string(),
                reason: "attribute was not retrieved".to_string(),
            }
            .into());
        }
        let value = attr.cast(raw.into(), strict)?;
        self.values.insert(attribute.to_string(), value);
        Ok(())
    }

    /// Presentational identity: lowercase, dot-joined primary-key values
    /// followed by the entity type and [`IDENTITY_DOMAIN`].
    pub fn uuid(&self) -> String {
        let key: Vec<String> = self.primary_key_values().iter().map(Value::to_string).collect();
        format!("{}.{}.{}", key.join("."), self.entity_type(), IDENTITY_DOMAIN).to_lowercase()
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        let retrieved = match &self.retrieval {
            RetrievalState::FullyLoaded => None,
            RetrievalState::Partial(set) => Some(set.iter().cloned().collect()),
        };
        EntitySnapshot {
            entity_type: self.entity_type().to_string(),
            values: self.values(false),
            retrieved,
        }
    }
}

fn lookup<'a>(schema: &'a EntitySchema, name: &str) -> Result<&'a crate::AttributeDef, SchemaError> {
    schema
        .attribute(name)
        .ok_or_else(|| SchemaError::UnknownAttribute {
            entity_type: schema.entity_type().to_string(),
            attribute: name.to_string(),
        })
}
