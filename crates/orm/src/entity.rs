//! Entity traits, primary key values and identity.

use crate::error::{ModelError, ModelResult};
use crate::schema::EntitySchema;
use serde_json::{Map, Value};
use std::fmt;

/// Storage representation of an entity: stored columns by name.
pub type Record = Map<String, Value>;

/// State of a relationship attribute on a loaded entity.
pub enum Related<'a> {
    /// The relationship was never fetched.
    NotLoaded,
    /// Loaded, with no related entity.
    Null,
    One(&'a dyn EntityView),
    Many(Vec<&'a dyn EntityView>),
}

/// Object safe read access to an entity, used for nested conversion where
/// related entities have different concrete types.
pub trait EntityView: Send + Sync {
    fn entity_schema(&self) -> &'static EntitySchema;

    /// Value of a scalar attribute or hybrid property.
    fn attribute(&self, name: &str) -> Option<Value>;

    fn relation(&self, name: &str) -> Related<'_>;
}

/// A mapped entity type.
///
/// Implementations describe themselves through a static [`EntitySchema`]
/// and expose attribute access by name.
pub trait Entity: Default + Send + Sync + 'static {
    fn schema() -> &'static EntitySchema;

    /// Current value of a stored column or hybrid property. `None` when the
    /// name is not a scalar attribute of the entity.
    fn get(&self, name: &str) -> Option<Value>;

    /// Assign a stored column or writable hybrid property.
    fn set(&mut self, name: &str, value: Value) -> ModelResult<()>;

    fn related(&self, _name: &str) -> Related<'_> {
        Related::NotLoaded
    }

    fn set_related(&mut self, name: &str, _value: Value) -> ModelResult<()> {
        Err(ModelError::Relationship(format!(
            "relationship '{}' of '{}' cannot be assigned from a mapping",
            name,
            Self::schema().name()
        )))
    }

    /// Primary key value of this instance.
    fn primary_key(&self) -> PrimaryKeyValue {
        let columns = Self::schema().primary_key_columns();
        let values: Vec<Value> = columns
            .iter()
            .map(|column| self.get(column).unwrap_or(Value::Null))
            .collect();
        PrimaryKeyValue::from_values(values)
    }

    fn primary_key_tuple(&self) -> Vec<Value> {
        self.primary_key().into_values()
    }

    /// Identity used for equality and hashing; `None` for entities whose key
    /// is not yet assigned.
    fn entity_key(&self) -> Option<EntityKey> {
        let pk = self.primary_key();
        pk.is_comparable().then(|| EntityKey {
            entity: Self::schema().name(),
            values: pk.into_values().iter().map(Value::to_string).collect(),
        })
    }

    /// Stored columns of this instance regardless of exposure.
    fn to_record(&self) -> Record {
        Self::schema()
            .fields()
            .iter()
            .filter(|f| f.is_stored())
            .map(|f| (f.name.to_string(), self.get(f.name).unwrap_or(Value::Null)))
            .collect()
    }

    /// Build an entity from a stored record. Unknown keys are ignored.
    fn from_record(record: &Record) -> ModelResult<Self> {
        let mut entity = Self::default();
        for field in Self::schema().fields().iter().filter(|f| f.is_stored()) {
            if let Some(value) = record.get(field.name) {
                entity.set(field.name, value.clone())?;
            }
        }
        Ok(entity)
    }
}

impl<E: Entity> EntityView for E {
    fn entity_schema(&self) -> &'static EntitySchema {
        E::schema()
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.get(name)
    }

    fn relation(&self, name: &str) -> Related<'_> {
        self.related(name)
    }
}

/// Primary key of an entity instance.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKeyValue {
    /// Entity has no primary key columns.
    None,
    Single(Value),
    Composite(Vec<Value>),
}

impl PrimaryKeyValue {
    pub fn from_values(mut values: Vec<Value>) -> Self {
        match values.len() {
            0 => PrimaryKeyValue::None,
            1 => PrimaryKeyValue::Single(values.remove(0)),
            _ => PrimaryKeyValue::Composite(values),
        }
    }

    /// Key values as a tuple-like list.
    pub fn as_tuple(&self) -> Vec<Value> {
        match self {
            PrimaryKeyValue::None => Vec::new(),
            PrimaryKeyValue::Single(value) => vec![value.clone()],
            PrimaryKeyValue::Composite(values) => values.clone(),
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            PrimaryKeyValue::None => Vec::new(),
            PrimaryKeyValue::Single(value) => vec![value],
            PrimaryKeyValue::Composite(values) => values,
        }
    }

    /// A key can identify an instance when it exists and has no null part.
    pub fn is_comparable(&self) -> bool {
        match self {
            PrimaryKeyValue::None => false,
            PrimaryKeyValue::Single(value) => !value.is_null(),
            PrimaryKeyValue::Composite(values) => values.iter().all(|v| !v.is_null()),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PrimaryKeyValue::Composite(_))
    }
}

impl fmt::Display for PrimaryKeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKeyValue::None => write!(f, "<none>"),
            PrimaryKeyValue::Single(value) => write!(f, "{}", value),
            PrimaryKeyValue::Composite(values) => {
                let parts: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// Identity of a persisted entity: its entity name and key values in their
/// canonical JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    entity: &'static str,
    values: Vec<String>,
}

impl EntityKey {
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Two entities are the same when both have comparable keys that are equal.
pub fn same_entity<A: Entity, B: Entity>(left: &A, right: &B) -> bool {
    match (left.entity_key(), right.entity_key()) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}
