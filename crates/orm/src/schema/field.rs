//! Field descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

/// What an entity attribute is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    PrimaryKey,
    ForeignKey,
    Column,
    /// Computed attribute that is not stored
    Hybrid,
    Relationship,
}

/// Value type of a scalar attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    Boolean,
    String,
    Text,
    Date,
    Time,
    DateTime,
    Uuid,
    Json,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::DateTime => "datetime",
            FieldType::Uuid => "uuid",
            FieldType::Json => "json",
        };
        write!(f, "{}", name)
    }
}

/// Static description of one entity attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub field_type: FieldType,
    pub nullable: bool,
    /// Explicit exposure flag; names starting with `_` are never exposed.
    pub exposed: bool,
    /// Whether the attribute may be shown in read-only listings.
    pub readable: bool,
    /// Whether the store fills the value when it is absent (autoincrement,
    /// server defaults).
    pub has_default: bool,
    /// Hybrids are read-only unless marked writable.
    pub writable: bool,
    pub max_length: Option<usize>,
    /// `table.column` a foreign key points to.
    pub references: Option<&'static str>,
    /// Entity name a relationship points to.
    pub target: Option<&'static str>,
    /// Relationship holds a collection.
    pub many: bool,
}

impl FieldDescriptor {
    fn new(name: &'static str, kind: FieldKind, field_type: FieldType) -> Self {
        Self {
            name,
            kind,
            field_type,
            nullable: false,
            exposed: true,
            readable: true,
            has_default: false,
            writable: true,
            max_length: None,
            references: None,
            target: None,
            many: false,
        }
    }

    /// Primary key column. Integer keys are filled by the store when absent.
    pub fn primary_key(name: &'static str, field_type: FieldType) -> Self {
        let mut field = Self::new(name, FieldKind::PrimaryKey, field_type);
        field.has_default = field_type == FieldType::Integer;
        field
    }

    pub fn foreign_key(name: &'static str, field_type: FieldType, references: &'static str) -> Self {
        let mut field = Self::new(name, FieldKind::ForeignKey, field_type);
        field.references = Some(references);
        field
    }

    pub fn column(name: &'static str, field_type: FieldType) -> Self {
        Self::new(name, FieldKind::Column, field_type)
    }

    pub fn hybrid(name: &'static str, field_type: FieldType) -> Self {
        let mut field = Self::new(name, FieldKind::Hybrid, field_type);
        field.writable = false;
        field.nullable = true;
        field
    }

    /// Relationship to another entity; `many` for collections.
    pub fn relationship(name: &'static str, target: &'static str, many: bool) -> Self {
        let mut field = Self::new(name, FieldKind::Relationship, FieldType::Json);
        field.target = Some(target);
        field.many = many;
        field.nullable = true;
        field
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.exposed = false;
        self
    }

    pub fn not_readable(mut self) -> Self {
        self.readable = false;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Exposure as seen by serialization: explicit flag and name rule.
    pub fn is_exposed(&self) -> bool {
        self.exposed && !self.name.starts_with('_')
    }

    /// Stored attribute (primary key, foreign key or plain column).
    pub fn is_stored(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::PrimaryKey | FieldKind::ForeignKey | FieldKind::Column
        )
    }

    pub fn is_relationship(&self) -> bool {
        self.kind == FieldKind::Relationship
    }

    /// Value must be supplied when creating a record.
    pub fn is_required(&self) -> bool {
        self.is_stored() && !self.nullable && !self.has_default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposure_rules() {
        assert!(FieldDescriptor::column("name", FieldType::String).is_exposed());
        assert!(!FieldDescriptor::column("_secret", FieldType::String).is_exposed());
        assert!(!FieldDescriptor::column("password", FieldType::String)
            .hidden()
            .is_exposed());
    }

    #[test]
    fn test_required_rules() {
        assert!(!FieldDescriptor::primary_key("id", FieldType::Integer).is_required());
        assert!(FieldDescriptor::primary_key("code", FieldType::String).is_required());
        assert!(FieldDescriptor::column("name", FieldType::String).is_required());
        assert!(!FieldDescriptor::column("bio", FieldType::Text)
            .nullable()
            .is_required());
        assert!(!FieldDescriptor::hybrid("full_name", FieldType::String).is_required());
    }
}
