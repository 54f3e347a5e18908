//! Entity schemas and attribute reflection.
//!
//! An [`EntitySchema`] is a static description of an entity type: its table
//! and an ordered list of [`FieldDescriptor`]s. Attribute categories
//! (primary keys, foreign keys, columns, relationships and hybrid
//! properties, each split by exposure) are computed on first access and
//! cached for the lifetime of the schema.

pub mod field;

pub use field::{FieldDescriptor, FieldKind, FieldType};

use once_cell::sync::OnceCell;

/// Default ceiling for relationship expansion during conversion.
pub const MAX_DEPTH: u32 = 5;

/// One attribute category split by exposure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySplit {
    pub all: Vec<&'static str>,
    pub exposed: Vec<&'static str>,
    pub not_exposed: Vec<&'static str>,
}

impl CategorySplit {
    fn collect<'a, I>(fields: I) -> Self
    where
        I: Iterator<Item = &'a FieldDescriptor>,
    {
        let mut split = Self::default();
        for field in fields {
            split.all.push(field.name);
            if field.is_exposed() {
                split.exposed.push(field.name);
            } else {
                split.not_exposed.push(field.name);
            }
        }
        split
    }
}

/// Cached attribute categories of a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeCategories {
    pub primary_keys: CategorySplit,
    pub foreign_keys: CategorySplit,
    pub columns: CategorySplit,
    pub relationships: CategorySplit,
    pub hybrids: CategorySplit,
    pub all_exposed: Vec<&'static str>,
    pub all_not_exposed: Vec<&'static str>,
    pub all: Vec<&'static str>,
}

impl AttributeCategories {
    fn compute(fields: &[FieldDescriptor]) -> Self {
        let of_kind = |kind: FieldKind| CategorySplit::collect(fields.iter().filter(move |f| f.kind == kind));

        let primary_keys = of_kind(FieldKind::PrimaryKey);
        let foreign_keys = of_kind(FieldKind::ForeignKey);
        let columns = of_kind(FieldKind::Column);
        let relationships = of_kind(FieldKind::Relationship);
        let hybrids = of_kind(FieldKind::Hybrid);

        let ordered = [&primary_keys, &foreign_keys, &columns, &relationships, &hybrids];
        let all_exposed: Vec<&'static str> = ordered
            .iter()
            .flat_map(|split| split.exposed.iter().copied())
            .collect();
        let all_not_exposed: Vec<&'static str> = ordered
            .iter()
            .flat_map(|split| split.not_exposed.iter().copied())
            .collect();
        let all = all_exposed
            .iter()
            .chain(all_not_exposed.iter())
            .copied()
            .collect();

        Self {
            primary_keys,
            foreign_keys,
            columns,
            relationships,
            hybrids,
            all_exposed,
            all_not_exposed,
            all,
        }
    }
}

/// Static description of an entity type.
#[derive(Debug)]
pub struct EntitySchema {
    name: &'static str,
    table: &'static str,
    table_schema: Option<&'static str>,
    max_depth: u32,
    fields: Vec<FieldDescriptor>,
    categories: OnceCell<AttributeCategories>,
}

impl EntitySchema {
    pub fn builder(name: &'static str, table: &'static str) -> SchemaBuilder {
        SchemaBuilder {
            name,
            table,
            table_schema: None,
            max_depth: MAX_DEPTH,
            fields: Vec::new(),
        }
    }

    /// Entity name, used as the key of per-entity conversion options.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn table_name(&self) -> &'static str {
        self.table
    }

    pub fn table_schema(&self) -> Option<&'static str> {
        self.table_schema
    }

    /// `schema.table`, or just the table when no schema is set.
    pub fn table_fullname(&self) -> String {
        match self.table_schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.to_string(),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Whether the attribute may be serialized. Unknown names are treated
    /// by the naming rule alone.
    pub fn is_exposed(&self, name: &str) -> bool {
        match self.field(name) {
            Some(field) => field.is_exposed(),
            None => !name.starts_with('_'),
        }
    }

    pub fn categories(&self) -> &AttributeCategories {
        self.categories
            .get_or_init(|| AttributeCategories::compute(&self.fields))
    }

    pub fn primary_key_columns(&self) -> &[&'static str] {
        &self.categories().primary_keys.all
    }

    pub fn exposed_primary_key_columns(&self) -> &[&'static str] {
        &self.categories().primary_keys.exposed
    }

    pub fn not_exposed_primary_key_columns(&self) -> &[&'static str] {
        &self.categories().primary_keys.not_exposed
    }

    pub fn foreign_key_columns(&self) -> &[&'static str] {
        &self.categories().foreign_keys.all
    }

    pub fn exposed_foreign_key_columns(&self) -> &[&'static str] {
        &self.categories().foreign_keys.exposed
    }

    pub fn not_exposed_foreign_key_columns(&self) -> &[&'static str] {
        &self.categories().foreign_keys.not_exposed
    }

    /// Plain columns, excluding primary and foreign keys.
    pub fn all_columns(&self) -> &[&'static str] {
        &self.categories().columns.all
    }

    pub fn exposed_columns(&self) -> &[&'static str] {
        &self.categories().columns.exposed
    }

    pub fn not_exposed_columns(&self) -> &[&'static str] {
        &self.categories().columns.not_exposed
    }

    pub fn relationships(&self) -> &[&'static str] {
        &self.categories().relationships.all
    }

    pub fn exposed_relationships(&self) -> &[&'static str] {
        &self.categories().relationships.exposed
    }

    pub fn not_exposed_relationships(&self) -> &[&'static str] {
        &self.categories().relationships.not_exposed
    }

    pub fn all_hybrid_properties(&self) -> &[&'static str] {
        &self.categories().hybrids.all
    }

    pub fn exposed_hybrid_properties(&self) -> &[&'static str] {
        &self.categories().hybrids.exposed
    }

    pub fn not_exposed_hybrid_properties(&self) -> &[&'static str] {
        &self.categories().hybrids.not_exposed
    }

    pub fn all_exposed_attributes(&self) -> &[&'static str] {
        &self.categories().all_exposed
    }

    pub fn all_not_exposed_attributes(&self) -> &[&'static str] {
        &self.categories().all_not_exposed
    }

    pub fn all_attributes(&self) -> &[&'static str] {
        &self.categories().all
    }

    /// Stored attributes in declaration order (pk, fk and columns).
    pub fn stored_columns(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.is_stored())
            .map(|f| f.name)
            .collect()
    }

    fn readable_of(&self, names: &[&'static str]) -> Vec<&'static str> {
        names
            .iter()
            .copied()
            .filter(|name| self.field(name).map_or(false, |f| f.readable))
            .collect()
    }

    pub fn readable_primary_key_columns(&self) -> Vec<&'static str> {
        self.readable_of(self.primary_key_columns())
    }

    pub fn readable_foreign_key_columns(&self) -> Vec<&'static str> {
        self.readable_of(self.foreign_key_columns())
    }

    pub fn readable_columns(&self) -> Vec<&'static str> {
        self.readable_of(self.all_columns())
    }

    pub fn readable_hybrid_properties(&self) -> Vec<&'static str> {
        self.readable_of(self.all_hybrid_properties())
    }
}

pub struct SchemaBuilder {
    name: &'static str,
    table: &'static str,
    table_schema: Option<&'static str>,
    max_depth: u32,
    fields: Vec<FieldDescriptor>,
}

impl SchemaBuilder {
    pub fn table_schema(mut self, schema: &'static str) -> Self {
        self.table_schema = Some(schema);
        self
    }

    /// Override the conversion depth ceiling for this entity.
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> EntitySchema {
        debug_assert!(
            {
                let mut names: Vec<_> = self.fields.iter().map(|f| f.name).collect();
                names.sort_unstable();
                names.windows(2).all(|w| w[0] != w[1])
            },
            "duplicate attribute names in schema {}",
            self.name
        );

        EntitySchema {
            name: self.name,
            table: self.table,
            table_schema: self.table_schema,
            max_depth: self.max_depth,
            fields: self.fields,
            categories: OnceCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn schema() -> EntitySchema {
        EntitySchema::builder("Account", "accounts")
            .table_schema("billing")
            .field(FieldDescriptor::primary_key("id", FieldType::Integer))
            .field(FieldDescriptor::primary_key("_shard", FieldType::Integer))
            .field(FieldDescriptor::foreign_key("owner_id", FieldType::Integer, "users.id"))
            .field(FieldDescriptor::column("name", FieldType::String))
            .field(FieldDescriptor::column("secret", FieldType::String).hidden())
            .field(FieldDescriptor::hybrid("label", FieldType::String))
            .field(FieldDescriptor::hybrid("_checksum", FieldType::String))
            .field(FieldDescriptor::relationship("owner", "User", false))
            .build()
    }

    #[test]
    fn test_categories_are_split_by_exposure() {
        let schema = schema();
        assert_eq!(schema.primary_key_columns(), &["id", "_shard"]);
        assert_eq!(schema.exposed_primary_key_columns(), &["id"]);
        assert_eq!(schema.not_exposed_primary_key_columns(), &["_shard"]);
        assert_eq!(schema.all_columns(), &["name", "secret"]);
        assert_eq!(schema.not_exposed_columns(), &["secret"]);
        assert_eq!(schema.exposed_relationships(), &["owner"]);
        assert_eq!(schema.not_exposed_hybrid_properties(), &["_checksum"]);
    }

    #[test]
    fn test_all_attributes_order() {
        let schema = schema();
        assert_eq!(
            schema.all_exposed_attributes(),
            &["id", "owner_id", "name", "owner", "label"]
        );
        assert_eq!(
            schema.all_not_exposed_attributes(),
            &["_shard", "secret", "_checksum"]
        );
        assert_eq!(schema.all_attributes().len(), schema.fields().len());
    }

    #[test]
    fn test_exposed_and_hidden_are_disjoint() {
        let schema = schema();
        let exposed: HashSet<_> = schema.all_exposed_attributes().iter().collect();
        let hidden: HashSet<_> = schema.all_not_exposed_attributes().iter().collect();
        assert!(exposed.is_disjoint(&hidden));

        let union: HashSet<_> = exposed.union(&hidden).copied().collect();
        let all: HashSet<_> = schema.all_attributes().iter().collect();
        assert_eq!(union, all);
    }

    #[test]
    fn test_categories_are_cached() {
        let schema = schema();
        let first = schema.categories() as *const AttributeCategories;
        let second = schema.categories() as *const AttributeCategories;
        assert_eq!(first, second);
        assert_eq!(schema.all_attributes(), schema.all_attributes());
    }

    #[test]
    fn test_table_metadata() {
        let schema = schema();
        assert_eq!(schema.table_name(), "accounts");
        assert_eq!(schema.table_schema(), Some("billing"));
        assert_eq!(schema.table_fullname(), "billing.accounts");
        assert_eq!(schema.max_depth(), MAX_DEPTH);
        assert!(schema.is_exposed("name"));
        assert!(!schema.is_exposed("secret"));
        assert!(!schema.is_exposed("_unknown"));
    }

    #[test]
    fn test_readable_columns() {
        let schema = EntitySchema::builder("User", "users")
            .field(FieldDescriptor::primary_key("id", FieldType::Integer))
            .field(FieldDescriptor::column("name", FieldType::String))
            .field(FieldDescriptor::column("password_hash", FieldType::String).not_readable())
            .build();
        assert_eq!(schema.readable_columns(), vec!["name"]);
        assert_eq!(schema.readable_primary_key_columns(), vec!["id"]);
    }
}
