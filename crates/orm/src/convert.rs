//! Entity to mapping conversion and back.
//!
//! `to_dict` renders an entity as a JSON object, optionally limited to a set
//! of columns, with renames, exclusions and recursive expansion of loaded
//! relationships. `from_dict` assigns mapping values back onto an entity,
//! guarded by switches for exposure, keys and relationships.

use crate::entity::{Entity, EntityView, Related};
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Option that is either shared by every entity in a conversion tree or
/// given per entity name.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector<T> {
    All(T),
    PerEntity(HashMap<String, T>),
}

impl<T> Selector<T> {
    pub fn for_entity(&self, entity: &str) -> Option<&T> {
        match self {
            Selector::All(value) => Some(value),
            Selector::PerEntity(values) => values.get(entity),
        }
    }
}

/// `database.conversion` configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Relationship depth used when a conversion does not specify one.
    #[serde(default)]
    pub default_depth: u32,
}

/// Options of [`ToDict::to_dict`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToDictOptions {
    pub exposed_only: bool,
    pub columns: Option<Selector<Vec<String>>>,
    pub rename: Option<Selector<HashMap<String, String>>>,
    pub exclude: Option<Selector<Vec<String>>>,
    pub depth: u32,
}

impl Default for ToDictOptions {
    fn default() -> Self {
        Self {
            exposed_only: true,
            columns: None,
            rename: None,
            exclude: None,
            depth: 0,
        }
    }
}

impl ToDictOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default options with the configured depth.
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            depth: config.default_depth,
            ..Self::default()
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(Selector::All(columns.into_iter().map(Into::into).collect()));
        self
    }

    /// Columns of one entity in the tree. Switches the selector to per-entity
    /// mode.
    pub fn columns_for<I, S>(mut self, entity: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        per_entity(&mut self.columns).insert(entity.to_string(), columns);
        self
    }

    pub fn rename(mut self, from: &str, to: &str) -> Self {
        match &mut self.rename {
            Some(Selector::All(map)) => {
                map.insert(from.to_string(), to.to_string());
            }
            _ => {
                let mut map = HashMap::new();
                map.insert(from.to_string(), to.to_string());
                self.rename = Some(Selector::All(map));
            }
        }
        self
    }

    pub fn rename_for(mut self, entity: &str, from: &str, to: &str) -> Self {
        per_entity(&mut self.rename)
            .entry(entity.to_string())
            .or_default()
            .insert(from.to_string(), to.to_string());
        self
    }

    pub fn exclude<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(Selector::All(columns.into_iter().map(Into::into).collect()));
        self
    }

    pub fn exclude_for<I, S>(mut self, entity: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        per_entity(&mut self.exclude).insert(entity.to_string(), columns);
        self
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Include attributes that are not exposed.
    pub fn include_hidden(mut self) -> Self {
        self.exposed_only = false;
        self
    }
}

fn per_entity<T: Default>(selector: &mut Option<Selector<T>>) -> &mut HashMap<String, T> {
    if !matches!(selector, Some(Selector::PerEntity(_))) {
        *selector = Some(Selector::PerEntity(HashMap::new()));
    }
    match selector {
        Some(Selector::PerEntity(map)) => map,
        _ => unreachable!("selector was just set to per-entity mode"),
    }
}

/// Options of [`FromDict::from_dict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromDictOptions {
    /// Silently skip keys that cannot be assigned.
    pub ignore_invalid_column: bool,
    /// Assign every attribute, overriding the exposure and ignore switches.
    pub populate_all: bool,
    pub exposed_only: bool,
    pub ignore_pk: bool,
    pub ignore_fk: bool,
    pub ignore_relationships: bool,
}

impl Default for FromDictOptions {
    fn default() -> Self {
        Self {
            ignore_invalid_column: true,
            populate_all: false,
            exposed_only: true,
            ignore_pk: true,
            ignore_fk: false,
            ignore_relationships: true,
        }
    }
}

impl FromDictOptions {
    pub fn strict(mut self) -> Self {
        self.ignore_invalid_column = false;
        self
    }

    pub fn populate_all(mut self) -> Self {
        self.populate_all = true;
        self
    }

    pub fn with_pk(mut self) -> Self {
        self.ignore_pk = false;
        self
    }

    pub fn without_fk(mut self) -> Self {
        self.ignore_fk = true;
        self
    }

    pub fn with_relationships(mut self) -> Self {
        self.ignore_relationships = false;
        self
    }

    pub fn include_hidden(mut self) -> Self {
        self.exposed_only = false;
        self
    }

    fn effective(&self) -> Self {
        if !self.populate_all {
            return self.clone();
        }
        Self {
            exposed_only: false,
            ignore_pk: false,
            ignore_fk: false,
            ignore_relationships: false,
            ..self.clone()
        }
    }
}

/// Conversion of an entity into a JSON object.
pub trait ToDict {
    fn to_dict(&self, options: &ToDictOptions) -> ModelResult<Map<String, Value>>;
}

impl<T: EntityView + ?Sized> ToDict for T {
    fn to_dict(&self, options: &ToDictOptions) -> ModelResult<Map<String, Value>> {
        view_to_dict(self, options, options.depth)
    }
}

fn view_to_dict<T: EntityView + ?Sized>(
    view: &T,
    options: &ToDictOptions,
    depth: u32,
) -> ModelResult<Map<String, Value>> {
    let schema = view.entity_schema();
    let entity = schema.name();

    if depth > schema.max_depth() {
        return Err(ModelError::DepthExceeded {
            entity: entity.to_string(),
            depth,
            max: schema.max_depth(),
        });
    }

    let (attributes, relationships) = if options.exposed_only {
        (schema.all_exposed_attributes(), schema.exposed_relationships())
    } else {
        (schema.all_attributes(), schema.relationships())
    };

    let excluded: HashSet<&str> = options
        .exclude
        .as_ref()
        .and_then(|selector| selector.for_entity(entity))
        .map(|columns| columns.iter().map(String::as_str).collect())
        .unwrap_or_default();

    let requested: Vec<&str> = match options
        .columns
        .as_ref()
        .and_then(|selector| selector.for_entity(entity))
        .filter(|columns| !columns.is_empty())
    {
        Some(columns) => {
            let missing: Vec<String> = columns
                .iter()
                .filter(|column| !attributes.contains(&column.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(ModelError::ColumnNotFound {
                    entity: entity.to_string(),
                    columns: missing,
                });
            }
            columns
                .iter()
                .map(String::as_str)
                .filter(|column| !excluded.contains(column))
                .collect()
        }
        None => attributes
            .iter()
            .copied()
            .filter(|column| !excluded.contains(column))
            .collect(),
    };

    let renames = options
        .rename
        .as_ref()
        .and_then(|selector| selector.for_entity(entity));
    let key_for = |column: &str| -> String {
        renames
            .and_then(|map| map.get(column))
            .cloned()
            .unwrap_or_else(|| column.to_string())
    };

    let mut result = Map::new();
    let mut requested_relationships = Vec::new();

    for column in requested {
        if relationships.contains(&column) {
            requested_relationships.push(column);
            continue;
        }
        let value = view.attribute(column).unwrap_or(Value::Null);
        result.insert(key_for(column), value);
    }

    if depth > 0 {
        for name in requested_relationships {
            let value = match view.relation(name) {
                Related::NotLoaded => continue,
                Related::Null => Value::Null,
                Related::One(child) => Value::Object(view_to_dict(child, options, depth - 1)?),
                Related::Many(children) => {
                    let mut items = Vec::with_capacity(children.len());
                    for child in children {
                        items.push(Value::Object(view_to_dict(child, options, depth - 1)?));
                    }
                    Value::Array(items)
                }
            };
            result.insert(key_for(name), value);
        }
    }

    Ok(result)
}

/// Assignment of mapping values onto an entity.
pub trait FromDict: Sized {
    fn from_dict(&mut self, data: &Map<String, Value>, options: &FromDictOptions) -> ModelResult<()>;

    /// Build a fresh entity from a mapping.
    fn new_from_dict(data: &Map<String, Value>, options: &FromDictOptions) -> ModelResult<Self>;
}

impl<E: Entity> FromDict for E {
    fn from_dict(&mut self, data: &Map<String, Value>, options: &FromDictOptions) -> ModelResult<()> {
        let options = options.effective();
        let schema = E::schema();

        let (attributes, pks, fks, relationships) = if options.exposed_only {
            (
                schema.all_exposed_attributes(),
                schema.exposed_primary_key_columns(),
                schema.exposed_foreign_key_columns(),
                schema.exposed_relationships(),
            )
        } else {
            (
                schema.all_attributes(),
                schema.primary_key_columns(),
                schema.foreign_key_columns(),
                schema.relationships(),
            )
        };

        // Hybrids are computed, never populated.
        let accessible: HashSet<&str> = attributes
            .iter()
            .copied()
            .filter(|name| {
                schema
                    .field(name)
                    .is_some_and(|field| field.is_stored() || field.is_relationship())
            })
            .filter(|name| !(options.ignore_pk && pks.contains(name)))
            .filter(|name| !(options.ignore_fk && fks.contains(name)))
            .filter(|name| !(options.ignore_relationships && relationships.contains(name)))
            .collect();

        if !options.ignore_invalid_column {
            let invalid: Vec<String> = data
                .keys()
                .filter(|key| !accessible.contains(key.as_str()))
                .cloned()
                .collect();
            if !invalid.is_empty() {
                return Err(ModelError::ColumnNotFound {
                    entity: schema.name().to_string(),
                    columns: invalid,
                });
            }
        }

        for (key, value) in data {
            if !accessible.contains(key.as_str()) {
                continue;
            }
            let Some(field) = schema.field(key) else {
                continue;
            };

            if field.is_relationship() {
                self.set_related(key, value.clone())?;
            } else if field.writable {
                self.set(key, value.clone())?;
            }
        }

        Ok(())
    }

    fn new_from_dict(data: &Map<String, Value>, options: &FromDictOptions) -> ModelResult<Self> {
        let mut entity = E::default();
        entity.from_dict(data, options)?;
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Post, Tag, User};
    use serde_json::json;

    fn user() -> User {
        User {
            id: Some(1),
            group_id: Some(7),
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: Some("hash".to_string()),
            posts: Some(vec![
                Post::new(10, 1, "first"),
                Post::new(11, 1, "second").with_tags(vec![Tag::new(1, "rust")]),
            ]),
            ..User::default()
        }
    }

    #[test]
    fn test_default_conversion_uses_exposed_attributes() {
        let dict = user().to_dict(&ToDictOptions::new()).unwrap();
        assert_eq!(dict["id"], 1);
        assert_eq!(dict["group_id"], 7);
        assert_eq!(dict["display_name"], "alice <alice@example.com>");
        assert!(dict.get("password_hash").is_none());
        // depth 0 never expands relationships
        assert!(dict.get("posts").is_none());
    }

    #[test]
    fn test_columns_rename_and_exclude() {
        let options = ToDictOptions::new()
            .columns(["id", "name", "email"])
            .exclude(["email"])
            .rename("name", "username");
        let dict = user().to_dict(&options).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict["username"], "alice");
    }

    #[test]
    fn test_unknown_or_hidden_column_is_rejected() {
        let err = user()
            .to_dict(&ToDictOptions::new().columns(["id", "missing"]))
            .unwrap_err();
        assert!(matches!(err, ModelError::ColumnNotFound { ref columns, .. } if columns == &["missing"]));

        let err = user()
            .to_dict(&ToDictOptions::new().columns(["password_hash"]))
            .unwrap_err();
        assert!(err.is_column_not_found());

        let dict = user()
            .to_dict(&ToDictOptions::new().columns(["password_hash"]).include_hidden())
            .unwrap();
        assert_eq!(dict["password_hash"], "hash");
    }

    #[test]
    fn test_nested_conversion() {
        let options = ToDictOptions::new()
            .depth(2)
            .columns_for("User", ["id", "posts"])
            .columns_for("Post", ["id", "title", "tags"])
            .rename_for("Post", "title", "headline");
        let dict = user().to_dict(&options).unwrap();

        let posts = dict["posts"].as_array().unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0]["headline"], "first");
        // tags of the first post were never loaded
        assert!(posts[0].get("tags").is_none());
        assert_eq!(posts[1]["tags"][0]["name"], "rust");
    }

    #[test]
    fn test_loaded_empty_and_null_relationships() {
        let mut user = user();
        user.posts = Some(Vec::new());
        let dict = user.to_dict(&ToDictOptions::new().depth(1)).unwrap();
        assert_eq!(dict["posts"], json!([]));

        let post = Post::new(1, 1, "orphan").with_author(None);
        let dict = post.to_dict(&ToDictOptions::new().depth(1)).unwrap();
        assert_eq!(dict["author"], Value::Null);
    }

    #[test]
    fn test_depth_above_ceiling() {
        for depth in [6, 7, 50] {
            let err = user()
                .to_dict(&ToDictOptions::new().depth(depth))
                .unwrap_err();
            assert!(err.is_depth_exceeded());
        }
        assert!(user().to_dict(&ToDictOptions::new().depth(5)).is_ok());
    }

    #[test]
    fn test_depth_from_config() {
        let options = ToDictOptions::from_config(&ConversionConfig { default_depth: 1 });
        let dict = user().to_dict(&options).unwrap();
        assert_eq!(dict["posts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_round_trip_of_exposed_scalars() {
        let original = user();
        let dict = original.to_dict(&ToDictOptions::new()).unwrap();

        let restored = User::new_from_dict(&dict, &FromDictOptions::default().with_pk()).unwrap();
        for column in User::schema().all_exposed_attributes() {
            if User::schema().relationships().contains(column) {
                continue;
            }
            assert_eq!(restored.get(column), original.get(column), "column {}", column);
        }
    }

    #[test]
    fn test_from_dict_defaults_ignore_pk_and_hidden() {
        let data = json!({
            "id": 99,
            "name": "bob",
            "password_hash": "secret",
            "unknown": true
        });
        let user = User::new_from_dict(data.as_object().unwrap(), &FromDictOptions::default()).unwrap();
        assert_eq!(user.id, None);
        assert_eq!(user.name, "bob");
        assert_eq!(user.password_hash, None);
    }

    #[test]
    fn test_from_dict_strict_mode() {
        let data = json!({"name": "bob", "unknown": true});
        let err = User::new_from_dict(data.as_object().unwrap(), &FromDictOptions::default().strict())
            .unwrap_err();
        assert!(matches!(err, ModelError::ColumnNotFound { ref columns, .. } if columns == &["unknown"]));
    }

    #[test]
    fn test_from_dict_strict_mode_rejects_hybrids() {
        let data = json!({"name": "bob", "display_name": "bob <bob@x.org>"});
        let err = User::new_from_dict(data.as_object().unwrap(), &FromDictOptions::default().strict())
            .unwrap_err();
        assert!(matches!(err, ModelError::ColumnNotFound { ref columns, .. } if columns == &["display_name"]));

        let user = User::new_from_dict(data.as_object().unwrap(), &FromDictOptions::default()).unwrap();
        assert_eq!(user.name, "bob");
    }

    #[test]
    fn test_from_dict_populate_all() {
        let data = json!({"id": 5, "group_id": 3, "password_hash": "x"});
        let options = FromDictOptions::default().without_fk().populate_all();
        let user = User::new_from_dict(data.as_object().unwrap(), &options).unwrap();
        assert_eq!(user.id, Some(5));
        assert_eq!(user.group_id, Some(3));
        assert_eq!(user.password_hash.as_deref(), Some("x"));
    }

    #[test]
    fn test_from_dict_ignore_fk() {
        let data = json!({"group_id": 3, "name": "bob"});
        let user = User::new_from_dict(data.as_object().unwrap(), &FromDictOptions::default().without_fk())
            .unwrap();
        assert_eq!(user.group_id, None);
        assert_eq!(user.name, "bob");
    }
}
