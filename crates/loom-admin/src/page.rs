//! Admin pages
//!
//! An [`AdminPage`] binds admin configuration to one entity type. It turns
//! client find parameters into a validated, ordered and paginated query,
//! serializes the resulting rows and performs CRUD through a session. Pages
//! are kept by the [`AdminManager`](crate::AdminManager) as
//! [`AdminPageHandler`] trait objects.

use crate::error::{AdminError, AdminResult};
use crate::fields::{FormFieldType, ListFieldType};
use async_trait::async_trait;
use loom_orm::{
    validate_dict, validate_for_find, validate_primary_key, Entity, FromDict, FromDictOptions,
    ModelError, OrderDirection, Query, Record, Repository, Session, ToDict, ToDictOptions,
    ValidationErrors,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Reserved find parameter holding the page size.
pub const LIMIT_PARAM: &str = "__limit__";
/// Reserved find parameter holding the number of skipped rows.
pub const OFFSET_PARAM: &str = "__offset__";
/// Reserved find parameter holding comma separated ordering columns.
pub const ORDER_BY_PARAM: &str = "__order_by__";

pub const DEFAULT_INDEX_NAME: &str = "row_num";

/// A computed list column evaluated against each serialized row.
pub type MethodFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Settings of one admin page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminPageConfig {
    /// Url segment of the page, stored lowercase.
    pub register_name: String,
    pub name: String,
    /// Defaults to `name` with an `s` appended.
    pub plural_name: Option<String>,
    pub category: Option<String>,

    /// Attributes or method names shown in find results. Empty means the
    /// default field set.
    pub list_fields: Vec<String>,
    /// Attributes selected for method columns but removed from results.
    pub list_temp_fields: Vec<String>,
    pub list_only_readable: bool,
    pub list_pk: bool,
    pub list_fk: bool,
    pub list_hybrid_properties: bool,
    /// Default ordering, `-` prefix for descending.
    pub list_ordering: Vec<String>,
    pub list_total_count: bool,
    pub list_indexed: bool,
    pub list_index_name: Option<String>,
    pub list_start_index: u64,
    pub list_per_page: u64,
    pub list_max_show_all: u64,

    pub get_permission: bool,
    pub create_permission: bool,
    pub update_permission: bool,
    pub remove_permission: bool,
    pub remove_all_permission: bool,

    /// Values that are not entity attributes; required on create,
    /// optional on update.
    pub extra_data_fields: Vec<String>,
    pub readonly_fields: Vec<String>,
}

impl Default for AdminPageConfig {
    fn default() -> Self {
        Self {
            register_name: String::new(),
            name: String::new(),
            plural_name: None,
            category: None,
            list_fields: Vec::new(),
            list_temp_fields: Vec::new(),
            list_only_readable: true,
            list_pk: true,
            list_fk: true,
            list_hybrid_properties: true,
            list_ordering: Vec::new(),
            list_total_count: true,
            list_indexed: false,
            list_index_name: None,
            list_start_index: 1,
            list_per_page: 100,
            list_max_show_all: 200,
            get_permission: true,
            create_permission: true,
            update_permission: true,
            remove_permission: true,
            remove_all_permission: false,
            extra_data_fields: Vec::new(),
            readonly_fields: Vec::new(),
        }
    }
}

/// Client parameters of a find request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindParams {
    pub filters: Record,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Vec<String>,
}

impl FindParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split the reserved paging and ordering keys from a query mapping.
    /// Everything else is a filter.
    pub fn from_map(mut map: Record) -> AdminResult<Self> {
        let limit = map
            .remove(LIMIT_PARAM)
            .map(|value| parse_count(LIMIT_PARAM, &value))
            .transpose()?;
        let offset = map
            .remove(OFFSET_PARAM)
            .map(|value| parse_count(OFFSET_PARAM, &value))
            .transpose()?;
        let order_by = match map.remove(ORDER_BY_PARAM) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(columns)) => columns
                .split(',')
                .map(str::trim)
                .filter(|column| !column.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(_) => return Err(invalid_param(ORDER_BY_PARAM, "must be a list of columns")),
        };

        Ok(Self {
            filters: map,
            limit,
            offset,
            order_by,
        })
    }

    pub fn filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.filters.insert(key.to_string(), value.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = columns.into_iter().map(Into::into).collect();
        self
    }
}

fn parse_count(name: &str, value: &Value) -> AdminResult<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| invalid_param(name, "must be a non-negative integer"))
    .and_then(|count| sql_count(name, count).map(|_| count))
}

fn sql_count(name: &str, count: u64) -> AdminResult<i64> {
    i64::try_from(count).map_err(|_| invalid_param(name, "is too large"))
}

fn invalid_param(name: &str, message: &str) -> AdminError {
    let mut errors = ValidationErrors::new();
    errors.add(name, message);
    AdminError::Model(ModelError::Validation(errors))
}

/// One page of find results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindResult {
    pub results: Vec<Record>,
    /// Total rows matching the filters, when the page reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_total: Option<u64>,
    pub limit: u64,
    pub offset: u64,
}

/// Result of a page service hook.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutcome {
    /// The hook did the work; the value is returned to the client.
    Handled(Value),
    /// Fall through to the default implementation.
    UseDefault,
}

/// Customization points of an admin page.
#[async_trait]
pub trait AdminHooks<E: Entity>: Send + Sync + 'static {
    /// Add joins needed by filters or method columns.
    fn perform_joins(&self, query: Query, _params: &FindParams) -> Query {
        query
    }

    /// Adjust a new entity in place before it is saved. `data` includes
    /// extra data fields.
    fn process_created(&self, _entity: &mut E, _data: &Record) -> AdminResult<()> {
        Ok(())
    }

    fn process_updated(&self, _entity: &mut E, _data: &Record) -> AdminResult<()> {
        Ok(())
    }

    async fn create_service(&self, _session: &dyn Session, _data: &Record) -> AdminResult<ServiceOutcome> {
        Ok(ServiceOutcome::UseDefault)
    }

    async fn update_service(
        &self,
        _session: &dyn Session,
        _pk: &Value,
        _data: &Record,
    ) -> AdminResult<ServiceOutcome> {
        Ok(ServiceOutcome::UseDefault)
    }

    async fn remove_service(&self, _session: &dyn Session, _pk: &Value) -> AdminResult<ServiceOutcome> {
        Ok(ServiceOutcome::UseDefault)
    }
}

/// Hooks that keep every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl<E: Entity> AdminHooks<E> for DefaultHooks {}

/// Object safe view of an admin page, independent of its entity type.
#[async_trait]
pub trait AdminPageHandler: Send + Sync {
    fn register_name(&self) -> &str;
    fn name(&self) -> &str;
    fn plural_name(&self) -> &str;
    /// Uppercased category, `None` when the page does not declare one.
    fn category(&self) -> Option<&str>;
    fn entity_name(&self) -> &'static str;

    fn has_get_permission(&self) -> bool;
    fn has_create_permission(&self) -> bool;
    fn has_update_permission(&self) -> bool;
    fn has_remove_permission(&self) -> bool;
    fn has_remove_all_permission(&self) -> bool;

    async fn get(&self, session: &dyn Session, pk: Value) -> AdminResult<Record>;
    async fn find(&self, session: &dyn Session, params: FindParams) -> AdminResult<FindResult>;
    async fn create(&self, session: &dyn Session, data: Record) -> AdminResult<Value>;
    async fn update(&self, session: &dyn Session, pk: Value, data: Record) -> AdminResult<Value>;
    async fn remove(&self, session: &dyn Session, pk: Value) -> AdminResult<Value>;
    async fn remove_bulk(&self, session: &dyn Session, pks: Vec<Value>) -> AdminResult<u64>;
    async fn remove_all(&self, session: &dyn Session) -> AdminResult<u64>;

    fn main_metadata(&self) -> Value;
    fn find_metadata(&self) -> Value;
    fn create_metadata(&self) -> Value;
    fn update_metadata(&self) -> Value;
}

/// Builder of [`AdminPage`]s.
pub struct AdminPageBuilder<E: Entity> {
    config: AdminPageConfig,
    methods: Vec<(String, MethodFn)>,
    hooks: Arc<dyn AdminHooks<E>>,
}

impl<E: Entity> AdminPageBuilder<E> {
    pub fn new(register_name: &str, name: &str) -> Self {
        Self::from_config(AdminPageConfig {
            register_name: register_name.to_string(),
            name: name.to_string(),
            ..AdminPageConfig::default()
        })
    }

    pub fn from_config(config: AdminPageConfig) -> Self {
        Self {
            config,
            methods: Vec::new(),
            hooks: Arc::new(DefaultHooks),
        }
    }

    pub fn plural_name(mut self, plural_name: &str) -> Self {
        self.config.plural_name = Some(plural_name.to_string());
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.config.category = Some(category.to_string());
        self
    }

    pub fn list_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.list_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn list_temp_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.list_temp_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn list_ordering<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.list_ordering = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn extra_data_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extra_data_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Change any other setting.
    pub fn configure(mut self, f: impl FnOnce(&mut AdminPageConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Register a method column usable in `list_fields`.
    pub fn method<F>(mut self, name: &str, method: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.methods.push((name.to_string(), Arc::new(method)));
        self
    }

    pub fn hooks(mut self, hooks: impl AdminHooks<E>) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Validate the configuration and resolve list fields.
    pub fn build(self) -> AdminResult<AdminPage<E>> {
        let schema = E::schema();
        let config = self.config;

        let register_name = config.register_name.trim().to_lowercase();
        if register_name.is_empty() {
            return Err(AdminError::invalid_page(
                schema.name(),
                "register name is required",
            ));
        }
        if config.name.trim().is_empty() {
            return Err(AdminError::invalid_page(register_name, "name is required"));
        }

        let methods: HashMap<String, MethodFn> = self.methods.into_iter().collect();
        let requested = if config.list_fields.is_empty() {
            default_list_fields::<E>(&config)
        } else {
            config.list_fields.clone()
        };

        let mut list_fields = Vec::with_capacity(requested.len());
        let mut method_names = Vec::new();
        let mut selectable: Vec<&'static str> = Vec::new();
        for field in requested {
            if methods.contains_key(&field) {
                method_names.push(field.clone());
            } else {
                match schema.field(&field).filter(|f| !f.is_relationship()) {
                    Some(descriptor) => push_unique(&mut selectable, descriptor.name),
                    None => {
                        return Err(AdminError::InvalidListField {
                            page: register_name,
                            field,
                        })
                    }
                }
            }
            list_fields.push(field);
        }

        for field in &config.list_temp_fields {
            match schema.field(field).filter(|f| !f.is_relationship()) {
                Some(descriptor) => push_unique(&mut selectable, descriptor.name),
                None => {
                    return Err(AdminError::InvalidListField {
                        page: register_name,
                        field: field.clone(),
                    })
                }
            }
        }

        if selectable.is_empty() {
            return Err(AdminError::ListFieldRequired {
                page: register_name,
            });
        }

        let plural_name = config
            .plural_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("{}s", config.name));
        let category = config
            .category
            .as_deref()
            .map(str::trim)
            .filter(|category| !category.is_empty())
            .map(str::to_uppercase);

        tracing::debug!(
            page = %register_name,
            entity = schema.name(),
            fields = ?list_fields,
            "built admin page"
        );

        Ok(AdminPage {
            register_name,
            plural_name,
            category,
            list_fields,
            method_names,
            selectable_fields: selectable,
            methods,
            hooks: self.hooks,
            config,
            _entity: PhantomData,
        })
    }
}

fn push_unique(fields: &mut Vec<&'static str>, name: &'static str) {
    if !fields.contains(&name) {
        fields.push(name);
    }
}

/// Primary keys, foreign keys, columns then hybrid properties, each group
/// switchable and filtered by readability.
fn default_list_fields<E: Entity>(config: &AdminPageConfig) -> Vec<String> {
    let schema = E::schema();
    let readable = config.list_only_readable;
    let mut fields: Vec<&'static str> = Vec::new();

    if config.list_pk {
        fields.extend(if readable {
            schema.readable_primary_key_columns()
        } else {
            schema.primary_key_columns().to_vec()
        });
    }
    if config.list_fk {
        fields.extend(if readable {
            schema.readable_foreign_key_columns()
        } else {
            schema.foreign_key_columns().to_vec()
        });
    }
    fields.extend(if readable {
        schema.readable_columns()
    } else {
        schema.all_columns().to_vec()
    });
    if config.list_hybrid_properties {
        fields.extend(if readable {
            schema.readable_hybrid_properties()
        } else {
            schema.all_hybrid_properties().to_vec()
        });
    }

    let mut unique = Vec::with_capacity(fields.len());
    for field in fields {
        push_unique(&mut unique, field);
    }
    unique.into_iter().map(str::to_string).collect()
}

/// Admin page over entity `E`.
pub struct AdminPage<E: Entity> {
    config: AdminPageConfig,
    register_name: String,
    plural_name: String,
    category: Option<String>,
    /// Attribute and method columns in display order.
    list_fields: Vec<String>,
    method_names: Vec<String>,
    /// Attributes read for each row: list attributes and temp fields.
    selectable_fields: Vec<&'static str>,
    methods: HashMap<String, MethodFn>,
    hooks: Arc<dyn AdminHooks<E>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> AdminPage<E> {
    pub fn builder(register_name: &str, name: &str) -> AdminPageBuilder<E> {
        AdminPageBuilder::new(register_name, name)
    }

    pub fn config(&self) -> &AdminPageConfig {
        &self.config
    }

    pub fn list_fields(&self) -> &[String] {
        &self.list_fields
    }

    pub fn method_names(&self) -> &[String] {
        &self.method_names
    }

    pub fn selectable_fields(&self) -> &[&'static str] {
        &self.selectable_fields
    }

    pub fn has_single_primary_key(&self) -> bool {
        E::schema().primary_key_columns().len() == 1
    }

    /// Evaluate a listed method column against a serialized row.
    pub fn call_method(&self, name: &str, row: &Record) -> AdminResult<Value> {
        match self.methods.get(name) {
            Some(method) if self.method_names.iter().any(|m| m == name) => Ok(method(row)),
            _ => Err(AdminError::InvalidMethodName {
                page: self.register_name.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn primary_key_holder(&self, pk: &Value) -> AdminResult<Vec<Value>> {
        if !self.has_single_primary_key() {
            return Err(AdminError::CompositePrimaryKey {
                page: self.register_name.clone(),
            });
        }
        let key = vec![pk.clone()];
        validate_primary_key(E::schema(), &key)?;
        Ok(key)
    }

    fn qualified(&self, column: &str) -> String {
        format!("{}.{}", E::schema().table_fullname(), column)
    }

    /// Request ordering, else the page default, else primary keys. Unknown
    /// columns are skipped.
    fn apply_ordering(&self, mut query: Query, requested: &[String]) -> Query {
        let schema = E::schema();
        let tokens: Vec<String> = if !requested.is_empty() {
            requested.to_vec()
        } else if !self.config.list_ordering.is_empty() {
            self.config.list_ordering.clone()
        } else {
            schema
                .primary_key_columns()
                .iter()
                .map(|c| c.to_string())
                .collect()
        };

        for token in &tokens {
            let (column, direction) = OrderDirection::parse_column(token.trim());
            match schema.field(column) {
                Some(field) if field.is_stored() => {
                    query = query.order_by_direction(&self.qualified(column), direction);
                }
                _ => {
                    tracing::debug!(page = %self.register_name, column, "ignoring unknown ordering column");
                }
            }
        }
        query
    }

    fn serialize_row(&self, row: &Record, position: u64) -> AdminResult<Record> {
        let entity = E::from_record(row)?;
        let options = ToDictOptions::new()
            .columns(self.selectable_fields.iter().copied())
            .include_hidden()
            .depth(0);
        let mut values = entity.to_dict(&options)?;

        for name in &self.method_names {
            let value = self.call_method(name, &values)?;
            values.insert(name.clone(), value);
        }
        for temp in &self.config.list_temp_fields {
            values.remove(temp);
        }
        if self.config.list_indexed {
            let index_name = self
                .config
                .list_index_name
                .as_deref()
                .unwrap_or(DEFAULT_INDEX_NAME);
            values.insert(
                index_name.to_string(),
                json!(self.config.list_start_index.saturating_add(position)),
            );
        }
        Ok(values)
    }

    /// Remove extra data fields from `data`, reporting the ones that are
    /// missing when they are required.
    fn entity_data(&self, data: &Record, required: bool) -> AdminResult<Record> {
        let mut entity_data = data.clone();
        let mut missing = Vec::new();
        for name in &self.config.extra_data_fields {
            match entity_data.remove(name) {
                None | Some(Value::Null) if required => missing.push(name.clone()),
                _ => {}
            }
        }
        if !missing.is_empty() {
            return Err(AdminError::RequiredValuesNotProvided { values: missing });
        }
        Ok(entity_data)
    }

    fn output(entity: &E) -> AdminResult<Value> {
        Ok(Value::Object(entity.to_dict(&ToDictOptions::new().depth(0))?))
    }

    fn list_columns_metadata(&self) -> Vec<Value> {
        let schema = E::schema();
        self.list_fields
            .iter()
            .filter(|name| !self.config.list_temp_fields.contains(name))
            .map(|name| {
                let list_type = schema
                    .field(name)
                    .map(|field| FormFieldType::for_field(field).list_type())
                    .unwrap_or(ListFieldType::String);
                json!({
                    "name": name,
                    "type": list_type,
                    "is_method": self.method_names.contains(name),
                })
            })
            .collect()
    }

    fn form_metadata(&self, for_update: bool) -> Value {
        let schema = E::schema();
        let fields: Vec<Value> = schema
            .fields()
            .iter()
            .filter(|f| f.is_stored() && f.writable)
            .filter(|f| !(for_update && schema.primary_key_columns().contains(&f.name)))
            .map(|f| {
                json!({
                    "name": f.name,
                    "type": FormFieldType::for_field(f),
                    "required": !for_update && f.is_required(),
                    "nullable": f.nullable,
                    "max_length": f.max_length,
                    "readonly": for_update && self.config.readonly_fields.iter().any(|r| r == f.name),
                })
            })
            .collect();

        json!({
            "register_name": self.register_name,
            "fields": fields,
            "extra_fields": self.config.extra_data_fields,
            "extra_fields_required": !for_update,
        })
    }
}

#[async_trait]
impl<E: Entity> AdminPageHandler for AdminPage<E> {
    fn register_name(&self) -> &str {
        &self.register_name
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn plural_name(&self) -> &str {
        &self.plural_name
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn entity_name(&self) -> &'static str {
        E::schema().name()
    }

    fn has_get_permission(&self) -> bool {
        self.has_single_primary_key() && self.config.get_permission
    }

    fn has_create_permission(&self) -> bool {
        self.config.create_permission
    }

    fn has_update_permission(&self) -> bool {
        self.has_single_primary_key() && self.config.update_permission
    }

    fn has_remove_permission(&self) -> bool {
        self.has_single_primary_key() && self.config.remove_permission
    }

    fn has_remove_all_permission(&self) -> bool {
        self.config.remove_all_permission
    }

    async fn get(&self, session: &dyn Session, pk: Value) -> AdminResult<Record> {
        let key = self.primary_key_holder(&pk)?;
        let repository: Repository<'_, E> = Repository::new(session);
        let entity = repository
            .get(&key)
            .await?
            .ok_or_else(|| AdminError::EntityNotFound {
                page: self.register_name.clone(),
                pk: pk.to_string(),
            })?;
        Ok(entity.to_dict(&ToDictOptions::new().depth(0))?)
    }

    async fn find(&self, session: &dyn Session, params: FindParams) -> AdminResult<FindResult> {
        let schema = E::schema();
        validate_for_find(schema, &params.filters)?;

        let projection: Vec<String> = schema
            .stored_columns()
            .iter()
            .map(|column| self.qualified(column))
            .collect();
        let projection: Vec<&str> = projection.iter().map(String::as_str).collect();
        let mut query = Query::for_entity::<E>().select(&projection);

        query = self.hooks.perform_joins(query, &params);
        for (key, value) in &params.filters {
            query = query.where_value(&self.qualified(key), value.clone());
        }
        query = self.apply_ordering(query, &params.order_by);

        let limit = params
            .limit
            .unwrap_or(self.config.list_per_page)
            .min(self.config.list_max_show_all);
        let offset = params.offset.unwrap_or(0);
        let sql_limit = sql_count(LIMIT_PARAM, limit)?;
        let sql_offset = sql_count(OFFSET_PARAM, offset)?;
        let count_total = if self.config.list_total_count {
            Some(session.count(&query).await?)
        } else {
            None
        };

        let rows = session
            .select(&query.limit(sql_limit).offset(sql_offset))
            .await?;
        let results = rows
            .iter()
            .enumerate()
            .map(|(position, row)| self.serialize_row(row, offset.saturating_add(position as u64)))
            .collect::<AdminResult<Vec<_>>>()?;

        tracing::debug!(page = %self.register_name, rows = results.len(), limit, offset, "admin find");
        Ok(FindResult {
            results,
            count_total,
            limit,
            offset,
        })
    }

    async fn create(&self, session: &dyn Session, data: Record) -> AdminResult<Value> {
        let entity_data = self.entity_data(&data, true)?;
        validate_dict(E::schema(), &entity_data, false)?;

        if let ServiceOutcome::Handled(value) = self.hooks.create_service(session, &data).await? {
            return Ok(value);
        }

        let options = FromDictOptions::default().with_pk().include_hidden();
        let mut entity = E::new_from_dict(&entity_data, &options)?;
        self.hooks.process_created(&mut entity, &data)?;
        let repository: Repository<'_, E> = Repository::new(session);
        let saved = repository.save(&entity).await?;
        tracing::info!(page = %self.register_name, pk = %saved.primary_key(), "admin entity created");
        Self::output(&saved)
    }

    async fn update(&self, session: &dyn Session, pk: Value, data: Record) -> AdminResult<Value> {
        let key = self.primary_key_holder(&pk)?;
        let entity_data = self.entity_data(&data, false)?;
        validate_dict(E::schema(), &entity_data, true)?;

        if let ServiceOutcome::Handled(value) = self.hooks.update_service(session, &pk, &data).await? {
            return Ok(value);
        }

        let repository: Repository<'_, E> = Repository::new(session);
        let mut entity = repository
            .get(&key)
            .await?
            .ok_or_else(|| AdminError::EntityNotFound {
                page: self.register_name.clone(),
                pk: pk.to_string(),
            })?;
        entity.from_dict(&entity_data, &FromDictOptions::default().include_hidden())?;
        self.hooks.process_updated(&mut entity, &data)?;
        let saved = repository.save(&entity).await?;
        tracing::info!(page = %self.register_name, pk = %pk, "admin entity updated");
        Self::output(&saved)
    }

    async fn remove(&self, session: &dyn Session, pk: Value) -> AdminResult<Value> {
        let key = self.primary_key_holder(&pk)?;

        if let ServiceOutcome::Handled(value) = self.hooks.remove_service(session, &pk).await? {
            return Ok(value);
        }

        let repository: Repository<'_, E> = Repository::new(session);
        let removed = repository.delete_by_pk(&key).await?;
        tracing::info!(page = %self.register_name, pk = %pk, removed, "admin entity removed");
        Ok(json!(removed))
    }

    async fn remove_bulk(&self, session: &dyn Session, pks: Vec<Value>) -> AdminResult<u64> {
        for pk in &pks {
            self.primary_key_holder(pk)?;
        }
        if pks.is_empty() {
            return Ok(0);
        }

        let schema = E::schema();
        let column = self.qualified(schema.primary_key_columns()[0]);
        let repository: Repository<'_, E> = Repository::new(session);
        let removed = repository
            .delete_where(&repository.query().where_in(&column, pks))
            .await?;
        tracing::info!(page = %self.register_name, removed, "admin entities removed in bulk");
        Ok(removed)
    }

    async fn remove_all(&self, session: &dyn Session) -> AdminResult<u64> {
        let repository: Repository<'_, E> = Repository::new(session);
        let removed = repository.delete_where(&repository.query()).await?;
        tracing::warn!(page = %self.register_name, removed, "all admin entities removed");
        Ok(removed)
    }

    fn main_metadata(&self) -> Value {
        json!({
            "register_name": self.register_name,
            "name": self.config.name,
            "plural_name": self.plural_name,
            "category": self.category,
            "has_get_permission": self.has_get_permission(),
            "has_create_permission": self.has_create_permission(),
            "has_update_permission": self.has_update_permission(),
            "has_remove_permission": self.has_remove_permission(),
            "has_remove_all_permission": self.has_remove_all_permission(),
        })
    }

    fn find_metadata(&self) -> Value {
        let index_name = self
            .config
            .list_indexed
            .then(|| {
                self.config
                    .list_index_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string())
            });
        json!({
            "register_name": self.register_name,
            "columns": self.list_columns_metadata(),
            "pk_names": E::schema().primary_key_columns(),
            "ordering": self.config.list_ordering,
            "total_count": self.config.list_total_count,
            "index_name": index_name,
            "start_index": self.config.list_start_index,
            "per_page": self.config.list_per_page,
            "max_show_all": self.config.list_max_show_all,
        })
    }

    fn create_metadata(&self) -> Value {
        self.form_metadata(false)
    }

    fn update_metadata(&self) -> Value {
        self.form_metadata(true)
    }
}
