//! Admin manager - registry of admin pages
//!
//! Pages are indexed both by register name and by entity name; the two
//! indexes always change together.

use crate::config::AdminConfig;
use crate::error::{AdminError, AdminResult};
use crate::fields::{FormFieldType, ListFieldType};
use crate::page::{AdminPageHandler, FindParams, FindResult};
use loom_orm::{Entity, Record, Session};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Default)]
struct Registry {
    pages: HashMap<String, Arc<dyn AdminPageHandler>>,
    entities: HashMap<&'static str, Arc<dyn AdminPageHandler>>,
}

impl Registry {
    fn remove_page(&mut self, register_name: &str) {
        if let Some(page) = self.pages.remove(register_name) {
            self.entities.remove(page.entity_name());
        }
    }

    fn remove_entity(&mut self, entity: &str) {
        if let Some(page) = self.entities.remove(entity) {
            self.pages.remove(page.register_name());
        }
    }
}

pub struct AdminManager {
    config: AdminConfig,
    registry: RwLock<Registry>,
    main_metadata: RwLock<Option<Vec<Value>>>,
}

impl AdminManager {
    pub fn new(config: AdminConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(Registry::default()),
            main_metadata: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    pub fn is_admin_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Base url of admin api, always ending with `/`.
    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    pub fn panel_name(&self) -> String {
        self.config.panel_name()
    }

    pub fn default_category(&self) -> String {
        self.config.default_category()
    }

    /// Register an admin page.
    ///
    /// A page whose register name or entity is already registered is
    /// rejected unless `replace` is set, in which case the old pages are
    /// removed from both indexes first.
    pub fn register(&self, page: Arc<dyn AdminPageHandler>, replace: bool) -> AdminResult<()> {
        let register_name = page.register_name().to_lowercase();
        let entity = page.entity_name();
        {
            let mut registry = self.registry.write();

            if registry.pages.contains_key(&register_name) {
                if !replace {
                    return Err(AdminError::DuplicatePage {
                        name: register_name,
                    });
                }
                registry.remove_page(&register_name);
            }

            if registry.entities.contains_key(entity) {
                if !replace {
                    return Err(AdminError::DuplicateEntity {
                        entity: entity.to_string(),
                    });
                }
                registry.remove_entity(entity);
            }

            registry.pages.insert(register_name.clone(), page.clone());
            registry.entities.insert(entity, page);
        }

        tracing::debug!(page = %register_name, entity, replace, "registered admin page");
        if self.main_metadata.read().is_some() {
            self.populate_main_metadata();
        }
        Ok(())
    }

    /// Page by register name, case-insensitive.
    pub fn page(&self, register_name: &str) -> AdminResult<Arc<dyn AdminPageHandler>> {
        let name = register_name.to_lowercase();
        self.registry
            .read()
            .pages
            .get(&name)
            .cloned()
            .ok_or(AdminError::PageNotFound { name })
    }

    /// Page registered for an entity type, if any.
    pub fn try_get_admin_page<E: Entity>(&self) -> Option<Arc<dyn AdminPageHandler>> {
        self.registry
            .read()
            .entities
            .get(E::schema().name())
            .cloned()
    }

    pub fn has_admin<E: Entity>(&self) -> bool {
        self.try_get_admin_page::<E>().is_some()
    }

    pub fn page_count(&self) -> usize {
        self.registry.read().pages.len()
    }

    /// Register names in sorted order.
    pub fn register_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().pages.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn url_for(&self, register_name: &str) -> String {
        format!("{}{}/", self.base_url(), register_name.to_lowercase())
    }

    pub fn list_field_type(&self, form: FormFieldType) -> ListFieldType {
        form.list_type()
    }

    pub async fn get(&self, register_name: &str, session: &dyn Session, pk: Value) -> AdminResult<Record> {
        let page = self.page(register_name)?;
        if !page.has_get_permission() {
            return Err(AdminError::not_allowed(page.register_name(), "get"));
        }
        page.get(session, pk).await
    }

    pub async fn find(
        &self,
        register_name: &str,
        session: &dyn Session,
        params: FindParams,
    ) -> AdminResult<FindResult> {
        let page = self.page(register_name)?;
        page.find(session, params).await
    }

    pub async fn create(&self, register_name: &str, session: &dyn Session, data: Record) -> AdminResult<Value> {
        let page = self.page(register_name)?;
        if !page.has_create_permission() {
            return Err(AdminError::not_allowed(page.register_name(), "create"));
        }
        page.create(session, data).await
    }

    pub async fn update(
        &self,
        register_name: &str,
        session: &dyn Session,
        pk: Value,
        data: Record,
    ) -> AdminResult<Value> {
        let page = self.page(register_name)?;
        if !page.has_update_permission() {
            return Err(AdminError::not_allowed(page.register_name(), "update"));
        }
        page.update(session, pk, data).await
    }

    pub async fn remove(&self, register_name: &str, session: &dyn Session, pk: Value) -> AdminResult<Value> {
        let page = self.page(register_name)?;
        if !page.has_remove_permission() {
            return Err(AdminError::not_allowed(page.register_name(), "remove"));
        }
        page.remove(session, pk).await
    }

    pub async fn remove_bulk(
        &self,
        register_name: &str,
        session: &dyn Session,
        pks: Vec<Value>,
    ) -> AdminResult<u64> {
        let page = self.page(register_name)?;
        if !page.has_remove_permission() {
            return Err(AdminError::not_allowed(page.register_name(), "remove"));
        }
        page.remove_bulk(session, pks).await
    }

    pub async fn remove_all(&self, register_name: &str, session: &dyn Session) -> AdminResult<u64> {
        let page = self.page(register_name)?;
        if !page.has_remove_all_permission() {
            return Err(AdminError::not_allowed(page.register_name(), "remove_all"));
        }
        page.remove_all(session).await
    }

    /// Group page metadata by category. Categories are sorted, and pages
    /// within a category are sorted by plural name.
    pub fn populate_main_metadata(&self) {
        let default_category = self.default_category();
        let mut grouped: BTreeMap<String, Vec<(String, Value)>> = BTreeMap::new();
        for page in self.registry.read().pages.values() {
            let category = page
                .category()
                .map(str::to_string)
                .unwrap_or_else(|| default_category.clone());
            let mut metadata = page.main_metadata();
            if let Value::Object(map) = &mut metadata {
                map.insert("category".to_string(), json!(category));
                map.insert("url".to_string(), json!(self.url_for(page.register_name())));
            }
            grouped
                .entry(category)
                .or_default()
                .push((page.plural_name().to_string(), metadata));
        }

        let metadata: Vec<Value> = grouped
            .into_iter()
            .map(|(category, mut pages)| {
                pages.sort_by(|a, b| a.0.cmp(&b.0));
                let pages = pages.into_iter().map(|(_, metadata)| metadata).collect();
                let mut entry = Map::new();
                entry.insert(category, Value::Array(pages));
                Value::Object(entry)
            })
            .collect();
        *self.main_metadata.write() = Some(metadata);
    }

    pub fn main_metadata(&self) -> AdminResult<Vec<Value>> {
        self.main_metadata
            .read()
            .clone()
            .ok_or(AdminError::PagesNotLoaded)
    }

    pub fn find_metadata(&self, register_name: &str) -> AdminResult<Value> {
        Ok(self.page(register_name)?.find_metadata())
    }

    pub fn create_metadata(&self, register_name: &str) -> AdminResult<Value> {
        Ok(self.page(register_name)?.create_metadata())
    }

    pub fn update_metadata(&self, register_name: &str) -> AdminResult<Value> {
        Ok(self.page(register_name)?.update_metadata())
    }

    /// Build every metadata cache, returning the number of pages.
    pub fn populate_caches(&self) -> usize {
        self.populate_main_metadata();
        let count = self.page_count();
        tracing::info!(pages = count, panel = %self.panel_name(), "admin pages loaded");
        count
    }
}

impl Default for AdminManager {
    fn default() -> Self {
        Self::new(AdminConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::AdminPage;
    use loom_orm::fixtures::{Post, Tag, User};

    fn users_page(register_name: &str) -> Arc<dyn AdminPageHandler> {
        Arc::new(
            AdminPage::<User>::builder(register_name, "User")
                .category("accounts")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let manager = AdminManager::default();
        manager.register(users_page("Users"), false).unwrap();
        assert_eq!(manager.page("USERS").unwrap().register_name(), "users");
        assert!(manager.has_admin::<User>());
        assert!(!manager.has_admin::<Post>());
        assert!(matches!(
            manager.page("posts"),
            Err(AdminError::PageNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_entity_requires_replace() {
        let manager = AdminManager::default();
        manager.register(users_page("users"), false).unwrap();
        let err = manager.register(users_page("people"), false).unwrap_err();
        assert!(matches!(err, AdminError::DuplicateEntity { .. }));

        manager.register(users_page("people"), true).unwrap();
        assert_eq!(manager.register_names(), vec!["people".to_string()]);
        assert_eq!(
            manager.try_get_admin_page::<User>().unwrap().register_name(),
            "people"
        );
    }

    #[test]
    fn test_urls() {
        let manager = AdminManager::new(AdminConfig {
            url: "/panel".into(),
            ..AdminConfig::default()
        });
        assert_eq!(manager.base_url(), "/panel/");
        assert_eq!(manager.url_for("Users"), "/panel/users/");
        assert_eq!(manager.panel_name(), "LOOM ADMIN");
    }

    #[test]
    fn test_main_metadata_grouping() {
        let manager = AdminManager::default();
        assert!(matches!(manager.main_metadata(), Err(AdminError::PagesNotLoaded)));

        manager.register(users_page("users"), false).unwrap();
        manager
            .register(
                Arc::new(
                    AdminPage::<Tag>::builder("tags", "Tag")
                        .category("content")
                        .build()
                        .unwrap(),
                ),
                false,
            )
            .unwrap();
        manager
            .register(
                Arc::new(
                    AdminPage::<Post>::builder("posts", "Post")
                        .plural_name("Articles")
                        .category("content")
                        .build()
                        .unwrap(),
                ),
                false,
            )
            .unwrap();

        assert_eq!(manager.populate_caches(), 3);
        let metadata = manager.main_metadata().unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0]["ACCOUNTS"][0]["register_name"], "users");
        assert_eq!(metadata[0]["ACCOUNTS"][0]["url"], "/admin/api/users/");
        let content = metadata[1]["CONTENT"].as_array().unwrap();
        assert_eq!(content[0]["plural_name"], "Articles");
        assert_eq!(content[1]["plural_name"], "Tags");
    }

    #[test]
    fn test_uncategorized_pages_use_default_category() {
        let manager = AdminManager::default();
        manager
            .register(
                Arc::new(AdminPage::<Tag>::builder("tags", "Tag").build().unwrap()),
                false,
            )
            .unwrap();
        manager.populate_main_metadata();
        let metadata = manager.main_metadata().unwrap();
        assert_eq!(metadata[0]["GENERAL"][0]["category"], "GENERAL");
    }
}
