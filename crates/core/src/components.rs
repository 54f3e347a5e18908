//! Component registry.
//!
//! Components are the framework's singleton services (database manager,
//! admin manager, hashing manager...). They are registered once during
//! package loading under a `(name, custom key)` pair and looked up by
//! reference afterwards. A custom key lets an application register an
//! alternative implementation that is selected per request, for example by
//! the authenticated user's tenant.

use crate::errors::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Key used for components registered without a custom key.
pub const DEFAULT_COMPONENT_KEY: &str = "default";

/// Identity of a registered component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId {
    name: String,
    custom_key: String,
}

impl ComponentId {
    /// Create an id with the default custom key.
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        Self::with_key(name, DEFAULT_COMPONENT_KEY)
    }

    pub fn with_key(name: impl Into<String>, custom_key: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::InvalidComponentName {
                message: "component name must not be blank".to_string(),
            });
        }

        let custom_key = custom_key.into();
        let custom_key = if custom_key.trim().is_empty() {
            DEFAULT_COMPONENT_KEY.to_string()
        } else {
            custom_key
        };

        Ok(Self { name, custom_key })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn custom_key(&self) -> &str {
        &self.custom_key
    }

    pub fn is_default(&self) -> bool {
        self.custom_key == DEFAULT_COMPONENT_KEY
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.custom_key)
    }
}

type Instance = Arc<dyn Any + Send + Sync>;

/// Registry of component instances keyed by [`ComponentId`].
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    components: Arc<RwLock<HashMap<ComponentId, Instance>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component instance.
    ///
    /// Registering an id that already exists fails unless `replace` is set.
    pub fn register<T>(&self, id: ComponentId, instance: T, replace: bool) -> CoreResult<()>
    where
        T: Any + Send + Sync,
    {
        self.register_arc(id, Arc::new(instance), replace)
    }

    pub fn register_arc<T>(&self, id: ComponentId, instance: Arc<T>, replace: bool) -> CoreResult<()>
    where
        T: Any + Send + Sync,
    {
        let mut components = self.components.write();
        if components.contains_key(&id) && !replace {
            return Err(CoreError::DuplicateComponent {
                name: id.name().to_string(),
                key: id.custom_key().to_string(),
            });
        }

        if replace && components.contains_key(&id) {
            tracing::info!("Replacing component {}", id);
        } else {
            tracing::debug!("Registered component {}", id);
        }
        components.insert(id, instance);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.read().keys().any(|id| id.name() == name)
    }

    pub fn contains_id(&self, id: &ComponentId) -> bool {
        self.components.read().contains_key(id)
    }

    /// Get the default implementation of a component.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> CoreResult<Arc<T>> {
        self.resolve(name, None)
    }

    /// Get a component honouring a custom key, falling back to the default
    /// implementation when no component is registered for that key.
    pub fn resolve<T: Any + Send + Sync>(
        &self,
        name: &str,
        custom_key: Option<&str>,
    ) -> CoreResult<Arc<T>> {
        let components = self.components.read();

        let custom = custom_key
            .filter(|key| !key.is_empty() && *key != DEFAULT_COMPONENT_KEY)
            .and_then(|key| ComponentId::with_key(name, key).ok())
            .and_then(|id| components.get(&id).cloned());

        let instance = match custom {
            Some(instance) => instance,
            None => {
                let id = ComponentId::new(name)?;
                components
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| CoreError::component_not_found(name))?
            }
        };

        instance
            .downcast::<T>()
            .map_err(|_| CoreError::ComponentTypeMismatch {
                name: name.to_string(),
            })
    }

    pub fn remove(&self, id: &ComponentId) -> bool {
        self.components.write().remove(id).is_some()
    }

    pub fn ids(&self) -> Vec<ComponentId> {
        let mut ids: Vec<_> = self.components.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.ids())
            .finish()
    }
}
