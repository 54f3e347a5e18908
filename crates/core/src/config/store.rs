//! Sectioned configuration store.
//!
//! Settings are grouped in named sections (`database`, `admin`, `task_queue`,
//! ...). A section may hold environment specific sub-sections selected by an
//! `active` key:
//!
//! ```yaml
//! task_queue:
//!   active: development
//!   development:
//!     worker_concurrency: 2
//!   production:
//!     worker_concurrency: 16
//! ```
//!
//! Values can be overridden through environment variables named
//! `<PREFIX>__<SECTION>__<KEY>`.

use crate::config::{ConfigError, ConfigResult};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Key used inside a section to select its active sub-section.
pub const ACTIVE_KEY: &str = "active";

/// Default prefix of environment overrides.
pub const ENV_PREFIX: &str = "LOOM";

#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    sections: BTreeMap<String, Value>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document whose top level keys are section names.
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let mut store = Self::new();
        store.merge_yaml_str(content)?;
        Ok(store)
    }

    /// Load a YAML settings file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let mut store = Self::new();
        store.load_file(path)?;
        Ok(store)
    }

    /// Merge a YAML settings file into this store. Later files win on
    /// conflicting keys.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        self.merge_yaml_str(&content)?;
        tracing::debug!("Loaded configuration file {}", path.display());
        Ok(())
    }

    pub fn merge_yaml_str(&mut self, content: &str) -> ConfigResult<()> {
        let document: Value = serde_yaml::from_str(content)?;
        let sections = match document {
            Value::Object(sections) => sections,
            Value::Null => return Ok(()),
            _ => {
                return Err(ConfigError::validation_failed(
                    "configuration document must be a mapping of sections",
                ))
            }
        };

        for (name, value) in sections {
            match self.sections.get_mut(&name) {
                Some(existing) => merge_values(existing, value),
                None => {
                    self.sections.insert(name, value);
                }
            }
        }
        Ok(())
    }

    /// Apply `LOOM__SECTION__KEY` style overrides from the process environment.
    pub fn apply_env_overrides(&mut self, prefix: &str) -> usize {
        self.apply_overrides(prefix, std::env::vars())
    }

    /// Apply overrides from an explicit list of `(name, value)` pairs.
    ///
    /// Values are parsed as YAML scalars so `"8"` becomes a number and
    /// `"true"` a boolean. Returns the number of applied overrides.
    pub fn apply_overrides<I>(&mut self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{}__", prefix);
        let mut applied = 0;

        for (name, raw) in vars {
            let Some(rest) = name.strip_prefix(&marker) else {
                continue;
            };
            let path: Vec<String> = rest.split("__").map(|p| p.to_lowercase()).collect();
            if path.len() < 2 || path.iter().any(|p| p.is_empty()) {
                continue;
            }

            let value = serde_yaml::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
            let section = self
                .sections
                .entry(path[0].clone())
                .or_insert_with(|| Value::Object(Map::new()));
            set_path(section, &path[1..], value);
            applied += 1;
        }

        if applied > 0 {
            tracing::debug!("Applied {} configuration overrides", applied);
        }
        applied
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.keys().map(String::as_str).collect()
    }

    /// Raw value of a whole section.
    pub fn section_value(&self, name: &str) -> ConfigResult<&Value> {
        self.sections
            .get(name)
            .ok_or_else(|| ConfigError::section_not_found(name))
    }

    /// Deserialize a whole section into a typed configuration struct.
    pub fn section<T: DeserializeOwned>(&self, name: &str) -> ConfigResult<T> {
        let value = self.section_value(name)?.clone();
        Ok(serde_json::from_value(value)?)
    }

    /// Deserialize a section or fall back to the type's default when the
    /// section is absent.
    pub fn section_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> ConfigResult<T> {
        if self.has_section(name) {
            self.section(name)
        } else {
            Ok(T::default())
        }
    }

    /// The sub-section named by the section's `active` key.
    pub fn active_section_value(&self, name: &str) -> ConfigResult<&Value> {
        let section = self.section_value(name)?;
        let active = section
            .get(ACTIVE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::KeyNotFound {
                section: name.to_string(),
                key: ACTIVE_KEY.to_string(),
            })?;

        section
            .get(active)
            .ok_or_else(|| ConfigError::ActiveSectionNotFound {
                section: name.to_string(),
                active: active.to_string(),
            })
    }

    /// Deserialize the active sub-section of a section.
    pub fn active_section<T: DeserializeOwned>(&self, name: &str) -> ConfigResult<T> {
        let value = self.active_section_value(name)?.clone();
        Ok(serde_json::from_value(value)?)
    }

    /// Section values with the active sub-section flattened on top.
    ///
    /// Sections without an `active` key are returned as they are.
    pub fn resolved_section_value(&self, name: &str) -> ConfigResult<Value> {
        let section = self.section_value(name)?;
        if section.get(ACTIVE_KEY).is_none() {
            return Ok(section.clone());
        }
        let mut resolved = self.active_section_value(name)?.clone();
        if let (Value::Object(target), Value::Object(base)) = (&mut resolved, section) {
            // plain keys beside `active` act as shared defaults
            for (key, value) in base {
                if key == ACTIVE_KEY || value.is_object() {
                    continue;
                }
                target.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        Ok(resolved)
    }

    /// Deserialize a section honouring its active sub-section.
    pub fn resolved_section<T: DeserializeOwned + Default>(&self, name: &str) -> ConfigResult<T> {
        if !self.has_section(name) {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(self.resolved_section_value(name)?)?)
    }

    pub fn get(&self, section: &str, key: &str) -> ConfigResult<&Value> {
        self.section_value(section)?
            .get(key)
            .ok_or_else(|| ConfigError::KeyNotFound {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    pub fn get_active(&self, section: &str, key: &str) -> ConfigResult<&Value> {
        self.active_section_value(section)?
            .get(key)
            .ok_or_else(|| ConfigError::KeyNotFound {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// Typed lookup with a fallback for missing sections or keys.
    pub fn get_or<T: DeserializeOwned>(&self, section: &str, key: &str, default: T) -> T {
        self.get(section, key)
            .ok()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or(default)
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<Value>) {
        let section = self
            .sections
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        set_path(section, &[key.to_string()], value.into());
    }
}

fn set_path(target: &mut Value, path: &[String], value: Value) {
    let Some((head, tail)) = path.split_first() else {
        *target = value;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set_path(child, tail, value);
    }
}

fn merge_values(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match target.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, incoming) => *target = incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const SETTINGS: &str = r#"
database:
  conversion:
    default_depth: 2
admin:
  url: /admin
  panel_name: Control
task_queue:
  active: development
  worker_loglevel: info
  development:
    worker_concurrency: 2
  production:
    worker_concurrency: 16
"#;

    #[derive(Debug, Default, Deserialize)]
    struct QueueSection {
        worker_concurrency: u32,
        worker_loglevel: String,
    }

    #[test]
    fn test_section_lookup() {
        let store = ConfigStore::from_yaml_str(SETTINGS).unwrap();
        assert!(store.has_section("admin"));
        assert_eq!(store.get("admin", "url").unwrap(), "/admin");
        assert!(matches!(
            store.get("admin", "missing"),
            Err(ConfigError::KeyNotFound { .. })
        ));
        assert!(matches!(
            store.section_value("nope"),
            Err(ConfigError::SectionNotFound { .. })
        ));
    }

    #[test]
    fn test_active_section() {
        let store = ConfigStore::from_yaml_str(SETTINGS).unwrap();
        assert_eq!(store.get_active("task_queue", "worker_concurrency").unwrap(), 2);

        let resolved: QueueSection = store.resolved_section("task_queue").unwrap();
        assert_eq!(resolved.worker_concurrency, 2);
        assert_eq!(resolved.worker_loglevel, "info");
    }

    #[test]
    fn test_overrides() {
        let mut store = ConfigStore::from_yaml_str(SETTINGS).unwrap();
        let applied = store.apply_overrides(
            "LOOM",
            vec![
                ("LOOM__ADMIN__PANEL_NAME".to_string(), "Backoffice".to_string()),
                ("LOOM__TASK_QUEUE__DEVELOPMENT__WORKER_CONCURRENCY".to_string(), "8".to_string()),
                ("OTHER__ADMIN__URL".to_string(), "/ignored".to_string()),
            ],
        );
        assert_eq!(applied, 2);
        assert_eq!(store.get("admin", "panel_name").unwrap(), "Backoffice");
        assert_eq!(store.get_active("task_queue", "worker_concurrency").unwrap(), 8);
        assert_eq!(store.get("admin", "url").unwrap(), "/admin");
    }

    #[test]
    fn test_merge_keeps_existing_keys() {
        let mut store = ConfigStore::from_yaml_str(SETTINGS).unwrap();
        store.merge_yaml_str("admin:\n  url: /backoffice\n").unwrap();
        assert_eq!(store.get("admin", "url").unwrap(), "/backoffice");
        assert_eq!(store.get("admin", "panel_name").unwrap(), "Control");
    }

    #[test]
    fn test_get_or_and_set() {
        let mut store = ConfigStore::new();
        assert_eq!(store.get_or("database", "pool", 5u32), 5);
        store.set("database", "pool", 10);
        assert_eq!(store.get_or("database", "pool", 5u32), 10);
    }

    #[test]
    fn test_load_files_in_order() {
        use std::io::Write;

        let mut base = tempfile::NamedTempFile::new().unwrap();
        writeln!(base, "admin:\n  url: /admin\n  panel_name: Control").unwrap();
        let mut local = tempfile::NamedTempFile::new().unwrap();
        writeln!(local, "admin:\n  url: /local").unwrap();

        let mut store = ConfigStore::from_file(base.path()).unwrap();
        store.load_file(local.path()).unwrap();
        assert_eq!(store.get("admin", "url").unwrap(), "/local");
        assert_eq!(store.get("admin", "panel_name").unwrap(), "Control");

        assert!(ConfigStore::from_file("/nonexistent/settings.yaml").is_err());
    }
}
