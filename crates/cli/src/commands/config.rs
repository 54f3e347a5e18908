use clap::Subcommand;
use loom_core::ConfigStore;
use serde_json::{Map, Value};

const MASK: &str = "********";
const SENSITIVE_KEYS: [&str; 2] = ["secret", "password"];

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigCommands {
    /// Print one section, or every section, as YAML
    Show { section: Option<String> },

    /// List section names
    Sections,
}

pub fn run(store: &ConfigStore, command: &ConfigCommands) -> anyhow::Result<String> {
    match command {
        ConfigCommands::Sections => Ok(store.section_names().join("\n")),
        ConfigCommands::Show { section } => {
            let mut value = match section {
                Some(name) => store.section_value(name)?.clone(),
                None => {
                    let mut sections = Map::new();
                    for name in store.section_names() {
                        sections.insert(name.to_string(), store.section_value(name)?.clone());
                    }
                    Value::Object(sections)
                }
            };
            mask_sensitive(&mut value);
            Ok(serde_yaml::to_string(&value)?)
        }
    }
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|sensitive| key.contains(sensitive))
}

fn mask_sensitive(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if is_sensitive(key) && !child.is_object() && !child.is_null() {
                    *child = Value::String(MASK.to_string());
                } else {
                    mask_sensitive(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_sensitive),
        _ => {}
    }
}
