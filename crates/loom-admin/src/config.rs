//! `admin` configuration section

use crate::error::{AdminError, AdminResult};
use loom_core::ConfigStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    /// Base url of admin api, normalized to end with `/`.
    pub url: String,
    pub panel_name: String,
    /// Category of pages that do not declare one.
    pub default_category: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "/admin/api/".to_string(),
            panel_name: "loom admin".to_string(),
            default_category: "general".to_string(),
        }
    }
}

impl AdminConfig {
    /// Read the active `admin` section, falling back to defaults.
    pub fn from_store(store: &ConfigStore) -> AdminResult<Self> {
        store
            .resolved_section::<AdminConfig>("admin")
            .map_err(|e| AdminError::Configuration {
                message: e.to_string(),
            })
    }

    pub fn base_url(&self) -> String {
        let url = self.url.trim();
        if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{}/", url)
        }
    }

    pub fn panel_name(&self) -> String {
        self.panel_name.to_uppercase()
    }

    pub fn default_category(&self) -> String {
        self.default_category.to_uppercase()
    }
}
