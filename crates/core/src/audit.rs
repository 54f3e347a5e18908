//! Application health inspection.
//!
//! Audit hooks check one subsystem each (database reachability, broker
//! connectivity...). The audit manager runs every hook and adds general
//! information about the running application.

use crate::errors::{CoreError, CoreResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Outcome of a single audit hook.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditReport {
    pub data: Value,
    pub succeeded: bool,
}

impl AuditReport {
    pub fn success(data: Value) -> Self {
        Self {
            data,
            succeeded: true,
        }
    }

    pub fn failure(data: Value) -> Self {
        Self {
            data,
            succeeded: false,
        }
    }
}

#[async_trait]
pub trait AuditHook: Send + Sync {
    /// Key under which the hook's result is reported.
    fn audit_name(&self) -> &str;

    async fn inspect(&self) -> AuditReport;
}

/// Which sections to include in an audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditOptions {
    pub application: bool,
    pub packages: bool,
    pub framework: bool,
    pub runtime: bool,
    pub hooks: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            application: true,
            packages: true,
            framework: true,
            runtime: true,
            hooks: true,
        }
    }
}

/// Static facts about the running application.
#[derive(Debug, Clone, Default)]
pub struct ApplicationInfo {
    pub name: String,
    pub environment: String,
    pub version: Option<String>,
    pub packages: Vec<String>,
}

#[derive(Default)]
pub struct AuditManager {
    hooks: Vec<Box<dyn AuditHook>>,
}

impl AuditManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_hook<H: AuditHook + 'static>(&mut self, hook: H) -> CoreResult<()> {
        self.register_boxed_hook(Box::new(hook))
    }

    pub fn register_boxed_hook(&mut self, hook: Box<dyn AuditHook>) -> CoreResult<()> {
        if self
            .hooks
            .iter()
            .any(|h| h.audit_name() == hook.audit_name())
        {
            return Err(CoreError::DuplicateAuditHook {
                name: hook.audit_name().to_string(),
            });
        }
        self.hooks.push(hook);
        Ok(())
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.audit_name()).collect()
    }

    /// Run the audit and return the report with the HTTP status to send:
    /// 200 when every hook succeeded, 500 otherwise.
    pub async fn inspect(&self, info: &ApplicationInfo, options: &AuditOptions) -> (Value, u16) {
        let mut data = Map::new();
        let mut succeeded = true;

        if options.application {
            data.insert(
                "application".to_string(),
                json!({
                    "name": info.name,
                    "environment": info.environment,
                    "version": info.version,
                    "datetime": chrono::Utc::now().to_rfc3339(),
                }),
            );
        }

        if options.packages {
            data.insert(
                "packages".to_string(),
                json!({
                    "count": info.packages.len(),
                    "names": info.packages,
                }),
            );
        }

        if options.framework {
            data.insert(
                "framework".to_string(),
                json!({
                    "name": crate::FRAMEWORK_NAME,
                    "version": crate::VERSION,
                }),
            );
        }

        if options.runtime {
            data.insert(
                "platform".to_string(),
                json!({
                    "os": std::env::consts::OS,
                    "family": std::env::consts::FAMILY,
                    "arch": std::env::consts::ARCH,
                }),
            );
        }

        if options.hooks {
            for hook in &self.hooks {
                let report = hook.inspect().await;
                if !report.succeeded {
                    tracing::warn!("Audit hook '{}' failed", hook.audit_name());
                    succeeded = false;
                }
                data.insert(hook.audit_name().to_string(), report.data);
            }
        }

        let status = if succeeded { 200 } else { 500 };
        (Value::Object(data), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticHook {
        name: &'static str,
        ok: bool,
    }

    #[async_trait]
    impl AuditHook for StaticHook {
        fn audit_name(&self) -> &str {
            self.name
        }

        async fn inspect(&self) -> AuditReport {
            if self.ok {
                AuditReport::success(json!({"connected": true}))
            } else {
                AuditReport::failure(json!({"error": "unreachable"}))
            }
        }
    }

    fn info() -> ApplicationInfo {
        ApplicationInfo {
            name: "shop".to_string(),
            environment: "testing".to_string(),
            version: None,
            packages: vec!["loom.database".to_string()],
        }
    }

    #[tokio::test]
    async fn test_successful_audit() {
        let mut manager = AuditManager::new();
        manager
            .register_hook(StaticHook { name: "database", ok: true })
            .unwrap();

        let (data, status) = manager.inspect(&info(), &AuditOptions::default()).await;
        assert_eq!(status, 200);
        assert_eq!(data["database"]["connected"], true);
        assert_eq!(data["packages"]["count"], 1);
        assert_eq!(data["framework"]["name"], crate::FRAMEWORK_NAME);
    }

    #[tokio::test]
    async fn test_failed_hook_sets_error_status() {
        let mut manager = AuditManager::new();
        manager
            .register_hook(StaticHook { name: "database", ok: true })
            .unwrap();
        manager
            .register_hook(StaticHook { name: "broker", ok: false })
            .unwrap();

        let options = AuditOptions {
            runtime: false,
            ..AuditOptions::default()
        };
        let (data, status) = manager.inspect(&info(), &options).await;
        assert_eq!(status, 500);
        assert!(data.get("platform").is_none());
        assert_eq!(data["broker"]["error"], "unreachable");
    }

    #[test]
    fn test_duplicate_hook() {
        let mut manager = AuditManager::new();
        manager
            .register_hook(StaticHook { name: "database", ok: true })
            .unwrap();
        assert!(manager
            .register_hook(StaticHook { name: "database", ok: false })
            .is_err());
    }
}
