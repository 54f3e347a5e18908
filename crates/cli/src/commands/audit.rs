use clap::Args;
use loom::Application;
use loom_core::AuditOptions;
use serde_json::Value;

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct AuditArgs {
    /// Leave out application name, environment and version
    #[arg(long)]
    pub no_application: bool,

    #[arg(long)]
    pub no_packages: bool,

    #[arg(long)]
    pub no_framework: bool,

    /// Leave out platform details
    #[arg(long)]
    pub no_runtime: bool,

    /// Skip audit hooks
    #[arg(long)]
    pub no_hooks: bool,
}

impl AuditArgs {
    pub fn options(&self) -> AuditOptions {
        AuditOptions {
            application: !self.no_application,
            packages: !self.no_packages,
            framework: !self.no_framework,
            runtime: !self.no_runtime,
            hooks: !self.no_hooks,
        }
    }
}

pub async fn run(application: &Application, args: &AuditArgs) -> (Value, u16) {
    application
        .audit()
        .inspect(application.info(), &args.options())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::ConfigStore;

    #[tokio::test]
    async fn test_audit_sections() {
        let store = ConfigStore::from_yaml_str("application:\n  name: shop\n").unwrap();
        let application = Application::builder(store)
            .env_prefix(None)
            .without_logging()
            .build()
            .await
            .unwrap();

        let args = AuditArgs {
            no_runtime: true,
            no_framework: true,
            ..Default::default()
        };
        let (report, status) = run(&application, &args).await;
        assert_eq!(status, 200);
        assert_eq!(report["application"]["name"], "shop");
        assert!(report.get("platform").is_none());
        assert!(report.get("framework").is_none());
        assert!(report.get("database").is_some());
    }
}
