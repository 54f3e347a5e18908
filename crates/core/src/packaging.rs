//! Package loading.
//!
//! A package groups the startup code of one framework or application area
//! and usually registers a single component. Packages are loaded in three
//! groups: core packages first, then application packages and finally test
//! packages when enabled. Inside a group a package waits until its declared
//! dependencies and its parent package (`a.b` is the parent of `a.b.c`) are
//! loaded.

use crate::components::ComponentRegistry;
use crate::config::ConfigStore;
use crate::errors::{CoreError, CoreResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

static PACKAGE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]*(\.[a-z_][a-z0-9_]*)*$").expect("valid package name pattern")
});

/// Group a package is loaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Core,
    Application,
    Test,
}

impl PackageKind {
    /// Load order of the groups.
    pub const ORDER: [PackageKind; 3] = [
        PackageKind::Core,
        PackageKind::Application,
        PackageKind::Test,
    ];
}

/// What a package gets access to while it loads.
pub struct PackageContext<'a> {
    pub components: &'a ComponentRegistry,
    pub config: &'a ConfigStore,
}

pub trait Package: Send + Sync {
    /// Dotted package name, e.g. `loom.database.migration`.
    fn name(&self) -> &str;

    fn kind(&self) -> PackageKind {
        PackageKind::Application
    }

    /// Names of packages that must be loaded before this one.
    fn depends(&self) -> Vec<String> {
        Vec::new()
    }

    /// Component this package is expected to register, if any.
    fn component_name(&self) -> Option<&str> {
        None
    }

    fn load(&self, context: &mut PackageContext<'_>) -> CoreResult<()>;
}

/// Callbacks around package loading.
pub trait PackagingHook: Send + Sync {
    fn before_packages_load(&self) -> CoreResult<()> {
        Ok(())
    }

    fn package_loaded(&self, _name: &str) -> CoreResult<()> {
        Ok(())
    }

    fn after_packages_loaded(&self, _loaded: &[String]) -> CoreResult<()> {
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// `packaging` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagingConfig {
    /// Packages whose name equals or starts with one of these are skipped.
    #[serde(default)]
    pub ignored_packages: Vec<String>,
    #[serde(default = "default_true")]
    pub load_test_packages: bool,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            ignored_packages: Vec::new(),
            load_test_packages: true,
        }
    }
}

impl PackagingConfig {
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_packages.iter().any(|ignored| {
            name == ignored
                || name
                    .strip_prefix(ignored.as_str())
                    .map_or(false, |rest| rest.starts_with('.'))
        })
    }
}

/// Loading statistics
#[derive(Debug, Clone, Default)]
pub struct LoadingStats {
    pub package_count: usize,
    pub ignored_count: usize,
    pub total_time: Duration,
}

pub struct PackageLoader {
    packages: Vec<Box<dyn Package>>,
    hooks: Vec<Box<dyn PackagingHook>>,
    config: PackagingConfig,
    loaded: Vec<String>,
    loading_stats: LoadingStats,
}

impl PackageLoader {
    pub fn new(config: PackagingConfig) -> Self {
        Self {
            packages: Vec::new(),
            hooks: Vec::new(),
            config,
            loaded: Vec::new(),
            loading_stats: LoadingStats::default(),
        }
    }

    pub fn register<P: Package + 'static>(&mut self, package: P) -> CoreResult<()> {
        self.register_boxed(Box::new(package))
    }

    pub fn register_boxed(&mut self, package: Box<dyn Package>) -> CoreResult<()> {
        let name = package.name().to_string();
        if !PACKAGE_NAME.is_match(&name) {
            return Err(CoreError::InvalidPackageName { name });
        }
        if self.packages.iter().any(|p| p.name() == name) {
            return Err(CoreError::DuplicatePackage { name });
        }

        self.packages.push(package);
        Ok(())
    }

    pub fn register_hook<H: PackagingHook + 'static>(&mut self, hook: H) {
        self.register_boxed_hook(Box::new(hook));
    }

    pub fn register_boxed_hook(&mut self, hook: Box<dyn PackagingHook>) {
        self.hooks.push(hook);
    }

    /// Load every registered package in group and dependency order.
    pub fn load_all(
        &mut self,
        components: &ComponentRegistry,
        config: &ConfigStore,
    ) -> CoreResult<()> {
        if !self.loaded.is_empty() {
            tracing::warn!("Packages are already loaded");
            return Ok(());
        }

        let start_time = Instant::now();
        tracing::info!("Loading {} packages...", self.packages.len());

        for hook in &self.hooks {
            hook.before_packages_load()?;
        }

        let known: HashSet<String> = self
            .packages
            .iter()
            .filter(|p| !self.config.is_ignored(p.name()))
            .map(|p| p.name().to_string())
            .collect();
        self.loading_stats.ignored_count = self.packages.len() - known.len();

        let mut context = PackageContext { components, config };
        let mut loaded: Vec<String> = Vec::new();

        for kind in PackageKind::ORDER {
            if kind == PackageKind::Test && !self.config.load_test_packages {
                continue;
            }
            self.load_group(kind, &known, &mut loaded, &mut context)?;
        }

        for hook in &self.hooks {
            hook.after_packages_loaded(&loaded)?;
        }

        self.loading_stats.package_count = loaded.len();
        self.loading_stats.total_time = start_time.elapsed();
        self.loaded = loaded;

        tracing::info!(
            "Loaded {} packages in {:?} ({} ignored)",
            self.loading_stats.package_count,
            self.loading_stats.total_time,
            self.loading_stats.ignored_count
        );
        Ok(())
    }

    fn load_group(
        &self,
        kind: PackageKind,
        known: &HashSet<String>,
        loaded: &mut Vec<String>,
        context: &mut PackageContext<'_>,
    ) -> CoreResult<()> {
        let mut pending: Vec<&dyn Package> = self
            .packages
            .iter()
            .filter(|p| p.kind() == kind && known.contains(p.name()))
            .map(|p| p.as_ref())
            .collect();

        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();

            for package in pending {
                if !self.is_ready(package, known, loaded) {
                    deferred.push(package);
                    continue;
                }

                self.load_package(package, context)?;
                loaded.push(package.name().to_string());
            }

            if deferred.len() == before {
                let details = deferred
                    .iter()
                    .map(|p| format!("{} -> [{}]", p.name(), p.depends().join(", ")))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(CoreError::UnresolvedDependencies { details });
            }
            pending = deferred;
        }

        Ok(())
    }

    fn is_ready(&self, package: &dyn Package, known: &HashSet<String>, loaded: &[String]) -> bool {
        let is_loaded = |name: &str| loaded.iter().any(|l| l == name);

        let parent_ready = match parent_name(package.name()) {
            Some(parent) if known.contains(parent) => is_loaded(parent),
            _ => true,
        };

        parent_ready && package.depends().iter().all(|dep| is_loaded(dep))
    }

    fn load_package(&self, package: &dyn Package, context: &mut PackageContext<'_>) -> CoreResult<()> {
        let name = package.name();
        tracing::debug!("Loading package {}", name);

        package.load(context)?;

        if let Some(component) = package.component_name() {
            if !context.components.contains(component) {
                return Err(CoreError::ComponentNotRegistered {
                    package: name.to_string(),
                    component: component.to_string(),
                });
            }
        }

        for hook in &self.hooks {
            hook.package_loaded(name)?;
        }
        Ok(())
    }

    /// Names of loaded packages in load order.
    pub fn loaded_packages(&self) -> &[String] {
        &self.loaded
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.iter().any(|l| l == name)
    }

    pub fn loading_stats(&self) -> &LoadingStats {
        &self.loading_stats
    }
}

impl Default for PackageLoader {
    fn default() -> Self {
        Self::new(PackagingConfig::default())
    }
}

fn parent_name(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct TestPackage {
        name: &'static str,
        kind: PackageKind,
        depends: Vec<&'static str>,
        component: Option<&'static str>,
        registers: bool,
    }

    impl TestPackage {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                kind: PackageKind::Application,
                depends: Vec::new(),
                component: None,
                registers: false,
            }
        }

        fn with_kind(mut self, kind: PackageKind) -> Self {
            self.kind = kind;
            self
        }

        fn with_depends(mut self, depends: &[&'static str]) -> Self {
            self.depends = depends.to_vec();
            self
        }

        fn with_component(mut self, component: &'static str, registers: bool) -> Self {
            self.component = Some(component);
            self.registers = registers;
            self
        }
    }

    impl Package for TestPackage {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> PackageKind {
            self.kind
        }

        fn depends(&self) -> Vec<String> {
            self.depends.iter().map(|d| d.to_string()).collect()
        }

        fn component_name(&self) -> Option<&str> {
            self.component
        }

        fn load(&self, context: &mut PackageContext<'_>) -> CoreResult<()> {
            if let (Some(component), true) = (self.component, self.registers) {
                context.components.register(
                    crate::components::ComponentId::new(component)?,
                    self.name.to_string(),
                    false,
                )?;
            }
            Ok(())
        }
    }

    struct RecordingHook(Arc<Mutex<Vec<String>>>);

    impl PackagingHook for RecordingHook {
        fn after_packages_loaded(&self, loaded: &[String]) -> CoreResult<()> {
            self.0.lock().unwrap().extend(loaded.iter().cloned());
            Ok(())
        }
    }

    fn load(loader: &mut PackageLoader) -> CoreResult<()> {
        loader.load_all(&ComponentRegistry::new(), &ConfigStore::new())
    }

    #[test]
    fn test_group_and_dependency_order() {
        let mut loader = PackageLoader::default();
        loader
            .register(TestPackage::new("app.users").with_depends(&["app.mail"]))
            .unwrap();
        loader.register(TestPackage::new("app.mail")).unwrap();
        loader
            .register(TestPackage::new("tests.fixtures").with_kind(PackageKind::Test))
            .unwrap();
        loader
            .register(TestPackage::new("loom.database").with_kind(PackageKind::Core))
            .unwrap();
        loader
            .register(TestPackage::new("loom").with_kind(PackageKind::Core))
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        loader.register_hook(RecordingHook(seen.clone()));
        load(&mut loader).unwrap();

        assert_eq!(
            loader.loaded_packages(),
            &["loom", "loom.database", "app.mail", "app.users", "tests.fixtures"]
        );
        assert_eq!(seen.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_parent_loaded_first() {
        let mut loader = PackageLoader::default();
        loader.register(TestPackage::new("app.admin.pages")).unwrap();
        loader.register(TestPackage::new("app.admin")).unwrap();
        load(&mut loader).unwrap();
        assert_eq!(loader.loaded_packages(), &["app.admin", "app.admin.pages"]);
    }

    #[test]
    fn test_unresolved_dependencies() {
        let mut loader = PackageLoader::default();
        loader
            .register(TestPackage::new("app.a").with_depends(&["app.b"]))
            .unwrap();
        loader
            .register(TestPackage::new("app.b").with_depends(&["app.a"]))
            .unwrap();
        assert!(matches!(
            load(&mut loader),
            Err(CoreError::UnresolvedDependencies { .. })
        ));
    }

    #[test]
    fn test_invalid_and_duplicate_names() {
        let mut loader = PackageLoader::default();
        assert!(matches!(
            loader.register(TestPackage::new("App-Users")),
            Err(CoreError::InvalidPackageName { .. })
        ));
        loader.register(TestPackage::new("app.users")).unwrap();
        assert!(matches!(
            loader.register(TestPackage::new("app.users")),
            Err(CoreError::DuplicatePackage { .. })
        ));
    }

    #[test]
    fn test_component_must_be_registered() {
        let mut loader = PackageLoader::default();
        loader
            .register(TestPackage::new("app.mail").with_component("mailer", false))
            .unwrap();
        assert!(matches!(
            load(&mut loader),
            Err(CoreError::ComponentNotRegistered { .. })
        ));

        let mut loader = PackageLoader::default();
        loader
            .register(TestPackage::new("app.mail").with_component("mailer", true))
            .unwrap();
        let components = ComponentRegistry::new();
        loader.load_all(&components, &ConfigStore::new()).unwrap();
        assert!(components.contains("mailer"));
    }

    #[test]
    fn test_ignored_and_test_packages() {
        let mut loader = PackageLoader::new(PackagingConfig {
            ignored_packages: vec!["app.legacy".to_string()],
            load_test_packages: false,
        });
        loader.register(TestPackage::new("app.legacy")).unwrap();
        loader.register(TestPackage::new("app.legacy.reports")).unwrap();
        loader.register(TestPackage::new("app.legacyx")).unwrap();
        loader
            .register(TestPackage::new("tests.fixtures").with_kind(PackageKind::Test))
            .unwrap();
        load(&mut loader).unwrap();

        assert_eq!(loader.loaded_packages(), &["app.legacyx"]);
        assert_eq!(loader.loading_stats().ignored_count, 2);
    }
}
