//! Application bootstrap and serving
//!
//! [`ApplicationBuilder`] reads the configuration store, starts logging,
//! creates the framework managers, registers them as components and loads
//! the registered packages. The resulting [`Application`] owns the
//! assembled router and serves it until a shutdown signal arrives.

use async_trait::async_trait;
use axum::Router;
use loom_admin::{AdminConfig, AdminError, AdminManager};
use loom_auth::{AuthConfig, AuthError, Authenticator, AuthenticatorManager, HashingError, HashingManager};
use loom_core::{
    init_logging, AppConfig, ApplicationInfo, AuditHook, AuditManager, AuditReport, ComponentId,
    ComponentRegistry, ConfigError, ConfigStore, CoreError, LoggingConfig, Package, PackageLoader,
    PackagingConfig, PackagingHook,
};
use loom_http::{
    admin_router, apply_middleware_stack, audit_router, AuditState, AuthenticationState,
    MiddlewareStack, AUDIT_PATH,
};
use loom_orm::{DatabaseConfig, DatabaseManager, MemoryDatabase, ModelError};
use loom_queue::{QueueError, TaskQueueManager};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Prefix of environment variables overriding configuration values
pub const ENV_PREFIX: &str = "LOOM";

/// Component names of the framework managers
pub mod component_names {
    pub const DATABASE: &str = "database";
    pub const ADMIN: &str = "admin";
    pub const HASHING: &str = "hashing";
    pub const AUTHENTICATION: &str = "authentication";
    pub const TASK_QUEUE: &str = "task_queue";
    pub const AUDIT: &str = "audit";
}

/// Authenticator used when the `security` section names none
pub const DEFAULT_AUTHENTICATOR: &str = "token";

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Hashing(#[from] HashingError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;

/// Collects packages, hooks, authenticators and routes before the
/// application is assembled.
pub struct ApplicationBuilder {
    store: ConfigStore,
    env_prefix: Option<String>,
    version: Option<String>,
    packages: Vec<Box<dyn Package>>,
    packaging_hooks: Vec<Box<dyn PackagingHook>>,
    audit_hooks: Vec<Box<dyn AuditHook>>,
    authenticators: Vec<Arc<dyn Authenticator>>,
    database: Option<DatabaseManager>,
    routes: Router,
    timeout: Option<Duration>,
    init_logging: bool,
}

impl ApplicationBuilder {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            env_prefix: Some(ENV_PREFIX.to_string()),
            version: None,
            packages: Vec::new(),
            packaging_hooks: Vec::new(),
            audit_hooks: Vec::new(),
            authenticators: Vec::new(),
            database: None,
            routes: Router::new(),
            timeout: None,
            init_logging: true,
        }
    }

    /// Environment prefix for overrides, `None` disables them.
    pub fn env_prefix(mut self, prefix: Option<&str>) -> Self {
        self.env_prefix = prefix.map(str::to_string);
        self
    }

    /// Application version reported by the audit.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn package<P: Package + 'static>(mut self, package: P) -> Self {
        self.packages.push(Box::new(package));
        self
    }

    pub fn packaging_hook<H: PackagingHook + 'static>(mut self, hook: H) -> Self {
        self.packaging_hooks.push(Box::new(hook));
        self
    }

    pub fn audit_hook<H: AuditHook + 'static>(mut self, hook: H) -> Self {
        self.audit_hooks.push(Box::new(hook));
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticators.push(authenticator);
        self
    }

    /// Use this database manager instead of one built from the
    /// `database` section.
    pub fn database(mut self, database: DatabaseManager) -> Self {
        self.database = Some(database);
        self
    }

    /// Application routes, merged with the admin and audit routes.
    pub fn routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Skip installing the global tracing subscriber.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub async fn build(self) -> ApplicationResult<Application> {
        let mut store = self.store;
        if let Some(prefix) = &self.env_prefix {
            let applied = store.apply_env_overrides(prefix);
            if applied > 0 {
                tracing::debug!(applied, prefix = %prefix, "applied environment overrides");
            }
        }

        let config = AppConfig::from_store(&store)?;
        if self.init_logging {
            start_logging(&store, &config)?;
        }
        tracing::info!(
            name = %config.name,
            environment = ?config.environment,
            "Building application"
        );

        let components = ComponentRegistry::new();

        let database = match self.database {
            Some(database) => database,
            None => database_manager(DatabaseConfig::from_store(&store)?).await?,
        };
        let database = Arc::new(database);
        components.register_arc(ComponentId::new(component_names::DATABASE)?, database.clone(), false)?;

        let admin = Arc::new(AdminManager::new(AdminConfig::from_store(&store)?));
        components.register_arc(ComponentId::new(component_names::ADMIN)?, admin.clone(), false)?;

        let auth_config = AuthConfig::from_store(&store)?;
        let hashing = Arc::new(HashingManager::from_config(&auth_config.hashing)?);
        components.register_arc(ComponentId::new(component_names::HASHING)?, hashing.clone(), false)?;

        let default_authenticator = auth_config
            .authenticator
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTHENTICATOR.to_string());
        let authenticators = Arc::new(AuthenticatorManager::new(default_authenticator));
        for authenticator in self.authenticators {
            authenticators.register(authenticator, false)?;
        }
        components.register_arc(
            ComponentId::new(component_names::AUTHENTICATION)?,
            authenticators.clone(),
            false,
        )?;

        let task_queue = Arc::new(TaskQueueManager::from_store(&store)?);
        components.register_arc(ComponentId::new(component_names::TASK_QUEUE)?, task_queue.clone(), false)?;

        let packaging: PackagingConfig = store.section_or_default("packaging")?;
        let mut loader = PackageLoader::new(packaging);
        for package in self.packages {
            loader.register_boxed(package)?;
        }
        for hook in self.packaging_hooks {
            loader.register_boxed_hook(hook);
        }
        loader.load_all(&components, &store)?;
        admin.populate_caches();

        let mut audit = AuditManager::new();
        audit.register_hook(DatabaseAudit {
            database: database.clone(),
        })?;
        audit.register_hook(TaskQueueAudit {
            task_queue: task_queue.clone(),
        })?;
        for hook in self.audit_hooks {
            audit.register_boxed_hook(hook)?;
        }
        let audit = Arc::new(audit);
        components.register_arc(ComponentId::new(component_names::AUDIT)?, audit.clone(), false)?;

        let info = Arc::new(ApplicationInfo {
            name: config.name.clone(),
            environment: config.environment.to_string(),
            version: self.version,
            packages: loader.loaded_packages().to_vec(),
        });

        tracing::info!(
            packages = info.packages.len(),
            components = components.len(),
            "Application is ready"
        );

        Ok(Application {
            config,
            store: Arc::new(store),
            components,
            database,
            admin,
            hashing,
            authenticators,
            task_queue,
            audit,
            info,
            routes: self.routes,
            timeout: self.timeout,
        })
    }
}

fn start_logging(store: &ConfigStore, config: &AppConfig) -> ApplicationResult<()> {
    let logging = if store.has_section("logging") {
        store.section::<LoggingConfig>("logging")?
    } else if config.environment.is_production() {
        LoggingConfig::production()
    } else if config.environment.is_testing() {
        LoggingConfig::test()
    } else {
        LoggingConfig::development()
    };

    // A subscriber installed by the host process wins.
    if let Err(err) = init_logging(&logging) {
        tracing::debug!(error = %err, "logging was already initialized");
    }
    Ok(())
}

async fn database_manager(config: DatabaseConfig) -> ApplicationResult<DatabaseManager> {
    if config.url.is_none() {
        tracing::warn!("database.url is not set, using an in-memory database");
        let manager = DatabaseManager::in_memory(MemoryDatabase::new());
        return Ok(manager);
    }
    connect_database(config).await
}

#[cfg(feature = "postgres")]
async fn connect_database(config: DatabaseConfig) -> ApplicationResult<DatabaseManager> {
    use loom_orm::PgSessionFactory;

    let request_factory = PgSessionFactory::connect(&config, true).await?;
    let manager = DatabaseManager::new(config);
    let unbounded = PgSessionFactory::new(request_factory.pool().clone(), false);
    manager.register_session_factory(Arc::new(request_factory), false)?;
    manager.register_session_factory(Arc::new(unbounded), false)?;
    Ok(manager)
}

#[cfg(not(feature = "postgres"))]
async fn connect_database(_config: DatabaseConfig) -> ApplicationResult<DatabaseManager> {
    Err(ModelError::Configuration(
        "database.url needs the `postgres` feature".to_string(),
    )
    .into())
}

/// Checks that a session can be opened and closed.
struct DatabaseAudit {
    database: Arc<DatabaseManager>,
}

#[async_trait]
impl AuditHook for DatabaseAudit {
    fn audit_name(&self) -> &str {
        component_names::DATABASE
    }

    async fn inspect(&self) -> AuditReport {
        let session = match self.database.create_session(false).await {
            Ok(session) => session,
            Err(err) => return AuditReport::failure(json!({ "error": err.to_string() })),
        };
        match session.close().await {
            Ok(()) => AuditReport::success(json!({ "session": "ok" })),
            Err(err) => AuditReport::failure(json!({ "error": err.to_string() })),
        }
    }
}

/// Reports broker and worker status.
struct TaskQueueAudit {
    task_queue: Arc<TaskQueueManager>,
}

#[async_trait]
impl AuditHook for TaskQueueAudit {
    fn audit_name(&self) -> &str {
        component_names::TASK_QUEUE
    }

    async fn inspect(&self) -> AuditReport {
        match self.task_queue.status().await {
            Ok(status) => AuditReport::success(status),
            Err(err) => AuditReport::failure(json!({ "error": err.to_string() })),
        }
    }
}

/// An assembled application.
pub struct Application {
    config: AppConfig,
    store: Arc<ConfigStore>,
    components: ComponentRegistry,
    database: Arc<DatabaseManager>,
    admin: Arc<AdminManager>,
    hashing: Arc<HashingManager>,
    authenticators: Arc<AuthenticatorManager>,
    task_queue: Arc<TaskQueueManager>,
    audit: Arc<AuditManager>,
    info: Arc<ApplicationInfo>,
    routes: Router,
    timeout: Option<Duration>,
}

impl Application {
    pub fn builder(store: ConfigStore) -> ApplicationBuilder {
        ApplicationBuilder::new(store)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn database(&self) -> &Arc<DatabaseManager> {
        &self.database
    }

    pub fn admin(&self) -> &Arc<AdminManager> {
        &self.admin
    }

    pub fn hashing(&self) -> &Arc<HashingManager> {
        &self.hashing
    }

    pub fn authenticators(&self) -> &Arc<AuthenticatorManager> {
        &self.authenticators
    }

    pub fn task_queue(&self) -> &Arc<TaskQueueManager> {
        &self.task_queue
    }

    pub fn audit(&self) -> &Arc<AuditManager> {
        &self.audit
    }

    pub fn info(&self) -> &ApplicationInfo {
        &self.info
    }

    /// Application routes plus the admin and audit routes, wrapped in the
    /// request middleware stack.
    pub fn router(&self) -> Router {
        let audit = AuditState {
            manager: self.audit.clone(),
            info: self.info.clone(),
        };
        let router = self
            .routes
            .clone()
            .merge(admin_router(self.admin.clone()))
            .merge(audit_router(AUDIT_PATH, audit));

        let authentication = if self.authenticators.names().is_empty() {
            None
        } else {
            Some(AuthenticationState::new(self.authenticators.clone()))
        };

        apply_middleware_stack(
            router,
            MiddlewareStack {
                database: Some(self.database.clone()),
                authentication,
                debug: self.config.debug,
                timeout: self.timeout,
            },
        )
    }

    /// Serve on the configured address until Ctrl+C or SIGTERM.
    pub async fn run(self) -> ApplicationResult<()> {
        self.run_with_shutdown(shutdown_signal()).await
    }

    pub async fn run_with_shutdown<F>(self, shutdown: F) -> ApplicationResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = self.config.bind_address();
        let listener = tokio::net::TcpListener::bind(&address).await?;
        tracing::info!("🚀 {} listening on http://{}", self.config.name, listener.local_addr()?);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::PackageContext;

    struct AdminPages;

    impl Package for AdminPages {
        fn name(&self) -> &str {
            "shop.admin"
        }

        fn load(&self, context: &mut PackageContext<'_>) -> loom_core::CoreResult<()> {
            let admin = context.components.get::<AdminManager>(component_names::ADMIN)?;
            assert!(admin.is_admin_enabled());
            Ok(())
        }
    }

    fn store() -> ConfigStore {
        ConfigStore::from_yaml_str("application:\n  name: shop\n  environment: testing\n").unwrap()
    }

    #[tokio::test]
    async fn test_build_registers_managers() {
        let app = Application::builder(store())
            .env_prefix(None)
            .without_logging()
            .package(AdminPages)
            .build()
            .await
            .unwrap();

        assert_eq!(app.config().name, "shop");
        assert_eq!(app.info().packages, vec!["shop.admin".to_string()]);
        for name in [
            component_names::DATABASE,
            component_names::ADMIN,
            component_names::HASHING,
            component_names::AUTHENTICATION,
            component_names::TASK_QUEUE,
            component_names::AUDIT,
        ] {
            assert!(app.components().contains(name), "{} is not registered", name);
        }
        assert_eq!(app.audit().hook_names(), vec!["database", "task_queue"]);
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_database_url_needs_backend() {
        let store = ConfigStore::from_yaml_str("database:\n  url: postgres://localhost/shop\n").unwrap();
        let result = Application::builder(store)
            .env_prefix(None)
            .without_logging()
            .build()
            .await;
        assert!(matches!(result, Err(ApplicationError::Model(_))));
    }

    #[tokio::test]
    async fn test_duplicate_packages_fail() {
        let result = Application::builder(store())
            .env_prefix(None)
            .without_logging()
            .package(AdminPages)
            .package(AdminPages)
            .build()
            .await;
        assert!(matches!(result, Err(ApplicationError::Core(_))));
    }
}
