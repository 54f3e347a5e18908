//! Database manager - session factories and request transaction handling
//!
//! At most one [`SessionFactory`] is registered per scope: request bounded
//! factories serve sessions tied to one HTTP request, unbounded ones serve
//! background work such as tasks and CLI commands.

use crate::convert::ConversionConfig;
use crate::error::{ModelError, ModelResult};
use crate::session::{MemoryDatabase, MemorySession, Session};
use async_trait::async_trait;
use loom_core::ConfigStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Connection pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub idle_timeout: Option<u64>,
    pub max_lifetime: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: 30,
            idle_timeout: Some(600), // 10 minutes
            max_lifetime: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

/// `database` configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; sessions are in-memory when absent.
    pub url: Option<String>,
    pub pool: PoolConfig,
    pub conversion: ConversionConfig,
}

impl DatabaseConfig {
    pub fn from_store(store: &ConfigStore) -> ModelResult<Self> {
        store
            .section_or_default("database")
            .map_err(|e| ModelError::Configuration(e.to_string()))
    }
}

/// Source of sessions for one scope.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Whether sessions from this factory live for one request.
    fn is_request_bounded(&self) -> bool;

    async fn create_session(&self) -> ModelResult<Arc<dyn Session>>;
}

/// Factory of [`MemorySession`]s over one shared database.
#[derive(Debug, Clone)]
pub struct MemorySessionFactory {
    database: MemoryDatabase,
    request_bounded: bool,
}

impl MemorySessionFactory {
    pub fn new(database: MemoryDatabase, request_bounded: bool) -> Self {
        Self {
            database,
            request_bounded,
        }
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.database
    }
}

#[async_trait]
impl SessionFactory for MemorySessionFactory {
    fn is_request_bounded(&self) -> bool {
        self.request_bounded
    }

    async fn create_session(&self) -> ModelResult<Arc<dyn Session>> {
        Ok(Arc::new(MemorySession::new(self.database.clone())))
    }
}

#[cfg(feature = "postgres")]
pub use self::pg::PgSessionFactory;

#[cfg(feature = "postgres")]
mod pg {
    use super::*;
    use crate::session::PgSession;
    use sqlx::postgres::{PgPool, PgPoolOptions};
    use std::time::Duration;

    /// Factory of [`PgSession`]s over a shared pool.
    #[derive(Debug, Clone)]
    pub struct PgSessionFactory {
        pool: PgPool,
        request_bounded: bool,
    }

    impl PgSessionFactory {
        pub fn new(pool: PgPool, request_bounded: bool) -> Self {
            Self {
                pool,
                request_bounded,
            }
        }

        pub fn pool(&self) -> &PgPool {
            &self.pool
        }

        /// Create the pool described by the configuration.
        pub async fn connect(config: &DatabaseConfig, request_bounded: bool) -> ModelResult<Self> {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| ModelError::Configuration("database.url is not set".to_string()))?;
            if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                return Err(ModelError::Configuration(
                    "Invalid PostgreSQL URL scheme".to_string(),
                ));
            }

            let pool_config = &config.pool;
            let mut options = PgPoolOptions::new()
                .max_connections(pool_config.max_connections)
                .min_connections(pool_config.min_connections)
                .acquire_timeout(Duration::from_secs(pool_config.acquire_timeout))
                .test_before_acquire(pool_config.test_before_acquire);
            if let Some(idle_timeout) = pool_config.idle_timeout {
                options = options.idle_timeout(Duration::from_secs(idle_timeout));
            }
            if let Some(max_lifetime) = pool_config.max_lifetime {
                options = options.max_lifetime(Duration::from_secs(max_lifetime));
            }

            let pool = options.connect(url).await?;
            Ok(Self::new(pool, request_bounded))
        }
    }

    #[async_trait]
    impl SessionFactory for PgSessionFactory {
        fn is_request_bounded(&self) -> bool {
            self.request_bounded
        }

        async fn create_session(&self) -> ModelResult<Arc<dyn Session>> {
            Ok(Arc::new(PgSession::new(self.pool.clone())))
        }
    }
}

/// Registry of session factories and request transaction handling.
pub struct DatabaseManager {
    config: DatabaseConfig,
    factories: RwLock<HashMap<bool, Arc<dyn SessionFactory>>>,
}

impl DatabaseManager {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Manager with request bounded and unbounded factories over one
    /// in-memory database.
    pub fn in_memory(database: MemoryDatabase) -> Self {
        let manager = Self::new(DatabaseConfig::default());
        let mut factories = manager.factories.write();
        factories.insert(true, Arc::new(MemorySessionFactory::new(database.clone(), true)) as _);
        factories.insert(false, Arc::new(MemorySessionFactory::new(database, false)) as _);
        drop(factories);
        manager
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn conversion(&self) -> &ConversionConfig {
        &self.config.conversion
    }

    /// Register a factory for its scope. An existing factory of the same
    /// scope is only replaced when `replace` is set.
    pub fn register_session_factory(
        &self,
        factory: Arc<dyn SessionFactory>,
        replace: bool,
    ) -> ModelResult<()> {
        let request_bounded = factory.is_request_bounded();
        let mut factories = self.factories.write();
        if factories.contains_key(&request_bounded) && !replace {
            return Err(ModelError::DuplicateSessionFactory { request_bounded });
        }
        factories.insert(request_bounded, factory);
        tracing::debug!(request_bounded, "registered session factory");
        Ok(())
    }

    pub fn session_factory(&self, request_bounded: bool) -> ModelResult<Arc<dyn SessionFactory>> {
        self.factories
            .read()
            .get(&request_bounded)
            .cloned()
            .ok_or(ModelError::SessionFactoryNotFound { request_bounded })
    }

    /// Factory for the current context: the request bounded one while a
    /// request is being served, the unbounded one otherwise.
    pub fn current_session_factory(&self, in_request: bool) -> ModelResult<Arc<dyn SessionFactory>> {
        if in_request {
            if let Ok(factory) = self.session_factory(true) {
                return Ok(factory);
            }
        }
        self.session_factory(false)
    }

    pub async fn create_session(&self, request_bounded: bool) -> ModelResult<Arc<dyn Session>> {
        self.session_factory(request_bounded)?.create_session().await
    }

    /// End the transaction of a request session by response status: error
    /// statuses roll back, anything else commits. A failed commit is rolled
    /// back and reported. The session is closed in every case.
    pub async fn finalize_transaction(&self, session: &dyn Session, status: u16) -> ModelResult<()> {
        let outcome = if status >= 400 {
            session.rollback().await
        } else {
            match session.commit().await {
                Ok(()) => Ok(()),
                Err(err) => {
                    tracing::error!(session = %session.id(), error = %err, "commit failed, rolling back");
                    if let Err(rollback_err) = session.rollback().await {
                        tracing::error!(session = %session.id(), error = %rollback_err, "rollback failed");
                    }
                    Err(err)
                }
            }
        };

        if let Err(err) = session.close().await {
            tracing::warn!(session = %session.id(), error = %err, "failed to close session");
        }
        outcome
    }

    /// Discard pending work of a session and close it.
    pub async fn cleanup_session(&self, session: &dyn Session) {
        if let Err(err) = session.rollback().await {
            tracing::warn!(session = %session.id(), error = %err, "rollback during cleanup failed");
        }
        if let Err(err) = session.close().await {
            tracing::warn!(session = %session.id(), error = %err, "failed to close session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use serde_json::json;

    fn record(value: serde_json::Value) -> crate::entity::Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_duplicate_factory_requires_replace() {
        let manager = DatabaseManager::new(DatabaseConfig::default());
        let db = MemoryDatabase::new();
        manager
            .register_session_factory(Arc::new(MemorySessionFactory::new(db.clone(), true)), false)
            .unwrap();

        let err = manager
            .register_session_factory(Arc::new(MemorySessionFactory::new(db.clone(), true)), false)
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateSessionFactory { request_bounded: true }));

        manager
            .register_session_factory(Arc::new(MemorySessionFactory::new(db, true)), true)
            .unwrap();
    }

    #[test]
    fn test_current_factory_falls_back_to_unbounded() {
        let manager = DatabaseManager::new(DatabaseConfig::default());
        assert!(manager.current_session_factory(false).is_err());

        manager
            .register_session_factory(
                Arc::new(MemorySessionFactory::new(MemoryDatabase::new(), false)),
                false,
            )
            .unwrap();
        assert!(!manager.current_session_factory(true).unwrap().is_request_bounded());
    }

    #[tokio::test]
    async fn test_finalize_commits_on_success() {
        let db = MemoryDatabase::new();
        let manager = DatabaseManager::in_memory(db.clone());
        let session = manager.create_session(true).await.unwrap();
        session
            .add("users", &["id"], record(json!({"id": null, "name": "alice"})))
            .await
            .unwrap();

        manager.finalize_transaction(session.as_ref(), 201).await.unwrap();
        assert!(session.is_closed());
        assert_eq!(db.rows("users").len(), 1);
    }

    #[tokio::test]
    async fn test_finalize_rolls_back_on_error_status() {
        let db = MemoryDatabase::new();
        let manager = DatabaseManager::in_memory(db.clone());
        let session = manager.create_session(true).await.unwrap();
        session.add("users", &["id"], record(json!({"id": 1}))).await.unwrap();

        manager.finalize_transaction(session.as_ref(), 422).await.unwrap();
        assert!(db.rows("users").is_empty());

        let fresh = manager.create_session(false).await.unwrap();
        assert_eq!(fresh.count(&Query::table("users")).await.unwrap(), 0);
    }

    #[test]
    fn test_config_from_store() {
        let store = ConfigStore::from_yaml_str(
            "database:\n  url: postgres://localhost/loom\n  conversion:\n    default_depth: 2\n",
        )
        .unwrap();
        let config = DatabaseConfig::from_store(&store).unwrap();
        assert_eq!(config.url.as_deref(), Some("postgres://localhost/loom"));
        assert_eq!(config.conversion.default_depth, 2);
        assert_eq!(config.pool.max_connections, 10);
    }
}
