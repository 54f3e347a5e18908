//! `task_queue` configuration section and builder

use crate::{QueueError, QueueResult};
use loom_core::ConfigStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the configuration section
pub const CONFIG_SECTION: &str = "task_queue";

/// Task queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue used when a task names none
    pub default_queue: String,

    /// Number of tasks a worker runs at once
    pub worker_concurrency: usize,

    pub worker_hostname: Option<String>,

    /// Queues a worker consumes; empty means the default queue
    pub worker_queues: Vec<String>,

    /// `[max, min]` concurrency
    pub worker_autoscale: Option<Vec<usize>>,

    pub worker_log_level: String,

    pub worker_log_file: Option<String>,

    pub worker_pid_file: Option<String>,

    pub worker_optimization: Option<String>,

    pub beat_log_level: String,

    pub beat_log_file: Option<String>,

    pub beat_pid_file: Option<String>,

    /// Polling interval of idle workers in milliseconds
    pub poll_interval_ms: u64,

    /// Beat tick interval in milliseconds
    pub beat_interval_ms: u64,

    /// Per task timeout in seconds
    pub task_timeout_secs: u64,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Base delay of the exponential retry backoff in milliseconds
    pub retry_backoff_ms: u64,

    /// Maximum number of stored messages (0 = unlimited)
    pub max_queue_size: usize,
}

/// Builder for [`QueueConfig`]
pub struct QueueConfigBuilder {
    default_queue: std::option::Option<String>,
    worker_concurrency: std::option::Option<usize>,
    worker_hostname: std::option::Option<Option<String>>,
    worker_queues: std::option::Option<Vec<String>>,
    worker_autoscale: std::option::Option<Option<Vec<usize>>>,
    worker_log_level: std::option::Option<String>,
    worker_log_file: std::option::Option<Option<String>>,
    worker_pid_file: std::option::Option<Option<String>>,
    worker_optimization: std::option::Option<Option<String>>,
    beat_log_level: std::option::Option<String>,
    beat_log_file: std::option::Option<Option<String>>,
    beat_pid_file: std::option::Option<Option<String>>,
    poll_interval_ms: std::option::Option<u64>,
    beat_interval_ms: std::option::Option<u64>,
    task_timeout_secs: std::option::Option<u64>,
    max_retries: std::option::Option<u32>,
    retry_backoff_ms: std::option::Option<u64>,
    max_queue_size: std::option::Option<usize>,
}

impl QueueConfigBuilder {
    pub fn new() -> Self {
        Self {
            default_queue: None,
            worker_concurrency: None,
            worker_hostname: None,
            worker_queues: None,
            worker_autoscale: None,
            worker_log_level: None,
            worker_log_file: None,
            worker_pid_file: None,
            worker_optimization: None,
            beat_log_level: None,
            beat_log_file: None,
            beat_pid_file: None,
            poll_interval_ms: None,
            beat_interval_ms: None,
            task_timeout_secs: None,
            max_retries: None,
            retry_backoff_ms: None,
            max_queue_size: None,
        }
    }

    pub fn default_queue(mut self, value: String) -> Self {
        self.default_queue = Some(value);
        self
    }

    pub fn worker_concurrency(mut self, value: usize) -> Self {
        self.worker_concurrency = Some(value);
        self
    }

    pub fn worker_hostname(mut self, value: Option<String>) -> Self {
        self.worker_hostname = Some(value);
        self
    }

    pub fn worker_queues(mut self, value: Vec<String>) -> Self {
        self.worker_queues = Some(value);
        self
    }

    pub fn worker_autoscale(mut self, value: Option<Vec<usize>>) -> Self {
        self.worker_autoscale = Some(value);
        self
    }

    pub fn worker_log_level(mut self, value: String) -> Self {
        self.worker_log_level = Some(value);
        self
    }

    pub fn worker_log_file(mut self, value: Option<String>) -> Self {
        self.worker_log_file = Some(value);
        self
    }

    pub fn worker_pid_file(mut self, value: Option<String>) -> Self {
        self.worker_pid_file = Some(value);
        self
    }

    pub fn worker_optimization(mut self, value: Option<String>) -> Self {
        self.worker_optimization = Some(value);
        self
    }

    pub fn beat_log_level(mut self, value: String) -> Self {
        self.beat_log_level = Some(value);
        self
    }

    pub fn beat_log_file(mut self, value: Option<String>) -> Self {
        self.beat_log_file = Some(value);
        self
    }

    pub fn beat_pid_file(mut self, value: Option<String>) -> Self {
        self.beat_pid_file = Some(value);
        self
    }

    pub fn poll_interval_ms(mut self, value: u64) -> Self {
        self.poll_interval_ms = Some(value);
        self
    }

    pub fn beat_interval_ms(mut self, value: u64) -> Self {
        self.beat_interval_ms = Some(value);
        self
    }

    pub fn task_timeout_secs(mut self, value: u64) -> Self {
        self.task_timeout_secs = Some(value);
        self
    }

    pub fn max_retries(mut self, value: u32) -> Self {
        self.max_retries = Some(value);
        self
    }

    pub fn retry_backoff_ms(mut self, value: u64) -> Self {
        self.retry_backoff_ms = Some(value);
        self
    }

    pub fn max_queue_size(mut self, value: usize) -> Self {
        self.max_queue_size = Some(value);
        self
    }

    pub fn build(self) -> Result<QueueConfig, service_builder::error::BuildError> {
        Ok(QueueConfig {
            default_queue: self.default_queue.unwrap_or_else(|| "default".to_string()),
            worker_concurrency: self.worker_concurrency.unwrap_or_else(|| 4),
            worker_hostname: self.worker_hostname.unwrap_or_default(),
            worker_queues: self.worker_queues.unwrap_or_default(),
            worker_autoscale: self.worker_autoscale.unwrap_or_default(),
            worker_log_level: self.worker_log_level.unwrap_or_else(|| "info".to_string()),
            worker_log_file: self.worker_log_file.unwrap_or_default(),
            worker_pid_file: self.worker_pid_file.unwrap_or_default(),
            worker_optimization: self.worker_optimization.unwrap_or_default(),
            beat_log_level: self.beat_log_level.unwrap_or_else(|| "info".to_string()),
            beat_log_file: self.beat_log_file.unwrap_or_default(),
            beat_pid_file: self.beat_pid_file.unwrap_or_default(),
            poll_interval_ms: self.poll_interval_ms.unwrap_or_else(|| 100),
            beat_interval_ms: self.beat_interval_ms.unwrap_or_else(|| 1000),
            task_timeout_secs: self.task_timeout_secs.unwrap_or_else(|| 300),
            max_retries: self.max_retries.unwrap_or_else(|| 3),
            retry_backoff_ms: self.retry_backoff_ms.unwrap_or_else(|| 1000),
            max_queue_size: self.max_queue_size.unwrap_or_else(|| 0),
        })
    }

    pub fn build_with_defaults(self) -> Result<QueueConfig, service_builder::error::BuildError> {
        Ok(QueueConfig {
            default_queue: self.default_queue.unwrap_or_else(|| "default".to_string()),
            worker_concurrency: self.worker_concurrency.unwrap_or_else(|| 4),
            worker_hostname: self.worker_hostname.unwrap_or_default(),
            worker_queues: self.worker_queues.unwrap_or_default(),
            worker_autoscale: self.worker_autoscale.unwrap_or_default(),
            worker_log_level: self.worker_log_level.unwrap_or_else(|| "info".to_string()),
            worker_log_file: self.worker_log_file.unwrap_or_default(),
            worker_pid_file: self.worker_pid_file.unwrap_or_default(),
            worker_optimization: self.worker_optimization.unwrap_or_default(),
            beat_log_level: self.beat_log_level.unwrap_or_else(|| "info".to_string()),
            beat_log_file: self.beat_log_file.unwrap_or_default(),
            beat_pid_file: self.beat_pid_file.unwrap_or_default(),
            poll_interval_ms: self.poll_interval_ms.unwrap_or_else(|| 100),
            beat_interval_ms: self.beat_interval_ms.unwrap_or_else(|| 1000),
            task_timeout_secs: self.task_timeout_secs.unwrap_or_else(|| 300),
            max_retries: self.max_retries.unwrap_or_else(|| 3),
            retry_backoff_ms: self.retry_backoff_ms.unwrap_or_else(|| 1000),
            max_queue_size: self.max_queue_size.unwrap_or_else(|| 0),
        })
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::new()
    }

    pub fn get_default_queue(&self) -> &String {
        &self.default_queue
    }

    pub fn get_worker_concurrency(&self) -> &usize {
        &self.worker_concurrency
    }

    pub fn get_poll_interval_ms(&self) -> &u64 {
        &self.poll_interval_ms
    }

    pub fn get_beat_interval_ms(&self) -> &u64 {
        &self.beat_interval_ms
    }

    pub fn get_task_timeout_secs(&self) -> &u64 {
        &self.task_timeout_secs
    }

    pub fn get_max_retries(&self) -> &u32 {
        &self.max_retries
    }

    pub fn get_retry_backoff_ms(&self) -> &u64 {
        &self.retry_backoff_ms
    }

    pub fn get_max_queue_size(&self) -> &usize {
        &self.max_queue_size
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_queue: "default".to_string(),
            worker_concurrency: 4,
            worker_hostname: None,
            worker_queues: Vec::new(),
            worker_autoscale: None,
            worker_log_level: "info".to_string(),
            worker_log_file: None,
            worker_pid_file: None,
            worker_optimization: None,
            beat_log_level: "info".to_string(),
            beat_log_file: None,
            beat_pid_file: None,
            poll_interval_ms: 100,
            beat_interval_ms: 1000,
            task_timeout_secs: 300,
            max_retries: 3,
            retry_backoff_ms: 1000,
            max_queue_size: 0,
        }
    }
}

impl QueueConfig {
    /// Read the active `task_queue` section, falling back to defaults.
    pub fn from_store(store: &ConfigStore) -> QueueResult<Self> {
        let config: Self = store
            .resolved_section(CONFIG_SECTION)
            .map_err(|e| QueueError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QueueResult<()> {
        if self.worker_concurrency == 0 {
            return Err(QueueError::Configuration(
                "worker_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.default_queue.trim().is_empty() {
            return Err(QueueError::Configuration(
                "default_queue must not be empty".to_string(),
            ));
        }
        if let Some(autoscale) = &self.worker_autoscale {
            if autoscale.len() != 2 || autoscale[0] < autoscale[1] {
                return Err(QueueError::Configuration(
                    "worker_autoscale must be [max, min] with max >= min".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Queues a worker consumes when none are given.
    pub fn effective_worker_queues(&self) -> Vec<String> {
        if self.worker_queues.is_empty() {
            vec![self.default_queue.clone()]
        } else {
            self.worker_queues.clone()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn beat_interval(&self) -> Duration {
        Duration::from_millis(self.beat_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl QueueConfigBuilder {
    /// Create a development configuration with fast polling and small timeouts
    pub fn development() -> Self {
        QueueConfigBuilder::new()
            .worker_concurrency(2)
            .poll_interval_ms(50)
            .task_timeout_secs(60)
            .worker_log_level("debug".to_string())
    }

    /// Create a production configuration with conservative defaults
    pub fn production() -> Self {
        QueueConfigBuilder::new()
            .worker_concurrency(8)
            .poll_interval_ms(500)
            .task_timeout_secs(600)
            .retry_backoff_ms(5000)
    }

    /// Create a testing configuration with minimal overhead
    pub fn testing() -> Self {
        QueueConfigBuilder::new()
            .worker_concurrency(1)
            .poll_interval_ms(10)
            .beat_interval_ms(10)
            .task_timeout_secs(10)
            .retry_backoff_ms(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queue_config() {
        let config = QueueConfig::default();
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.task_timeout(), Duration::from_secs(300));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.effective_worker_queues(), vec!["default".to_string()]);
    }

    #[test]
    fn test_queue_config_builder() {
        let config = QueueConfigBuilder::new()
            .worker_concurrency(8)
            .task_timeout_secs(600)
            .build()
            .expect("Failed to build config");

        assert_eq!(*config.get_worker_concurrency(), 8);
        assert_eq!(*config.get_task_timeout_secs(), 600);
        assert_eq!(*config.get_poll_interval_ms(), 100); // Default
    }

    #[test]
    fn test_testing_config() {
        let config = QueueConfigBuilder::testing()
            .build()
            .expect("Failed to build config");
        assert_eq!(*config.get_worker_concurrency(), 1);
        assert_eq!(config.retry_backoff(), Duration::ZERO);
    }

    #[test]
    fn test_from_store_with_active_section() {
        let store = ConfigStore::from_yaml_str(
            "task_queue:\n  active: production\n  default_queue: main\n  production:\n    worker_concurrency: 16\n    worker_queues: [emails, images]\n    worker_autoscale: [10, 3]\n",
        )
        .unwrap();
        let config = QueueConfig::from_store(&store).unwrap();
        assert_eq!(config.default_queue, "main");
        assert_eq!(config.worker_concurrency, 16);
        assert_eq!(config.effective_worker_queues(), vec!["emails", "images"]);
        assert_eq!(config.worker_autoscale, Some(vec![10, 3]));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let store = ConfigStore::from_yaml_str("task_queue:\n  worker_autoscale: [1, 5]\n").unwrap();
        assert!(matches!(
            QueueConfig::from_store(&store),
            Err(QueueError::Configuration(_))
        ));
        assert!(QueueConfig::from_store(&ConfigStore::new()).is_ok());
    }
}
