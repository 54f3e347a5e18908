//! # loom-queue
//!
//! In-process task queue for the loom framework.
//!
//! ## Features
//!
//! - **Named queues**: tasks are routed to queues and consumed by workers
//!   subscribed to them
//! - **Priorities and delays**: higher priority first, delayed tasks wait
//!   for their `eta`
//! - **Retries**: failed tasks are retried with exponential backoff
//! - **Beat**: cron entries enqueue tasks periodically
//! - **Commands**: `worker`, `beat`, `result`, `inspect`, `call`, `purge`
//!   and `status`, with defaults taken from the `task_queue` section
//!
//! ## Quick Start
//!
//! ```rust
//! use loom_queue::{Task, TaskOutput, TaskQueueManager, QueueConfig};
//! use serde::{Serialize, Deserialize};
//! use async_trait::async_trait;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct SendEmail {
//!     to: String,
//! }
//!
//! #[async_trait]
//! impl Task for SendEmail {
//!     fn name() -> &'static str {
//!         "send_email"
//!     }
//!
//!     async fn run(&self) -> TaskOutput {
//!         Ok(serde_json::json!({ "sent": self.to }))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let manager = TaskQueueManager::new(QueueConfig::default());
//! manager.registry().register::<SendEmail>();
//!
//! let id = manager.delay(SendEmail { to: "ada@example.com".into() }).await.unwrap();
//! let worker = manager.worker(Default::default());
//! worker.process_next().await.unwrap();
//! assert!(manager.result(id).unwrap().is_successful());
//! # });
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod beat;
pub mod broker;
pub mod cli;
pub mod config;
pub mod manager;
pub mod registry;
pub mod results;
pub mod worker;

pub use beat::{Beat, BeatEntry, CronExpression};
pub use broker::{Broker, MemoryBroker, QueueStats};
pub use cli::{QueueCommand, QueueCommandOutput};
pub use config::{QueueConfig, QueueConfigBuilder};
pub use manager::{CallOptions, InspectMethod, TaskQueueManager, WorkerInfo};
pub use registry::{TaskHandler, TaskRegistry};
pub use results::{ResultStore, TaskResultRecord};
pub use worker::{Worker, WorkerOptions, WorkerStats};

/// Task queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task [{0}] is not registered")]
    UnregisteredTask(String),

    #[error("Queue configuration error: {0}")]
    Configuration(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("Beat entry [{0}] is already registered")]
    DuplicateBeatEntry(String),

    #[error("Invalid command argument: {0}")]
    InvalidArgument(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Task execution failed: {0}")]
    Execution(String),
}

impl loom_core::StatusError for QueueError {
    fn status_code(&self) -> u16 {
        match self {
            QueueError::TaskNotFound(_) => 404,
            QueueError::InvalidArgument(_) | QueueError::InvalidCron(_) => 400,
            _ => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            QueueError::Serialization(_) => "TASK_SERIALIZATION_ERROR",
            QueueError::Broker(_) => "BROKER_ERROR",
            QueueError::TaskNotFound(_) => "TASK_NOT_FOUND",
            QueueError::UnregisteredTask(_) => "UNREGISTERED_TASK",
            QueueError::Configuration(_) => "QUEUE_CONFIGURATION_ERROR",
            QueueError::InvalidCron(_) => "INVALID_CRON_EXPRESSION",
            QueueError::DuplicateBeatEntry(_) => "DUPLICATED_BEAT_ENTRY",
            QueueError::InvalidArgument(_) => "INVALID_ARGUMENT",
            QueueError::Timeout => "TASK_TIMEOUT",
            QueueError::Execution(_) => "TASK_EXECUTION_FAILED",
        }
    }
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Result of running a task
pub type TaskOutput = Result<Value, Box<dyn std::error::Error + Send + Sync>>;

/// Task unique identifier
pub type TaskId = Uuid;

/// Task priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl std::str::FromStr for Priority {
    type Err = QueueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(QueueError::InvalidArgument(format!("unknown priority [{}]", other))),
        }
    }
}

/// Task execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Waiting in a queue
    Pending,
    /// Picked up by a worker
    Started,
    /// Finished successfully
    Success,
    /// Failed and waiting for another attempt
    Retry,
    /// Failed permanently after max retries
    Failure,
    /// Removed before it ran
    Revoked,
}

impl TaskState {
    /// Whether the task will not change state anymore.
    pub fn is_ready(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure | TaskState::Revoked)
    }
}

/// Core trait for typed tasks
///
/// A task is serialized into the keyword arguments of its message, so it
/// must serialize to a JSON object.
#[async_trait]
pub trait Task: Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Registered task name
    fn name() -> &'static str;

    /// Run the task
    async fn run(&self) -> TaskOutput;

    /// Queue the task is routed to when none is given
    fn queue() -> Option<&'static str> {
        None
    }

    /// Maximum number of retries after the first attempt
    fn max_retries() -> Option<u32> {
        None
    }
}

/// Task message with payload and delivery metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    id: TaskId,
    task: String,
    queue: String,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    priority: Priority,
    state: TaskState,
    attempts: u32,
    max_retries: u32,
    created_at: DateTime<Utc>,
    /// Earliest time the task may run
    eta: DateTime<Utc>,
    expires: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl TaskMessage {
    pub fn new(task: impl Into<String>, queue: impl Into<String>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            queue: queue.into(),
            args,
            kwargs,
            priority: Priority::default(),
            state: TaskState::Pending,
            attempts: 0,
            max_retries: 3,
            created_at: now,
            eta: now,
            expires: None,
            started_at: None,
            last_error: None,
        }
    }

    /// Message for a typed task.
    pub fn from_task<T: Task>(task: &T, queue: impl Into<String>) -> QueueResult<Self> {
        let kwargs = match serde_json::to_value(task)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(QueueError::InvalidArgument(format!(
                    "task [{}] must serialize to an object, got {}",
                    T::name(),
                    other
                )))
            }
        };
        Ok(Self::new(T::name(), queue, Vec::new(), kwargs))
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_eta(mut self, eta: DateTime<Utc>) -> Self {
        self.eta = eta;
        self
    }

    /// Delay execution by `countdown` from now.
    pub fn with_countdown(self, countdown: Duration) -> QueueResult<Self> {
        let delay = chrono::Duration::from_std(countdown)
            .map_err(|e| QueueError::Configuration(format!("Invalid countdown duration: {}", e)))?;
        let eta = Utc::now() + delay;
        Ok(self.with_eta(eta))
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn eta(&self) -> DateTime<Utc> {
        self.eta
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map_or(false, |expires| expires <= now)
    }

    /// Check if the task can be handed to a worker
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, TaskState::Pending | TaskState::Retry) && self.eta <= now
    }

    /// Deserialize the typed task from the keyword arguments
    pub fn decode<T: Task>(&self) -> QueueResult<T> {
        Ok(serde_json::from_value(Value::Object(self.kwargs.clone()))?)
    }

    pub(crate) fn mark_started(&mut self) {
        self.state = TaskState::Started;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_succeeded(&mut self) {
        self.state = TaskState::Success;
    }

    pub(crate) fn mark_revoked(&mut self) {
        self.state = TaskState::Revoked;
    }

    /// Record a failure that must not be retried
    pub(crate) fn mark_dead(&mut self, error: String) {
        self.attempts += 1;
        self.last_error = Some(error);
        self.state = TaskState::Failure;
    }

    /// Record a failure, scheduling a retry with exponential backoff while
    /// retries remain.
    pub(crate) fn mark_failed(&mut self, error: String, backoff: Duration) {
        self.attempts += 1;
        self.last_error = Some(error);

        if self.attempts > self.max_retries {
            self.state = TaskState::Failure;
        } else {
            self.state = TaskState::Retry;
            let delay = backoff.saturating_mul(1u32 << (self.attempts - 1).min(6));
            // Delays too large for chrono are capped at its maximum
            let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
            self.eta = Utc::now().checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Resize {
        width: u32,
    }

    #[async_trait]
    impl Task for Resize {
        fn name() -> &'static str {
            "resize"
        }

        async fn run(&self) -> TaskOutput {
            Ok(json!(self.width))
        }
    }

    #[test]
    fn test_message_from_task() {
        let message = TaskMessage::from_task(&Resize { width: 64 }, "images").unwrap();
        assert_eq!(message.task(), "resize");
        assert_eq!(message.queue(), "images");
        assert_eq!(message.kwargs()["width"], json!(64));
        assert_eq!(message.state(), TaskState::Pending);
        assert!(message.is_ready(Utc::now()));
        assert_eq!(message.decode::<Resize>().unwrap().width, 64);
    }

    #[test]
    fn test_countdown_delays_message() {
        let message = TaskMessage::new("resize", "default", vec![], Map::new())
            .with_countdown(Duration::from_secs(60))
            .unwrap();
        assert!(!message.is_ready(Utc::now()));

        let err = TaskMessage::new("resize", "default", vec![], Map::new())
            .with_countdown(Duration::MAX)
            .unwrap_err();
        assert!(matches!(err, QueueError::Configuration(msg) if msg.contains("Invalid countdown")));
    }

    #[test]
    fn test_retries_then_failure() {
        let mut message = TaskMessage::new("resize", "default", vec![], Map::new()).with_max_retries(2);
        message.mark_failed("boom".into(), Duration::ZERO);
        assert_eq!(message.state(), TaskState::Retry);
        assert!(message.is_ready(Utc::now()));
        message.mark_failed("boom".into(), Duration::ZERO);
        assert_eq!(message.state(), TaskState::Retry);
        message.mark_failed("boom again".into(), Duration::ZERO);
        assert_eq!(message.state(), TaskState::Failure);
        assert_eq!(message.attempts(), 3);
        assert_eq!(message.last_error(), Some("boom again"));
    }

    #[test]
    fn test_backoff_overflow_is_capped() {
        let mut message = TaskMessage::new("resize", "default", vec![], Map::new()).with_max_retries(u32::MAX);
        message.attempts = 100;
        message.mark_failed("boom".into(), Duration::MAX);
        assert_eq!(message.state(), TaskState::Retry);
        assert!(!message.is_ready(Utc::now()));
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        assert!(Priority::Critical > Priority::Low);
    }
}
