//! Task queue manager tying the broker, workers and beat together

use crate::{
    Beat, Broker, MemoryBroker, Priority, QueueConfig, QueueError, QueueResult, ResultStore, Task, TaskId,
    TaskMessage, TaskRegistry, TaskResultRecord, TaskState, Worker, WorkerOptions,
};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use loom_core::ConfigStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Delivery options of a single call
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub queue: Option<String>,
    pub countdown: Option<Duration>,
    pub eta: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub max_retries: Option<u32>,
}

/// Worker created through the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub hostname: String,
    pub queues: Vec<String>,
    pub concurrency: usize,
    pub started_at: DateTime<Utc>,
}

/// Queries answered by `inspect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InspectMethod {
    /// Registered task names
    Registered,
    /// Delayed tasks waiting for their eta
    Scheduled,
    /// Tasks currently running
    Active,
    /// Tasks ready to be consumed
    Reserved,
    /// Revoked task ids
    Revoked,
    Stats,
    Ping,
    Conf,
    /// State of the given task ids
    QueryTask,
}

pub struct TaskQueueManager {
    config: QueueConfig,
    broker: Arc<dyn Broker>,
    registry: Arc<TaskRegistry>,
    results: Arc<ResultStore>,
    beat: Beat,
    workers: RwLock<Vec<WorkerInfo>>,
}

impl TaskQueueManager {
    /// Manager over an in-memory broker
    pub fn new(config: QueueConfig) -> Self {
        let broker = Arc::new(MemoryBroker::new(config.max_queue_size));
        Self::with_broker(config, broker)
    }

    pub fn with_broker(config: QueueConfig, broker: Arc<dyn Broker>) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        let beat = Beat::new(
            broker.clone(),
            registry.clone(),
            config.default_queue.clone(),
            config.beat_interval(),
        );
        Self {
            config,
            broker,
            registry,
            results: Arc::new(ResultStore::new()),
            beat,
            workers: RwLock::new(Vec::new()),
        }
    }

    /// Manager configured from the `task_queue` section
    pub fn from_store(store: &ConfigStore) -> QueueResult<Self> {
        Ok(Self::new(QueueConfig::from_store(store)?))
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn beat(&self) -> &Beat {
        &self.beat
    }

    /// Send a task by name
    pub async fn send_task(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        options: CallOptions,
    ) -> QueueResult<TaskId> {
        let message = TaskMessage::new(name, self.route(name, options.queue.as_deref()), args, kwargs);
        self.publish(message, options).await
    }

    /// Send a typed task with default options
    pub async fn delay<T: Task>(&self, task: T) -> QueueResult<TaskId> {
        self.apply_async(task, CallOptions::default()).await
    }

    pub async fn apply_async<T: Task>(&self, task: T, options: CallOptions) -> QueueResult<TaskId> {
        let message = TaskMessage::from_task(&task, self.route(T::name(), options.queue.as_deref()))?;
        self.publish(message, options).await
    }

    fn route(&self, task: &str, queue: Option<&str>) -> String {
        queue
            .map(str::to_string)
            .or_else(|| self.registry.route(task))
            .unwrap_or_else(|| self.config.default_queue.clone())
    }

    async fn publish(&self, mut message: TaskMessage, options: CallOptions) -> QueueResult<TaskId> {
        let max_retries = options
            .max_retries
            .or_else(|| self.registry.max_retries(message.task()))
            .unwrap_or(self.config.max_retries);
        message = message.with_max_retries(max_retries);

        if let Some(priority) = options.priority {
            message = message.with_priority(priority);
        }
        if let Some(eta) = options.eta {
            message = message.with_eta(eta);
        }
        if let Some(countdown) = options.countdown {
            message = message.with_countdown(countdown)?;
        }
        if let Some(expires) = options.expires {
            message = message.with_expires(expires);
        }

        // Recorded first so a fast worker's outcome is not overwritten
        self.results.record(&message);
        let task_id = match self.broker.publish(message.clone()).await {
            Ok(task_id) => task_id,
            Err(e) => {
                self.results.forget(message.id());
                return Err(e);
            }
        };
        info!("Sent task {}", task_id);
        Ok(task_id)
    }

    /// Worker sharing this manager's broker, registry and results
    pub fn worker(&self, options: WorkerOptions) -> Worker {
        let worker = Worker::new(
            self.broker.clone(),
            self.registry.clone(),
            self.results.clone(),
            options,
        );
        self.workers.write().push(WorkerInfo {
            hostname: worker.hostname().to_string(),
            queues: worker.queues().to_vec(),
            concurrency: worker.stats().concurrency,
            started_at: Utc::now(),
        });
        worker
    }

    /// Worker built from the configured `worker_*` values
    pub fn default_worker(&self) -> Worker {
        self.worker(WorkerOptions::from_config(&self.config))
    }

    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.workers.read().clone()
    }

    pub fn result(&self, task_id: TaskId) -> Option<TaskResultRecord> {
        self.results.get(task_id)
    }

    /// Revoke a waiting task. Returns false when it already started.
    pub async fn revoke(&self, task_id: TaskId) -> QueueResult<bool> {
        let revoked = self.broker.revoke(task_id).await?;
        if let Some(message) = self.broker.get(task_id).await? {
            self.results.record(&message);
        }
        Ok(revoked)
    }

    /// Drop waiting tasks of the given queues, or of every queue
    pub async fn purge(&self, queues: Option<&[String]>) -> QueueResult<u64> {
        let count = self.broker.purge(queues).await?;
        info!("Purged {} waiting tasks", count);
        Ok(count)
    }

    pub async fn inspect(&self, method: InspectMethod, task_ids: &[TaskId]) -> QueueResult<Value> {
        let now = Utc::now();
        let value = match method {
            InspectMethod::Registered => json!(self.registry.task_names()),
            InspectMethod::Scheduled => {
                let mut waiting = self.broker.messages_by_state(TaskState::Pending, None).await?;
                waiting.extend(self.broker.messages_by_state(TaskState::Retry, None).await?);
                let scheduled: Vec<Value> = waiting
                    .iter()
                    .filter(|message| message.eta() > now)
                    .map(|message| json!({ "eta": message.eta(), "request": summary(message) }))
                    .collect();
                json!(scheduled)
            }
            InspectMethod::Reserved => {
                let mut waiting = self.broker.messages_by_state(TaskState::Pending, None).await?;
                waiting.extend(self.broker.messages_by_state(TaskState::Retry, None).await?);
                let reserved: Vec<Value> = waiting
                    .iter()
                    .filter(|message| message.is_ready(now))
                    .map(summary)
                    .collect();
                json!(reserved)
            }
            InspectMethod::Active => {
                let active = self.broker.messages_by_state(TaskState::Started, None).await?;
                json!(active.iter().map(summary).collect::<Vec<_>>())
            }
            InspectMethod::Revoked => {
                let revoked = self.broker.messages_by_state(TaskState::Revoked, None).await?;
                json!(revoked.iter().map(|message| message.id()).collect::<Vec<_>>())
            }
            InspectMethod::Stats => json!({
                "broker": self.broker.stats().await?,
                "queues": self.broker.queue_lengths().await?,
                "workers": self.workers(),
            }),
            InspectMethod::Ping => {
                let replies: Map<String, Value> = self
                    .workers()
                    .into_iter()
                    .map(|worker| (worker.hostname, json!({ "ok": "pong" })))
                    .collect();
                Value::Object(replies)
            }
            InspectMethod::Conf => serde_json::to_value(&self.config)?,
            InspectMethod::QueryTask => {
                if task_ids.is_empty() {
                    return Err(QueueError::InvalidArgument(
                        "query_task needs at least one task id".to_string(),
                    ));
                }
                let mut states = Map::new();
                for task_id in task_ids {
                    let state = match self.broker.get(*task_id).await? {
                        Some(message) => json!([message.state(), summary(&message)]),
                        None => Value::Null,
                    };
                    states.insert(task_id.to_string(), state);
                }
                Value::Object(states)
            }
        };
        Ok(value)
    }

    /// Broker counters, queue lengths and known workers
    pub async fn status(&self) -> QueueResult<Value> {
        Ok(json!({
            "stats": self.broker.stats().await?,
            "queues": self.broker.queue_lengths().await?,
            "workers": self.workers(),
            "beat_entries": self.beat.entries().len(),
        }))
    }
}

fn summary(message: &TaskMessage) -> Value {
    json!({
        "id": message.id(),
        "name": message.task(),
        "queue": message.queue(),
        "args": message.args(),
        "kwargs": message.kwargs(),
        "priority": message.priority(),
        "attempts": message.attempts(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfigBuilder;
    use async_trait::async_trait;
    use crate::TaskOutput;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Thumbnail {
        path: String,
    }

    #[async_trait]
    impl Task for Thumbnail {
        fn name() -> &'static str {
            "thumbnail"
        }

        async fn run(&self) -> TaskOutput {
            Ok(json!({ "thumbnail": format!("{}.thumb", self.path) }))
        }

        fn queue() -> Option<&'static str> {
            Some("images")
        }
    }

    fn manager() -> TaskQueueManager {
        let config = QueueConfigBuilder::testing().build().expect("Failed to build config");
        TaskQueueManager::new(config)
    }

    #[tokio::test]
    async fn test_delay_routes_to_declared_queue() {
        let manager = manager();
        manager.registry().register::<Thumbnail>();
        let task_id = manager.delay(Thumbnail { path: "a.png".into() }).await.unwrap();

        let message = manager.broker().get(task_id).await.unwrap().unwrap();
        assert_eq!(message.queue(), "images");
        assert_eq!(message.max_retries(), 3);
        assert_eq!(manager.result(task_id).unwrap().state, TaskState::Pending);

        let worker = manager.worker(WorkerOptions {
            queues: vec!["images".to_string()],
            ..Default::default()
        });
        assert_eq!(worker.process_next().await.unwrap(), Some(task_id));
        let record = manager.result(task_id).unwrap();
        assert!(record.is_successful());
        assert_eq!(record.result, Some(json!({ "thumbnail": "a.png.thumb" })));
    }

    #[tokio::test]
    async fn test_send_task_options() {
        let manager = manager();
        let options = CallOptions {
            queue: Some("reports".to_string()),
            countdown: Some(Duration::from_secs(30)),
            priority: Some(Priority::High),
            max_retries: Some(0),
            ..Default::default()
        };
        let task_id = manager
            .send_task("report", vec![json!(2024)], Map::new(), options)
            .await
            .unwrap();

        let message = manager.broker().get(task_id).await.unwrap().unwrap();
        assert_eq!(message.queue(), "reports");
        assert_eq!(message.priority(), Priority::High);
        assert_eq!(message.max_retries(), 0);
        assert!(!message.is_ready(Utc::now()));

        let scheduled = manager.inspect(InspectMethod::Scheduled, &[]).await.unwrap();
        assert_eq!(scheduled.as_array().unwrap().len(), 1);
        let reserved = manager.inspect(InspectMethod::Reserved, &[]).await.unwrap();
        assert!(reserved.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoke_updates_result() {
        let manager = manager();
        let task_id = manager
            .send_task("report", vec![], Map::new(), CallOptions::default())
            .await
            .unwrap();
        assert!(manager.revoke(task_id).await.unwrap());
        assert_eq!(manager.result(task_id).unwrap().state, TaskState::Revoked);

        let revoked = manager.inspect(InspectMethod::Revoked, &[]).await.unwrap();
        assert_eq!(revoked, json!([task_id]));
    }

    #[tokio::test]
    async fn test_inspect_queries() {
        let manager = manager();
        manager.registry().register::<Thumbnail>();
        let task_id = manager.delay(Thumbnail { path: "b.png".into() }).await.unwrap();
        manager.worker(WorkerOptions {
            hostname: Some("w1@host".to_string()),
            ..Default::default()
        });

        assert_eq!(
            manager.inspect(InspectMethod::Registered, &[]).await.unwrap(),
            json!(["thumbnail"])
        );
        assert_eq!(
            manager.inspect(InspectMethod::Ping, &[]).await.unwrap(),
            json!({ "w1@host": { "ok": "pong" } })
        );
        let query = manager.inspect(InspectMethod::QueryTask, &[task_id]).await.unwrap();
        assert_eq!(query[task_id.to_string()][0], json!("PENDING"));
        assert!(matches!(
            manager.inspect(InspectMethod::QueryTask, &[]).await,
            Err(QueueError::InvalidArgument(_))
        ));
        let conf = manager.inspect(InspectMethod::Conf, &[]).await.unwrap();
        assert_eq!(conf["worker_concurrency"], json!(1));
    }

    #[tokio::test]
    async fn test_purge_and_status() {
        let manager = manager();
        for _ in 0..3 {
            manager
                .send_task("report", vec![], Map::new(), CallOptions::default())
                .await
                .unwrap();
        }
        let status = manager.status().await.unwrap();
        assert_eq!(status["queues"]["default"], json!(3));

        assert_eq!(manager.purge(None).await.unwrap(), 3);
        let status = manager.status().await.unwrap();
        assert_eq!(status["stats"]["pending"], json!(0));
    }

    #[test]
    fn test_from_store() {
        let store = ConfigStore::from_yaml_str("task_queue:\n  default_queue: main\n").unwrap();
        let manager = TaskQueueManager::from_store(&store).unwrap();
        assert_eq!(manager.config().default_queue, "main");
    }
}
