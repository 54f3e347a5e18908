//! Worker implementation for processing tasks from the broker

use crate::{Broker, QueueConfig, QueueError, QueueResult, ResultStore, TaskId, TaskMessage, TaskRegistry};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Options of a single worker
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub concurrency: usize,
    pub hostname: Option<String>,
    /// Queues to consume; empty means the configured default queue
    pub queues: Vec<String>,
    pub poll_interval: Duration,
    pub task_timeout: Duration,
    pub retry_backoff: Duration,
}

impl WorkerOptions {
    pub fn from_config(config: &QueueConfig) -> Self {
        // Autoscaling workers are sized for their maximum
        let concurrency = config
            .worker_autoscale
            .as_ref()
            .and_then(|autoscale| autoscale.first().copied())
            .unwrap_or(config.worker_concurrency);

        Self {
            concurrency,
            hostname: config.worker_hostname.clone(),
            queues: config.effective_worker_queues(),
            poll_interval: config.poll_interval(),
            task_timeout: config.task_timeout(),
            retry_backoff: config.retry_backoff(),
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// Worker statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub hostname: String,
    pub queues: Vec<String>,
    pub concurrency: usize,
    pub active: usize,
    pub processed: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub failed: u64,
    pub registered_tasks: Vec<String>,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

/// Shared by the worker loop and the tasks it spawns
struct Executor {
    broker: Arc<dyn Broker>,
    registry: Arc<TaskRegistry>,
    results: Arc<ResultStore>,
    task_timeout: Duration,
    retry_backoff: Duration,
    counters: Counters,
}

impl Executor {
    /// Run one started message and report its outcome to the broker
    async fn execute(&self, message: TaskMessage) -> QueueResult<()> {
        let task_id = message.id();
        let task = message.task().to_string();
        self.results.record(&message);
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        let Some(handler) = self.registry.get_handler(&task) else {
            error!("No handler registered for task: {}", task);
            let failed = self
                .broker
                .fail(task_id, QueueError::UnregisteredTask(task).to_string())
                .await?;
            self.results.record(&failed);
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        debug!("Processing task {} of type {}", task_id, task);
        let outcome = match timeout(self.task_timeout, handler(message)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => {
                error!("Task {} timed out after {:?}", task_id, self.task_timeout);
                Err(QueueError::Timeout.to_string())
            }
        };

        match outcome {
            Ok(value) => {
                info!("Task {} completed successfully", task_id);
                let done = self.broker.ack(task_id).await?;
                self.results.record_success(&done, value);
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Task {} failed: {}", task_id, e);
                let failed = self.broker.nack(task_id, e, self.retry_backoff).await?;
                self.results.record(&failed);
                if failed.state().is_ready() {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.retried.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }
}

/// Worker consuming tasks from a set of queues
pub struct Worker {
    hostname: String,
    options: WorkerOptions,
    executor: Arc<Executor>,
    concurrency_limiter: Arc<Semaphore>,
}

impl Worker {
    pub fn new(
        broker: Arc<dyn Broker>,
        registry: Arc<TaskRegistry>,
        results: Arc<ResultStore>,
        options: WorkerOptions,
    ) -> Self {
        let hostname = options.hostname.clone().unwrap_or_else(default_hostname);
        let concurrency_limiter = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let executor = Arc::new(Executor {
            broker,
            registry,
            results,
            task_timeout: options.task_timeout,
            retry_backoff: options.retry_backoff,
            counters: Counters::default(),
        });

        Self {
            hostname,
            options,
            executor,
            concurrency_limiter,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn queues(&self) -> &[String] {
        &self.options.queues
    }

    /// Consume and run one task in place. Returns the id of the task that
    /// ran, or `None` when no task was ready.
    pub async fn process_next(&self) -> QueueResult<Option<TaskId>> {
        let Some(message) = self.executor.broker.consume(&self.options.queues).await? else {
            return Ok(None);
        };
        let task_id = message.id();
        self.executor.execute(message).await?;
        Ok(Some(task_id))
    }

    /// Run until no task is ready. Returns the number of tasks that ran.
    pub async fn drain(&self) -> QueueResult<usize> {
        let mut count = 0;
        while self.process_next().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Poll the broker until `shutdown` is cancelled, then wait for the
    /// running tasks.
    pub async fn run(&self, shutdown: CancellationToken) -> QueueResult<()> {
        info!(
            "Starting worker {} on queues {:?} with {} max concurrent tasks",
            self.hostname, self.options.queues, self.options.concurrency
        );

        let mut poll_interval = interval(self.options.poll_interval.max(Duration::from_millis(1)));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping new task processing");
                    break;
                }
                _ = poll_interval.tick() => {
                    self.dispatch_ready().await;
                }
            }
        }

        let active = self.active();
        info!("Waiting for {} active tasks to complete", active);
        let permits = self.options.concurrency.max(1) as u32;
        if self.concurrency_limiter.acquire_many(permits).await.is_err() {
            warn!("Worker semaphore closed before active tasks finished");
        }
        info!("Worker {} shutdown complete", self.hostname);
        Ok(())
    }

    /// Hand every ready task to a free slot
    async fn dispatch_ready(&self) {
        loop {
            let Ok(permit) = self.concurrency_limiter.clone().try_acquire_owned() else {
                debug!("No available worker slots");
                return;
            };

            let message = match self.executor.broker.consume(&self.options.queues).await {
                Ok(Some(message)) => message,
                Ok(None) => return,
                Err(e) => {
                    error!("Failed to consume task: {}", e);
                    return;
                }
            };

            let executor = self.executor.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let task_id = message.id();
                if let Err(e) = executor.execute(message).await {
                    error!("Failed to record outcome of task {}: {}", task_id, e);
                }
            });
        }
    }

    fn active(&self) -> usize {
        self.options
            .concurrency
            .max(1)
            .saturating_sub(self.concurrency_limiter.available_permits())
    }

    pub fn stats(&self) -> WorkerStats {
        let counters = &self.executor.counters;
        WorkerStats {
            hostname: self.hostname.clone(),
            queues: self.options.queues.clone(),
            concurrency: self.options.concurrency,
            active: self.active(),
            processed: counters.processed.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            retried: counters.retried.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            registered_tasks: self.executor.registry.task_names(),
        }
    }
}

fn default_hostname() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("loom@{}", host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryBroker, TaskState};
    use serde_json::{json, Map, Value};
    use std::sync::atomic::AtomicU32;

    struct Fixture {
        broker: Arc<MemoryBroker>,
        registry: Arc<TaskRegistry>,
        results: Arc<ResultStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                broker: Arc::new(MemoryBroker::default()),
                registry: Arc::new(TaskRegistry::new()),
                results: Arc::new(ResultStore::new()),
            }
        }

        fn worker(&self, options: WorkerOptions) -> Worker {
            Worker::new(self.broker.clone(), self.registry.clone(), self.results.clone(), options)
        }
    }

    fn options() -> WorkerOptions {
        WorkerOptions {
            concurrency: 2,
            hostname: Some("test@worker".to_string()),
            queues: vec!["default".to_string()],
            poll_interval: Duration::from_millis(5),
            task_timeout: Duration::from_millis(200),
            retry_backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_process_next_records_success() {
        let fixture = Fixture::new();
        fixture.registry.register_fn("add", |args: Vec<Value>, _| async move {
            Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
        });
        let task_id = fixture
            .broker
            .publish(TaskMessage::new("add", "default", vec![json!(1), json!(2)], Map::new()))
            .await
            .unwrap();

        let worker = fixture.worker(options());
        assert_eq!(worker.process_next().await.unwrap(), Some(task_id));
        assert_eq!(worker.process_next().await.unwrap(), None);

        let record = fixture.results.get(task_id).unwrap();
        assert!(record.is_successful());
        assert_eq!(record.result, Some(json!(3)));
        assert_eq!(worker.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn test_failing_task_is_retried_then_failed() {
        let fixture = Fixture::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        fixture.registry.register_fn("flaky", move |_, _| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::Relaxed);
                let output: crate::TaskOutput = Err("always broken".into());
                output
            }
        });
        let task_id = fixture
            .broker
            .publish(TaskMessage::new("flaky", "default", vec![], Map::new()).with_max_retries(2))
            .await
            .unwrap();

        let worker = fixture.worker(options());
        assert_eq!(worker.drain().await.unwrap(), 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);

        let record = fixture.results.get(task_id).unwrap();
        assert!(record.is_failed());
        assert_eq!(record.error.as_deref(), Some("always broken"));
        let stats = worker.stats();
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_unregistered_task_fails_without_retry() {
        let fixture = Fixture::new();
        let task_id = fixture
            .broker
            .publish(TaskMessage::new("ghost", "default", vec![], Map::new()))
            .await
            .unwrap();

        let worker = fixture.worker(options());
        assert_eq!(worker.drain().await.unwrap(), 1);
        let message = fixture.broker.get(task_id).await.unwrap().unwrap();
        assert_eq!(message.state(), TaskState::Failure);
        assert!(message.last_error().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let fixture = Fixture::new();
        fixture.registry.register_fn("slow", |_, _| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        });
        let task_id = fixture
            .broker
            .publish(TaskMessage::new("slow", "default", vec![], Map::new()).with_max_retries(0))
            .await
            .unwrap();

        let mut opts = options();
        opts.task_timeout = Duration::from_millis(10);
        fixture.worker(opts).process_next().await.unwrap();

        let record = fixture.results.get(task_id).unwrap();
        assert_eq!(record.state, TaskState::Failure);
        assert_eq!(record.error.as_deref(), Some("Timeout error"));
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let fixture = Fixture::new();
        fixture.registry.register_fn("noop", |_, _| async move { Ok(Value::Null) });
        for _ in 0..5 {
            fixture
                .broker
                .publish(TaskMessage::new("noop", "default", vec![], Map::new()))
                .await
                .unwrap();
        }

        let worker = Arc::new(fixture.worker(options()));
        let shutdown = CancellationToken::new();
        let handle = {
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        };

        for _ in 0..100 {
            if worker.stats().succeeded == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        let stats = worker.stats();
        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.hostname, "test@worker");
    }

    #[test]
    fn test_options_follow_autoscale() {
        let mut config = QueueConfig::default();
        config.worker_autoscale = Some(vec![10, 2]);
        assert_eq!(WorkerOptions::from_config(&config).concurrency, 10);
        assert_eq!(WorkerOptions::default().queues, vec!["default".to_string()]);
    }
}
