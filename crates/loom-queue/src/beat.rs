//! Periodic task scheduling with cron expressions

use crate::{Broker, Priority, QueueError, QueueResult, TaskId, TaskMessage, TaskRegistry};
use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Cron expression wrapper with validation
#[derive(Debug, Clone, Serialize)]
pub struct CronExpression {
    expression: String,
    #[serde(skip)]
    schedule: Option<Schedule>,
}

impl CronExpression {
    /// Create a new cron expression from a string
    ///
    /// Supports the 6-field cron format with seconds:
    /// - `0 * * * * *` (every minute)
    /// - `0 0 0 * * *` (daily at midnight)
    /// - `0 0 9-17 * * Mon-Fri` (weekdays 9-5)
    pub fn new(expression: &str) -> QueueResult<Self> {
        let schedule = Schedule::from_str(expression)
            .map_err(|e| QueueError::InvalidCron(format!("{}: {}", expression, e)))?;

        Ok(CronExpression {
            expression: expression.to_string(),
            schedule: Some(schedule),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Get the next run time after the given datetime
    pub fn next_run_time(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.as_ref()?.after(&after).next()
    }
}

impl<'de> Deserialize<'de> for CronExpression {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CronExpressionData {
            expression: String,
        }

        let data = CronExpressionData::deserialize(deserializer)?;
        CronExpression::new(&data.expression).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

/// A task enqueued on a cron schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatEntry {
    pub name: String,
    pub cron: CronExpression,
    pub task: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

fn enabled_by_default() -> bool {
    true
}

impl BeatEntry {
    pub fn new(name: impl Into<String>, cron_expr: &str, task: impl Into<String>) -> QueueResult<Self> {
        let cron = CronExpression::new(cron_expr)?;
        let next_run = cron.next_run_time(Utc::now());
        Ok(Self {
            name: name.into(),
            cron,
            task: task.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            queue: None,
            priority: Priority::default(),
            enabled: true,
            next_run,
            last_run: None,
        })
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run.map_or(false, |next_run| next_run <= now)
    }

    fn mark_executed(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
        self.next_run = self.cron.next_run_time(now);
    }
}

/// Beat scheduler publishing due entries to the broker
pub struct Beat {
    broker: Arc<dyn Broker>,
    registry: Arc<TaskRegistry>,
    default_queue: String,
    tick_interval: Duration,
    entries: RwLock<BTreeMap<String, BeatEntry>>,
}

impl Beat {
    pub fn new(
        broker: Arc<dyn Broker>,
        registry: Arc<TaskRegistry>,
        default_queue: impl Into<String>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            broker,
            registry,
            default_queue: default_queue.into(),
            tick_interval,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add an entry. An existing entry of the same name is only replaced
    /// when `replace` is set.
    pub fn add_entry(&self, entry: BeatEntry, replace: bool) -> QueueResult<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&entry.name) && !replace {
            return Err(QueueError::DuplicateBeatEntry(entry.name));
        }
        info!("Added beat entry {} ({})", entry.name, entry.cron.expression());
        entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn remove_entry(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    pub fn get_entry(&self, name: &str) -> Option<BeatEntry> {
        self.entries.read().get(name).cloned()
    }

    /// Entries sorted by name
    pub fn entries(&self) -> Vec<BeatEntry> {
        self.entries.read().values().cloned().collect()
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.entries.write().get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Publish every entry due at `now`. Returns the ids of the published
    /// tasks.
    pub async fn tick(&self, now: DateTime<Utc>) -> QueueResult<Vec<TaskId>> {
        let due: Vec<BeatEntry> = {
            let mut entries = self.entries.write();
            entries
                .values_mut()
                .filter(|entry| entry.is_due(now))
                .map(|entry| {
                    entry.mark_executed(now);
                    entry.clone()
                })
                .collect()
        };

        let mut published = Vec::with_capacity(due.len());
        for entry in due {
            let queue = entry
                .queue
                .clone()
                .or_else(|| self.registry.route(&entry.task))
                .unwrap_or_else(|| self.default_queue.clone());
            let mut message = TaskMessage::new(entry.task.clone(), queue, entry.args.clone(), entry.kwargs.clone())
                .with_priority(entry.priority);
            if let Some(max_retries) = self.registry.max_retries(&entry.task) {
                message = message.with_max_retries(max_retries);
            }
            let task_id = self.broker.publish(message).await?;
            debug!("Beat entry {} published task {}", entry.name, task_id);
            published.push(task_id);
        }
        Ok(published)
    }

    /// Tick until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> QueueResult<()> {
        info!("Starting beat with {} entries", self.entries.read().len());
        let mut ticker = interval(self.tick_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!("Failed to publish scheduled tasks: {}", e);
                    }
                }
            }
        }
        info!("Beat stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryBroker, TaskState};
    use serde_json::json;

    fn beat() -> (Arc<MemoryBroker>, Beat) {
        let broker = Arc::new(MemoryBroker::default());
        let beat = Beat::new(broker.clone(), Arc::new(TaskRegistry::new()), "default", Duration::from_millis(5));
        (broker, beat)
    }

    #[test]
    fn test_cron_expression() {
        let cron = CronExpression::new("0 * * * * *").unwrap();
        let now = Utc::now();
        let next = cron.next_run_time(now).unwrap();
        assert!(next > now);
        assert!(next - now <= chrono::Duration::seconds(60));
        assert!(matches!(CronExpression::new("whenever"), Err(QueueError::InvalidCron(_))));
    }

    #[test]
    fn test_cron_expression_deserializes_and_validates() {
        let entry: BeatEntry = serde_json::from_value(json!({
            "name": "cleanup",
            "cron": { "expression": "0 0 * * * *" },
            "task": "cleanup",
        }))
        .unwrap();
        assert!(entry.enabled);
        assert_eq!(entry.cron.expression(), "0 0 * * * *");

        let invalid = serde_json::from_value::<BeatEntry>(json!({
            "name": "cleanup",
            "cron": { "expression": "nope" },
            "task": "cleanup",
        }));
        assert!(invalid.is_err());
    }

    #[test]
    fn test_duplicate_entries() {
        let (_, beat) = beat();
        beat.add_entry(BeatEntry::new("report", "0 * * * * *", "report").unwrap(), false)
            .unwrap();
        let err = beat
            .add_entry(BeatEntry::new("report", "0 0 * * * *", "report").unwrap(), false)
            .unwrap_err();
        assert!(matches!(err, QueueError::DuplicateBeatEntry(name) if name == "report"));

        beat.add_entry(BeatEntry::new("report", "0 0 * * * *", "report").unwrap(), true)
            .unwrap();
        assert_eq!(beat.get_entry("report").unwrap().cron.expression(), "0 0 * * * *");
        assert!(beat.remove_entry("report"));
        assert!(beat.entries().is_empty());
    }

    #[tokio::test]
    async fn test_tick_publishes_due_entries_once() {
        let (broker, beat) = beat();
        beat.add_entry(
            BeatEntry::new("report", "0 * * * * *", "report")
                .unwrap()
                .with_args(vec![json!("daily")])
                .with_queue("reports"),
            false,
        )
        .unwrap();
        beat.add_entry(BeatEntry::new("idle", "0 0 0 1 1 *", "idle").unwrap(), false)
            .unwrap();

        assert!(beat.tick(Utc::now()).await.unwrap().is_empty());

        let later = Utc::now() + chrono::Duration::minutes(2);
        let published = beat.tick(later).await.unwrap();
        assert_eq!(published.len(), 1);
        let message = broker.get(published[0]).await.unwrap().unwrap();
        assert_eq!(message.task(), "report");
        assert_eq!(message.queue(), "reports");
        assert_eq!(message.state(), TaskState::Pending);

        assert!(beat.tick(later).await.unwrap().is_empty());
        let entry = beat.get_entry("report").unwrap();
        assert_eq!(entry.last_run, Some(later));
        assert!(entry.next_run.unwrap() > later);
    }

    #[tokio::test]
    async fn test_disabled_entries_are_skipped() {
        let (_, beat) = beat();
        beat.add_entry(BeatEntry::new("report", "0 * * * * *", "report").unwrap(), false)
            .unwrap();
        assert!(beat.set_enabled("report", false));
        assert!(!beat.set_enabled("missing", false));
        let later = Utc::now() + chrono::Duration::minutes(2);
        assert!(beat.tick(later).await.unwrap().is_empty());
    }
}
