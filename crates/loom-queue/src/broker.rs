//! Message broker and its in-memory implementation

use crate::{QueueError, QueueResult, TaskId, TaskMessage, TaskState};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub started: u64,
    pub succeeded: u64,
    pub retrying: u64,
    pub failed: u64,
    pub revoked: u64,
    pub total: u64,
}

impl QueueStats {
    fn counter(&mut self, state: TaskState) -> &mut u64 {
        match state {
            TaskState::Pending => &mut self.pending,
            TaskState::Started => &mut self.started,
            TaskState::Success => &mut self.succeeded,
            TaskState::Retry => &mut self.retrying,
            TaskState::Failure => &mut self.failed,
            TaskState::Revoked => &mut self.revoked,
        }
    }
}

/// Broker trait that queue transports implement
#[async_trait]
pub trait Broker: Send + Sync {
    /// Store a message and route it to its queue
    async fn publish(&self, message: TaskMessage) -> QueueResult<TaskId>;

    /// Take the next ready message from any of `queues`, marking it started
    async fn consume(&self, queues: &[String]) -> QueueResult<Option<TaskMessage>>;

    /// Mark a started message as succeeded
    async fn ack(&self, task_id: TaskId) -> QueueResult<TaskMessage>;

    /// Record a failure; the message is requeued while retries remain
    async fn nack(&self, task_id: TaskId, error: String, backoff: Duration) -> QueueResult<TaskMessage>;

    /// Mark a message as failed without retrying it
    async fn fail(&self, task_id: TaskId, error: String) -> QueueResult<TaskMessage>;

    async fn get(&self, task_id: TaskId) -> QueueResult<Option<TaskMessage>>;

    /// Messages in a given state, oldest first
    async fn messages_by_state(&self, state: TaskState, limit: Option<usize>) -> QueueResult<Vec<TaskMessage>>;

    /// Revoke a waiting message. Returns false when it already started or finished.
    async fn revoke(&self, task_id: TaskId) -> QueueResult<bool>;

    /// Drop waiting messages of the given queues, or of every queue
    async fn purge(&self, queues: Option<&[String]>) -> QueueResult<u64>;

    /// Waiting messages per queue
    async fn queue_lengths(&self) -> QueueResult<BTreeMap<String, u64>>;

    async fn stats(&self) -> QueueResult<QueueStats>;
}

/// Wrapper for TaskMessage to implement Ord for the priority queue
#[derive(Debug, Clone)]
struct QueuedMessage {
    message: TaskMessage,
    enqueue_time: Instant,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier eta, then earlier enqueue time
        match self.message.priority().cmp(&other.message.priority()) {
            Ordering::Equal => match other.message.eta().cmp(&self.message.eta()) {
                Ordering::Equal => other.enqueue_time.cmp(&self.enqueue_time),
                other_ord => other_ord,
            },
            priority_ord => priority_ord,
        }
    }
}

/// In-memory broker
///
/// Every message lives in one map; each named queue keeps a heap of
/// waiting messages. Heap entries whose message moved on are discarded
/// lazily when they reach the top.
pub struct MemoryBroker {
    max_queue_size: usize,
    messages: DashMap<TaskId, TaskMessage>,
    queues: RwLock<HashMap<String, BinaryHeap<QueuedMessage>>>,
    stats: RwLock<QueueStats>,
}

impl MemoryBroker {
    /// `max_queue_size` of 0 means unlimited
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            max_queue_size,
            messages: DashMap::new(),
            queues: RwLock::new(HashMap::new()),
            stats: RwLock::new(QueueStats::default()),
        }
    }

    /// Update statistics based on state changes
    fn update_stats(&self, old_state: Option<TaskState>, new_state: TaskState) {
        let mut stats = self.stats.write();
        match old_state {
            Some(old) => {
                let counter = stats.counter(old);
                *counter = counter.saturating_sub(1);
            }
            None => stats.total += 1,
        }
        *stats.counter(new_state) += 1;
    }

    fn push(&self, message: TaskMessage) {
        let queued = QueuedMessage {
            message,
            enqueue_time: Instant::now(),
        };
        self.queues
            .write()
            .entry(queued.message.queue().to_string())
            .or_default()
            .push(queued);
    }

    /// Whether the stored message is still waiting with the same eta the
    /// heap entry was pushed with.
    fn is_current(&self, queued: &QueuedMessage) -> bool {
        self.messages.get(&queued.message.id()).map_or(false, |stored| {
            matches!(stored.state(), TaskState::Pending | TaskState::Retry) && stored.eta() == queued.message.eta()
        })
    }

    /// Pop the next ready message of one queue
    fn next_ready(&self, heap: &mut BinaryHeap<QueuedMessage>) -> Option<TaskId> {
        let now = Utc::now();
        let mut delayed = Vec::new();
        let mut found = None;

        while let Some(queued) = heap.pop() {
            if !self.is_current(&queued) {
                continue;
            }
            if queued.message.is_ready(now) {
                found = Some(queued.message.id());
                break;
            }
            delayed.push(queued);
        }

        heap.extend(delayed);
        found
    }

    /// Best ready message across `queues`; runners-up go back to their heaps
    fn best_candidate(&self, queues: &[String]) -> Option<TaskId> {
        let mut candidates = Vec::new();
        {
            let mut heaps = self.queues.write();
            for queue in queues {
                if let Some(heap) = heaps.get_mut(queue) {
                    if let Some(task_id) = self.next_ready(heap) {
                        candidates.push(task_id);
                    }
                }
            }
        }

        let mut best: Option<TaskMessage> = None;
        for task_id in candidates {
            let Some(message) = self.messages.get(&task_id).map(|m| m.clone()) else {
                continue;
            };
            match &best {
                Some(current) if current.priority() >= message.priority() => self.push(message),
                _ => {
                    if let Some(previous) = best.replace(message) {
                        self.push(previous);
                    }
                }
            }
        }
        best.map(|message| message.id())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, message: TaskMessage) -> QueueResult<TaskId> {
        let task_id = message.id();

        if self.max_queue_size > 0 && self.messages.len() >= self.max_queue_size {
            return Err(QueueError::Broker(format!(
                "Queue size limit exceeded: {}",
                self.max_queue_size
            )));
        }

        self.update_stats(None, message.state());
        if matches!(message.state(), TaskState::Pending | TaskState::Retry) {
            self.push(message.clone());
        }
        self.messages.insert(task_id, message);
        Ok(task_id)
    }

    async fn consume(&self, queues: &[String]) -> QueueResult<Option<TaskMessage>> {
        loop {
            let Some(task_id) = self.best_candidate(queues) else {
                return Ok(None);
            };
            let Some(mut stored) = self.messages.get_mut(&task_id) else {
                continue;
            };

            let old_state = stored.state();
            if stored.is_expired(Utc::now()) {
                stored.mark_revoked();
                drop(stored);
                self.update_stats(Some(old_state), TaskState::Revoked);
                tracing::debug!(task_id = %task_id, "dropped expired task");
                continue;
            }

            stored.mark_started();
            let started = stored.clone();
            drop(stored);
            self.update_stats(Some(old_state), TaskState::Started);
            return Ok(Some(started));
        }
    }

    async fn ack(&self, task_id: TaskId) -> QueueResult<TaskMessage> {
        let mut stored = self
            .messages
            .get_mut(&task_id)
            .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()))?;
        let old_state = stored.state();
        stored.mark_succeeded();
        let message = stored.clone();
        drop(stored);
        self.update_stats(Some(old_state), TaskState::Success);
        Ok(message)
    }

    async fn nack(&self, task_id: TaskId, error: String, backoff: Duration) -> QueueResult<TaskMessage> {
        let mut stored = self
            .messages
            .get_mut(&task_id)
            .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()))?;
        let old_state = stored.state();
        stored.mark_failed(error, backoff);
        let message = stored.clone();
        drop(stored);

        self.update_stats(Some(old_state), message.state());
        // Re-queue for retry if not dead
        if message.state() == TaskState::Retry {
            self.push(message.clone());
        }
        Ok(message)
    }

    async fn fail(&self, task_id: TaskId, error: String) -> QueueResult<TaskMessage> {
        let mut stored = self
            .messages
            .get_mut(&task_id)
            .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()))?;
        let old_state = stored.state();
        stored.mark_dead(error);
        let message = stored.clone();
        drop(stored);
        self.update_stats(Some(old_state), TaskState::Failure);
        Ok(message)
    }

    async fn get(&self, task_id: TaskId) -> QueueResult<Option<TaskMessage>> {
        Ok(self.messages.get(&task_id).map(|message| message.clone()))
    }

    async fn messages_by_state(&self, state: TaskState, limit: Option<usize>) -> QueueResult<Vec<TaskMessage>> {
        let mut messages: Vec<TaskMessage> = self
            .messages
            .iter()
            .filter(|message| message.state() == state)
            .map(|message| message.clone())
            .collect();

        // Sort by created_at for consistent ordering
        messages.sort_by_key(|message| message.created_at());
        if let Some(limit) = limit {
            messages.truncate(limit);
        }
        Ok(messages)
    }

    async fn revoke(&self, task_id: TaskId) -> QueueResult<bool> {
        let Some(mut stored) = self.messages.get_mut(&task_id) else {
            return Err(QueueError::TaskNotFound(task_id.to_string()));
        };
        let old_state = stored.state();
        if !matches!(old_state, TaskState::Pending | TaskState::Retry) {
            return Ok(false);
        }
        stored.mark_revoked();
        drop(stored);
        self.update_stats(Some(old_state), TaskState::Revoked);
        Ok(true)
    }

    async fn purge(&self, queues: Option<&[String]>) -> QueueResult<u64> {
        let mut count = 0u64;
        let mut stats = self.stats.write();
        self.messages.retain(|_, message| {
            let waiting = matches!(message.state(), TaskState::Pending | TaskState::Retry);
            let selected = queues.map_or(true, |queues| queues.iter().any(|q| q == message.queue()));
            if waiting && selected {
                count += 1;
                let counter = stats.counter(message.state());
                *counter = counter.saturating_sub(1);
                false
            } else {
                true
            }
        });
        stats.total = stats.total.saturating_sub(count);
        drop(stats);

        let mut heaps = self.queues.write();
        match queues {
            Some(queues) => {
                for queue in queues {
                    heaps.remove(queue);
                }
            }
            None => heaps.clear(),
        }
        Ok(count)
    }

    async fn queue_lengths(&self) -> QueueResult<BTreeMap<String, u64>> {
        let mut lengths = BTreeMap::new();
        for message in self.messages.iter() {
            if matches!(message.state(), TaskState::Pending | TaskState::Retry) {
                *lengths.entry(message.queue().to_string()).or_insert(0) += 1;
            }
        }
        Ok(lengths)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        Ok(self.stats.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Priority;
    use serde_json::Map;

    fn message(queue: &str, priority: Priority) -> TaskMessage {
        TaskMessage::new("test", queue, vec![], Map::new()).with_priority(priority)
    }

    fn queues(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn test_memory_broker_basic_operations() {
        let broker = MemoryBroker::default();
        let task_id = broker.publish(message("default", Priority::Normal)).await.unwrap();

        let stats = broker.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total, 1);

        let consumed = broker.consume(&queues(&["default"])).await.unwrap().unwrap();
        assert_eq!(consumed.id(), task_id);
        assert_eq!(consumed.state(), TaskState::Started);

        broker.ack(task_id).await.unwrap();
        let stats = broker.stats().await.unwrap();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.started, 0);
        assert_eq!(stats.pending, 0);
        assert!(broker.consume(&queues(&["default"])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_priority_ordering_across_queues() {
        let broker = MemoryBroker::default();
        broker.publish(message("a", Priority::Low)).await.unwrap();
        broker.publish(message("b", Priority::High)).await.unwrap();
        broker.publish(message("a", Priority::Normal)).await.unwrap();

        let subscribed = queues(&["a", "b"]);
        let order: Vec<Priority> = vec![
            broker.consume(&subscribed).await.unwrap().unwrap().priority(),
            broker.consume(&subscribed).await.unwrap().unwrap().priority(),
            broker.consume(&subscribed).await.unwrap().unwrap().priority(),
        ];
        assert_eq!(order, vec![Priority::High, Priority::Normal, Priority::Low]);
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let broker = MemoryBroker::default();
        broker.publish(message("emails", Priority::Normal)).await.unwrap();
        assert!(broker.consume(&queues(&["default"])).await.unwrap().is_none());
        assert!(broker.consume(&queues(&["emails"])).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delayed_message_waits() {
        let broker = MemoryBroker::default();
        let delayed = message("default", Priority::Critical)
            .with_countdown(Duration::from_secs(60))
            .unwrap();
        broker.publish(delayed).await.unwrap();
        let ready_id = broker.publish(message("default", Priority::Low)).await.unwrap();

        let consumed = broker.consume(&queues(&["default"])).await.unwrap().unwrap();
        assert_eq!(consumed.id(), ready_id);
        assert!(broker.consume(&queues(&["default"])).await.unwrap().is_none());
        assert_eq!(broker.queue_lengths().await.unwrap()["default"], 1);
    }

    #[tokio::test]
    async fn test_nack_requeues_until_retries_exhausted() {
        let broker = MemoryBroker::default();
        let task_id = broker
            .publish(message("default", Priority::Normal).with_max_retries(1))
            .await
            .unwrap();
        let subscribed = queues(&["default"]);

        broker.consume(&subscribed).await.unwrap().unwrap();
        let retried = broker.nack(task_id, "boom".into(), Duration::ZERO).await.unwrap();
        assert_eq!(retried.state(), TaskState::Retry);

        broker.consume(&subscribed).await.unwrap().unwrap();
        let failed = broker.nack(task_id, "boom".into(), Duration::ZERO).await.unwrap();
        assert_eq!(failed.state(), TaskState::Failure);
        assert!(broker.consume(&subscribed).await.unwrap().is_none());
        assert_eq!(broker.stats().await.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn test_fail_skips_retries() {
        let broker = MemoryBroker::default();
        let task_id = broker.publish(message("default", Priority::Normal)).await.unwrap();
        broker.consume(&queues(&["default"])).await.unwrap().unwrap();

        let failed = broker.fail(task_id, "unregistered".into()).await.unwrap();
        assert_eq!(failed.state(), TaskState::Failure);
        assert_eq!(failed.attempts(), 1);
        assert!(broker.consume(&queues(&["default"])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_and_purge() {
        let broker = MemoryBroker::default();
        let revoked = broker.publish(message("a", Priority::Normal)).await.unwrap();
        broker.publish(message("a", Priority::Normal)).await.unwrap();
        broker.publish(message("b", Priority::Normal)).await.unwrap();

        assert!(broker.revoke(revoked).await.unwrap());
        assert!(!broker.revoke(revoked).await.unwrap());
        assert_eq!(broker.purge(Some(&queues(&["a"]))).await.unwrap(), 1);
        assert_eq!(broker.queue_lengths().await.unwrap().get("a"), None);
        assert_eq!(broker.purge(None).await.unwrap(), 1);

        let stats = broker.stats().await.unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.revoked, 1);
        assert_eq!(stats.total, 1);
        assert!(broker.consume(&queues(&["a", "b"])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_messages_are_skipped() {
        let broker = MemoryBroker::default();
        let expired = broker
            .publish(message("default", Priority::High).with_expires(Utc::now() - chrono::Duration::seconds(1)))
            .await
            .unwrap();
        let live = broker.publish(message("default", Priority::Low)).await.unwrap();

        let consumed = broker.consume(&queues(&["default"])).await.unwrap().unwrap();
        assert_eq!(consumed.id(), live);
        assert_eq!(broker.get(expired).await.unwrap().unwrap().state(), TaskState::Revoked);
    }

    #[tokio::test]
    async fn test_queue_size_limit() {
        let broker = MemoryBroker::new(1);
        broker.publish(message("default", Priority::Normal)).await.unwrap();
        assert!(matches!(
            broker.publish(message("default", Priority::Normal)).await,
            Err(QueueError::Broker(_))
        ));
    }
}
