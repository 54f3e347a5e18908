//! Task results backend

use crate::{TaskId, TaskMessage, TaskState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a task as seen by `result` queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResultRecord {
    pub task_id: TaskId,
    pub task: String,
    pub state: TaskState,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub date_done: Option<DateTime<Utc>>,
}

impl TaskResultRecord {
    /// Record mirroring the current state of `message`
    pub fn from_message(message: &TaskMessage) -> Self {
        let date_done = message.state().is_ready().then(Utc::now);
        Self {
            task_id: message.id(),
            task: message.task().to_string(),
            state: message.state(),
            result: None,
            error: message.last_error().map(str::to_string),
            attempts: message.attempts(),
            date_done,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.state == TaskState::Success
    }

    pub fn is_failed(&self) -> bool {
        self.state == TaskState::Failure
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }
}

/// In-memory results backend
#[derive(Debug, Default)]
pub struct ResultStore {
    records: DashMap<TaskId, TaskResultRecord>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state of a message, keeping any earlier result value
    pub fn record(&self, message: &TaskMessage) {
        let mut record = TaskResultRecord::from_message(message);
        if let Some(previous) = self.records.get(&message.id()) {
            record.result = previous.result.clone();
        }
        self.records.insert(message.id(), record);
    }

    pub fn record_success(&self, message: &TaskMessage, result: Value) {
        let mut record = TaskResultRecord::from_message(message);
        record.result = Some(result);
        self.records.insert(message.id(), record);
    }

    pub fn get(&self, task_id: TaskId) -> Option<TaskResultRecord> {
        self.records.get(&task_id).map(|record| record.clone())
    }

    /// Drop a stored result. Returns whether one existed.
    pub fn forget(&self, task_id: TaskId) -> bool {
        self.records.remove(&task_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_pending_record_is_not_ready() {
        let store = ResultStore::new();
        let message = TaskMessage::new("add", "default", vec![], Map::new());
        store.record(&message);

        let record = store.get(message.id()).unwrap();
        assert_eq!(record.state, TaskState::Pending);
        assert!(!record.is_ready());
        assert!(record.date_done.is_none());
    }

    #[test]
    fn test_success_keeps_result() {
        let store = ResultStore::new();
        let mut message = TaskMessage::new("add", "default", vec![], Map::new());
        message.mark_started();
        message.mark_succeeded();
        store.record_success(&message, json!(5));

        let record = store.get(message.id()).unwrap();
        assert!(record.is_successful());
        assert_eq!(record.result, Some(json!(5)));
        assert!(record.date_done.is_some());

        assert!(store.forget(message.id()));
        assert!(store.is_empty());
    }
}
