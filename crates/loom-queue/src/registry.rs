//! Registry of task handlers by task name

use crate::{Task, TaskMessage, TaskOutput};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Task handler function type
pub type TaskHandler = Arc<dyn Fn(TaskMessage) -> BoxFuture<'static, TaskOutput> + Send + Sync>;

#[derive(Clone)]
struct RegisteredTask {
    handler: TaskHandler,
    queue: Option<String>,
    max_retries: Option<u32>,
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, RegisteredTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed task. Registering the same name again replaces the
    /// previous handler.
    pub fn register<T: Task>(&self) {
        let handler: TaskHandler = Arc::new(|message: TaskMessage| -> BoxFuture<'static, TaskOutput> {
            Box::pin(async move {
                let task: T = message.decode()?;
                task.run().await
            })
        });
        self.insert(
            T::name(),
            RegisteredTask {
                handler,
                queue: T::queue().map(str::to_string),
                max_retries: T::max_retries(),
            },
        );
    }

    /// Register a handler receiving positional and keyword arguments.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutput> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let handler: TaskHandler = Arc::new(move |message: TaskMessage| -> BoxFuture<'static, TaskOutput> {
            let handler = handler.clone();
            Box::pin(async move { handler(message.args().to_vec(), message.kwargs().clone()).await })
        });
        self.insert(
            name.into(),
            RegisteredTask {
                handler,
                queue: None,
                max_retries: None,
            },
        );
    }

    fn insert(&self, name: impl Into<String>, task: RegisteredTask) {
        let name = name.into();
        info!("Registered task handler: {}", name);
        self.tasks.write().insert(name, task);
    }

    pub fn get_handler(&self, name: &str) -> Option<TaskHandler> {
        self.tasks.read().get(name).map(|task| task.handler.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.read().contains_key(name)
    }

    /// Queue declared by the task, if any
    pub fn route(&self, name: &str) -> Option<String> {
        self.tasks.read().get(name).and_then(|task| task.queue.clone())
    }

    pub fn max_retries(&self, name: &str) -> Option<u32> {
        self.tasks.read().get(name).and_then(|task| task.max_retries)
    }

    /// Registered task names in sorted order
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.read().keys().cloned().collect();
        names.sort();
        names
    }
}
