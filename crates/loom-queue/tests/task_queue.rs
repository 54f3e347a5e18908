use async_trait::async_trait;
use loom_core::ConfigStore;
use loom_queue::{
    BeatEntry, CallOptions, InspectMethod, Priority, QueueCommand, Task, TaskOutput, TaskQueueManager, TaskState,
    WorkerOptions,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Deliver {
    order_id: u64,
}

#[async_trait]
impl Task for Deliver {
    fn name() -> &'static str {
        "deliver"
    }

    async fn run(&self) -> TaskOutput {
        Ok(json!({ "delivered": self.order_id }))
    }

    fn queue() -> Option<&'static str> {
        Some("shipping")
    }
}

fn manager() -> TaskQueueManager {
    let store = ConfigStore::from_yaml_str(
        "task_queue:\n  active: testing\n  testing:\n    worker_concurrency: 2\n    worker_queues: [default, shipping]\n    poll_interval_ms: 5\n    beat_interval_ms: 5\n    retry_backoff_ms: 0\n",
    )
    .unwrap();
    TaskQueueManager::from_store(&store).unwrap()
}

#[tokio::test]
async fn test_tasks_flow_through_configured_worker() {
    let manager = manager();
    manager.registry().register::<Deliver>();
    manager.registry().register_fn("echo", |args: Vec<Value>, kwargs: Map<String, Value>| async move {
        Ok(json!({ "args": args, "kwargs": kwargs }))
    });

    let typed = manager.delay(Deliver { order_id: 7 }).await.unwrap();
    let mut kwargs = Map::new();
    kwargs.insert("loud".into(), json!(true));
    let named = manager
        .send_task(
            "echo",
            vec![json!("hi")],
            kwargs,
            CallOptions {
                priority: Some(Priority::Critical),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let worker = manager.default_worker();
    assert_eq!(worker.queues(), ["default".to_string(), "shipping".to_string()]);

    // Critical priority runs first across queues
    assert_eq!(worker.process_next().await.unwrap(), Some(named));
    assert_eq!(worker.process_next().await.unwrap(), Some(typed));

    assert_eq!(
        manager.result(named).unwrap().result,
        Some(json!({ "args": ["hi"], "kwargs": { "loud": true } }))
    );
    assert_eq!(
        manager.result(typed).unwrap().result,
        Some(json!({ "delivered": 7 }))
    );

    let stats = manager.inspect(InspectMethod::Stats, &[]).await.unwrap();
    assert_eq!(stats["broker"]["succeeded"], json!(2));
}

#[tokio::test]
async fn test_worker_and_beat_run_until_shutdown() {
    let manager = Arc::new(manager());
    manager.registry().register_fn("tick", |_, _| async move { Ok(Value::Null) });

    let mut entry = BeatEntry::new("every-second", "* * * * * *", "tick").unwrap();
    entry.next_run = Some(chrono::Utc::now());
    manager.beat().add_entry(entry, false).unwrap();

    let shutdown = CancellationToken::new();
    let handle = {
        let manager = manager.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let command = QueueCommand::Worker(loom_queue::cli::WorkerArgs {
                beat: true,
                ..Default::default()
            });
            command.execute(&manager, shutdown).await
        })
    };

    let mut succeeded = 0;
    for _ in 0..200 {
        succeeded = manager.broker().stats().await.unwrap().succeeded;
        if succeeded > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.cancel();
    let output = handle.await.unwrap().unwrap();

    assert!(succeeded > 0);
    assert_eq!(output.command, "worker");
    assert!(output.body["succeeded"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_expired_and_revoked_tasks_never_run() {
    let manager = manager();
    manager.registry().register::<Deliver>();

    let expired = manager
        .apply_async(
            Deliver { order_id: 1 },
            CallOptions {
                expires: Some(chrono::Utc::now() - chrono::Duration::seconds(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let revoked = manager.delay(Deliver { order_id: 2 }).await.unwrap();
    assert!(manager.revoke(revoked).await.unwrap());

    let worker = manager.worker(WorkerOptions {
        queues: vec!["shipping".to_string()],
        ..Default::default()
    });
    assert_eq!(worker.drain().await.unwrap(), 0);

    assert_eq!(
        manager.broker().get(expired).await.unwrap().unwrap().state(),
        TaskState::Revoked
    );
    assert_eq!(manager.result(revoked).unwrap().state, TaskState::Revoked);
}
