use loom::Application;
use loom_queue::{QueueCommand, QueueCommandOutput};
use tokio_util::sync::CancellationToken;

/// Execute a queue command against the application's task queue. Workers
/// and beat stop on Ctrl+C or SIGTERM.
pub async fn run(application: &Application, command: &QueueCommand) -> anyhow::Result<QueueCommandOutput> {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let signal = tokio::spawn(async move {
        loom::shutdown_signal().await;
        token.cancel();
    });

    let output = command.execute(application.task_queue(), shutdown).await;
    signal.abort();
    Ok(output?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::ConfigStore;

    #[tokio::test]
    async fn test_status_command() {
        let application = Application::builder(ConfigStore::new())
            .env_prefix(None)
            .without_logging()
            .build()
            .await
            .unwrap();

        let output = run(&application, &QueueCommand::Status).await.unwrap();
        assert_eq!(output.command, "status");
    }
}
