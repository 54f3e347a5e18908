use clap::Parser;
use loom::Application;
use loom_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    loom_cli::run(cli, Application::builder).await
}
