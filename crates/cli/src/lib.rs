//! # loom-cli
//!
//! Commands for loom applications. The `loom` binary runs them against an
//! application assembled from the settings file alone; applications that
//! register their own packages and tasks call [`run`] from their own
//! binary with their own builder.

pub mod commands;

use clap::{Parser, Subcommand};
use commands::audit::AuditArgs;
use commands::config::ConfigCommands;
use commands::hash::HashCommands;
use loom::ApplicationBuilder;
use loom_core::ConfigStore;
use loom_queue::QueueCommand;
use std::path::{Path, PathBuf};

/// Settings file read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "settings.yaml";

#[derive(Parser, Debug)]
#[command(name = "loom")]
#[command(about = "loom application commands")]
pub struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the application until Ctrl+C or SIGTERM
    Serve {
        /// Host to bind, overrides `application.host`
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overrides `application.port`
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Task queue commands
    Queue {
        #[command(subcommand)]
        queue_command: QueueCommand,
    },

    /// Password hashing
    Hash {
        #[command(subcommand)]
        hash_command: HashCommands,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Run the application audit
    Audit(AuditArgs),

    /// List loaded packages
    Packages,
}

/// Read the settings file. A missing file gives an empty store so that
/// defaults and environment overrides still apply.
pub fn load_store(path: &Path) -> anyhow::Result<ConfigStore> {
    if !path.exists() {
        tracing::warn!("Settings file {} not found, using defaults", path.display());
        return Ok(ConfigStore::new());
    }
    Ok(ConfigStore::from_file(path)?)
}

/// Run a parsed command. `build` turns the loaded settings into the
/// application builder for commands that need a running application.
pub async fn run<F>(cli: Cli, build: F) -> anyhow::Result<()>
where
    F: FnOnce(ConfigStore) -> ApplicationBuilder,
{
    let mut store = load_store(&cli.config)?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                store.set("application", "host", host);
            }
            if let Some(port) = port {
                store.set("application", "port", port);
            }
            build(store).build().await?.run().await?;
        }
        Commands::Queue { queue_command } => {
            let application = build(store).build().await?;
            let output = commands::queue::run(&application, &queue_command).await?;
            println!("{}", output);
        }
        Commands::Hash { hash_command } => {
            println!("{}", commands::hash::run(&store, &hash_command)?);
        }
        Commands::Config { config_command } => {
            println!("{}", commands::config::run(&store, &config_command)?);
        }
        Commands::Audit(args) => {
            let application = build(store).build().await?;
            let (report, status) = commands::audit::run(&application, &args).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if status >= 400 {
                anyhow::bail!("audit failed with status {}", status);
            }
        }
        Commands::Packages => {
            let application = build(store).build().await?;
            for package in &application.info().packages {
                println!("{}", package);
            }
        }
    }

    Ok(())
}
