//! Task queue commands
//!
//! `QueueCommand` is a clap subcommand tree. Values left out on the command
//! line fall back to the `task_queue` configuration section, both when
//! executing and when rendering the effective command line.

mod arguments;

pub use arguments::{
    render_arguments, BooleanArgument, CommandArgument, CompositeKeywordArgument, KeywordArgument,
    PositionalArgument,
};

use crate::manager::{CallOptions, InspectMethod, TaskQueueManager};
use crate::{Priority, QueueConfig, QueueError, QueueResult, TaskId, WorkerOptions};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Start a worker
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct WorkerArgs {
    /// Number of tasks run at once
    #[arg(long, short)]
    pub concurrency: Option<usize>,

    /// Worker node name
    #[arg(long, short = 'n')]
    pub hostname: Option<String>,

    /// Also run the beat scheduler
    #[arg(long, short = 'B')]
    pub beat: bool,

    /// Queues to consume (comma-separated)
    #[arg(long, short = 'Q', value_delimiter = ',')]
    pub queues: Vec<String>,

    /// Purge waiting tasks of the consumed queues before starting
    #[arg(long)]
    pub purge: bool,

    /// Maximum and minimum concurrency, as `max,min`
    #[arg(long, value_delimiter = ',')]
    pub autoscale: Vec<usize>,

    #[arg(long)]
    pub logfile: Option<String>,

    #[arg(long)]
    pub loglevel: Option<String>,

    #[arg(long)]
    pub pidfile: Option<String>,

    /// Optimization profile
    #[arg(short = 'O')]
    pub optimization: Option<String>,
}

/// Start the beat scheduler
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct BeatArgs {
    #[arg(long)]
    pub logfile: Option<String>,

    #[arg(long)]
    pub loglevel: Option<String>,

    #[arg(long)]
    pub pidfile: Option<String>,
}

/// Show the result of a task
#[derive(Args, Debug, Clone, PartialEq)]
pub struct ResultArgs {
    pub task_id: TaskId,

    /// Show the error instead of the result
    #[arg(long)]
    pub traceback: bool,
}

/// Inspect workers and queues
#[derive(Args, Debug, Clone, PartialEq)]
pub struct InspectArgs {
    #[arg(value_enum)]
    pub method: InspectMethod,

    /// Task ids for `query-task`
    pub task_ids: Vec<TaskId>,

    /// Print compact JSON
    #[arg(long, short)]
    pub json: bool,
}

/// Send a task by name
#[derive(Args, Debug, Clone, PartialEq)]
pub struct CallArgs {
    pub task: String,

    /// Positional arguments as a JSON array
    #[arg(long, short)]
    pub args: Option<String>,

    /// Keyword arguments as a JSON object
    #[arg(long, short)]
    pub kwargs: Option<String>,

    /// Earliest run time (RFC 3339)
    #[arg(long)]
    pub eta: Option<DateTime<Utc>>,

    /// Delay in seconds
    #[arg(long)]
    pub countdown: Option<f64>,

    /// Expiry time (RFC 3339)
    #[arg(long)]
    pub expires: Option<DateTime<Utc>>,

    #[arg(long)]
    pub queue: Option<String>,

    #[arg(long)]
    pub priority: Option<Priority>,
}

/// Purge waiting tasks
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct PurgeArgs {
    /// Queues to purge (comma-separated); all queues when omitted
    #[arg(long, short = 'Q', value_delimiter = ',')]
    pub queues: Vec<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum QueueCommand {
    /// Start a worker
    Worker(WorkerArgs),
    /// Start the beat scheduler
    Beat(BeatArgs),
    /// Show the result of a task
    Result(ResultArgs),
    /// Inspect workers and queues
    Inspect(InspectArgs),
    /// Send a task by name
    Call(CallArgs),
    /// Purge waiting tasks
    Purge(PurgeArgs),
    /// Show broker counters, queue lengths and workers
    Status,
}

/// Outcome of a queue command
#[derive(Debug, Clone, PartialEq)]
pub struct QueueCommandOutput {
    pub command: &'static str,
    pub body: Value,
    pub compact: bool,
}

impl QueueCommandOutput {
    fn new(command: &'static str, body: Value) -> Self {
        Self {
            command,
            body,
            compact: false,
        }
    }
}

impl fmt::Display for QueueCommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = if self.compact {
            serde_json::to_string(&self.body)
        } else {
            serde_json::to_string_pretty(&self.body)
        };
        match rendered {
            Ok(rendered) => write!(f, "{}", rendered),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl QueueCommand {
    pub fn name(&self) -> &'static str {
        match self {
            QueueCommand::Worker(_) => "worker",
            QueueCommand::Beat(_) => "beat",
            QueueCommand::Result(_) => "result",
            QueueCommand::Inspect(_) => "inspect",
            QueueCommand::Call(_) => "call",
            QueueCommand::Purge(_) => "purge",
            QueueCommand::Status => "status",
        }
    }

    /// Effective command line, with configured defaults filled in
    pub fn command_line(&self, config: &QueueConfig) -> Vec<String> {
        let arguments: Vec<Box<dyn CommandArgument>> = match self {
            QueueCommand::Worker(args) => {
                let queues = if args.queues.is_empty() {
                    config.worker_queues.clone()
                } else {
                    args.queues.clone()
                };
                let autoscale = if args.autoscale.is_empty() {
                    config.worker_autoscale.clone().unwrap_or_default()
                } else {
                    args.autoscale.clone()
                };
                vec![
                    Box::new(KeywordArgument::new(
                        "--concurrency",
                        Some(args.concurrency.unwrap_or(config.worker_concurrency)),
                    )),
                    Box::new(KeywordArgument::new(
                        "--hostname",
                        args.hostname.as_ref().or(config.worker_hostname.as_ref()),
                    )),
                    Box::new(BooleanArgument::new("--beat", args.beat)),
                    Box::new(CompositeKeywordArgument::new("--queues", &queues)),
                    Box::new(BooleanArgument::new("--purge", args.purge)),
                    Box::new(CompositeKeywordArgument::new("--autoscale", &autoscale)),
                    Box::new(KeywordArgument::new(
                        "--logfile",
                        args.logfile.as_ref().or(config.worker_log_file.as_ref()),
                    )),
                    Box::new(KeywordArgument::new(
                        "--loglevel",
                        Some(args.loglevel.as_ref().unwrap_or(&config.worker_log_level)),
                    )),
                    Box::new(KeywordArgument::new(
                        "--pidfile",
                        args.pidfile.as_ref().or(config.worker_pid_file.as_ref()),
                    )),
                    Box::new(KeywordArgument::new(
                        "-O",
                        args.optimization.as_ref().or(config.worker_optimization.as_ref()),
                    )),
                ]
            }
            QueueCommand::Beat(args) => vec![
                Box::new(KeywordArgument::new(
                    "--logfile",
                    args.logfile.as_ref().or(config.beat_log_file.as_ref()),
                )),
                Box::new(KeywordArgument::new(
                    "--loglevel",
                    Some(args.loglevel.as_ref().unwrap_or(&config.beat_log_level)),
                )),
                Box::new(KeywordArgument::new(
                    "--pidfile",
                    args.pidfile.as_ref().or(config.beat_pid_file.as_ref()),
                )),
            ],
            QueueCommand::Result(args) => vec![
                Box::new(PositionalArgument::new(0, Some(args.task_id))),
                Box::new(BooleanArgument::new("--traceback", args.traceback)),
            ],
            QueueCommand::Inspect(args) => {
                let mut arguments: Vec<Box<dyn CommandArgument>> = vec![
                    Box::new(PositionalArgument::new(
                        0,
                        Some(inspect_method_name(args.method)),
                    )),
                    Box::new(BooleanArgument::new("--json", args.json)),
                ];
                for (offset, task_id) in args.task_ids.iter().enumerate() {
                    arguments.push(Box::new(PositionalArgument::new(offset + 1, Some(task_id))));
                }
                arguments
            }
            QueueCommand::Call(args) => vec![
                Box::new(PositionalArgument::new(0, Some(&args.task))),
                Box::new(KeywordArgument::new("--args", args.args.as_ref())),
                Box::new(KeywordArgument::new("--kwargs", args.kwargs.as_ref())),
                Box::new(KeywordArgument::new("--eta", args.eta.map(|eta| eta.to_rfc3339()))),
                Box::new(KeywordArgument::new("--countdown", args.countdown)),
                Box::new(KeywordArgument::new(
                    "--expires",
                    args.expires.map(|expires| expires.to_rfc3339()),
                )),
                Box::new(KeywordArgument::new("--queue", args.queue.as_ref())),
                Box::new(KeywordArgument::new(
                    "--priority",
                    args.priority.map(priority_name),
                )),
            ],
            QueueCommand::Purge(args) => vec![Box::new(CompositeKeywordArgument::new("--queues", &args.queues))],
            QueueCommand::Status => Vec::new(),
        };

        let mut line = vec![self.name().to_string()];
        line.extend(render_arguments(&arguments));
        line
    }

    /// Run the command against `manager`. Long running commands stop when
    /// `shutdown` is cancelled.
    pub async fn execute(
        &self,
        manager: &TaskQueueManager,
        shutdown: CancellationToken,
    ) -> QueueResult<QueueCommandOutput> {
        info!("Running queue command: {}", self.command_line(manager.config()).join(" "));
        match self {
            QueueCommand::Worker(args) => run_worker(args, manager, shutdown).await,
            QueueCommand::Beat(_) => {
                manager.beat().run(shutdown).await?;
                Ok(QueueCommandOutput::new(
                    "beat",
                    json!({ "entries": manager.beat().entries().len() }),
                ))
            }
            QueueCommand::Result(args) => {
                let record = manager
                    .result(args.task_id)
                    .ok_or_else(|| QueueError::TaskNotFound(args.task_id.to_string()))?;
                let body = if args.traceback {
                    json!({ "state": record.state, "traceback": record.error })
                } else {
                    json!({ "state": record.state, "result": record.result })
                };
                Ok(QueueCommandOutput::new("result", body))
            }
            QueueCommand::Inspect(args) => {
                let body = manager.inspect(args.method, &args.task_ids).await?;
                let mut output = QueueCommandOutput::new("inspect", body);
                output.compact = args.json;
                Ok(output)
            }
            QueueCommand::Call(args) => {
                let positional = parse_json_array(args.args.as_deref())?;
                let keyword = parse_json_object(args.kwargs.as_deref())?;
                let countdown = args
                    .countdown
                    .map(|seconds| {
                        Duration::try_from_secs_f64(seconds)
                            .map_err(|e| QueueError::InvalidArgument(format!("countdown: {}", e)))
                    })
                    .transpose()?;
                let options = CallOptions {
                    queue: args.queue.clone(),
                    countdown,
                    eta: args.eta,
                    expires: args.expires,
                    priority: args.priority,
                    max_retries: None,
                };
                let task_id = manager.send_task(&args.task, positional, keyword, options).await?;
                Ok(QueueCommandOutput::new("call", json!({ "task_id": task_id })))
            }
            QueueCommand::Purge(args) => {
                let queues = (!args.queues.is_empty()).then_some(args.queues.as_slice());
                let purged = manager.purge(queues).await?;
                Ok(QueueCommandOutput::new("purge", json!({ "purged": purged })))
            }
            QueueCommand::Status => Ok(QueueCommandOutput::new("status", manager.status().await?)),
        }
    }
}

async fn run_worker(
    args: &WorkerArgs,
    manager: &TaskQueueManager,
    shutdown: CancellationToken,
) -> QueueResult<QueueCommandOutput> {
    let config = manager.config();
    let mut options = WorkerOptions::from_config(config);
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency;
    }
    match args.autoscale.as_slice() {
        [] => {}
        [max, min] if max >= min => options.concurrency = *max,
        _ => {
            return Err(QueueError::InvalidArgument(
                "autoscale must be `max,min` with max >= min".to_string(),
            ))
        }
    }
    if options.concurrency == 0 {
        return Err(QueueError::InvalidArgument("concurrency must be greater than zero".to_string()));
    }
    if args.hostname.is_some() {
        options.hostname = args.hostname.clone();
    }
    if !args.queues.is_empty() {
        options.queues = args.queues.clone();
    }

    if args.purge {
        let purged = manager.purge(Some(&options.queues)).await?;
        info!("Purged {} waiting tasks before starting", purged);
    }

    let worker = manager.worker(options);
    if args.beat {
        let (worker_result, beat_result) =
            tokio::join!(worker.run(shutdown.clone()), manager.beat().run(shutdown));
        worker_result?;
        beat_result?;
    } else {
        worker.run(shutdown).await?;
    }

    Ok(QueueCommandOutput::new("worker", serde_json::to_value(worker.stats())?))
}

fn parse_json_array(raw: Option<&str>) -> QueueResult<Vec<Value>> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => match serde_json::from_str(raw) {
            Ok(Value::Array(values)) => Ok(values),
            _ => Err(QueueError::InvalidArgument(format!("args must be a JSON array: {}", raw))),
        },
    }
}

fn parse_json_object(raw: Option<&str>) -> QueueResult<Map<String, Value>> {
    match raw {
        None => Ok(Map::new()),
        Some(raw) => match serde_json::from_str(raw) {
            Ok(Value::Object(values)) => Ok(values),
            _ => Err(QueueError::InvalidArgument(format!("kwargs must be a JSON object: {}", raw))),
        },
    }
}

fn inspect_method_name(method: InspectMethod) -> String {
    use clap::ValueEnum;
    method
        .to_possible_value()
        .map(|value| value.get_name().to_string())
        .unwrap_or_default()
}

fn priority_name(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Normal => "normal",
        Priority::High => "high",
        Priority::Critical => "critical",
    }
}
