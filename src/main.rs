//! CLI for popqueue
//!
//! Subcommands:
//! - `push`: publish one job to the default topic and print its id
//! - `work`: run a worker until SIGINT or SIGTERM

use std::future::Future;
use std::process;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};

use popqueue::broker::MemoryBroker;
use popqueue::config::load_config;
use popqueue::utils::logging;
use popqueue::{Task, TaskRegistry, Worker, WorkerOptions, connect};

#[derive(Debug, PartialEq, Parser)]
#[command(name = "popqueue")]
enum Command {
    /// Publish a job to the default topic
    Push {
        /// Registered task name
        task: String,
        /// Task data as JSON (default: {})
        #[arg(value_parser = parse_json)]
        data: Option<Value>,
    },
    /// Run a worker until interrupted
    Work {
        /// Topic to consume (default: the configured default topic)
        topic: Option<String>,
    },
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("task data must be JSON: {e}"))
}

/// Built-in task that writes its data to the log.
struct LogTask {
    data: Value,
}

#[async_trait]
impl Task for LogTask {
    async fn handle(&self) -> anyhow::Result<()> {
        info!(data = %self.data, "log task");
        Ok(())
    }
}

fn registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry.register_with("log", |data| {
        Ok(Box::new(LogTask { data: data.clone() }) as Box<dyn Task>)
    });
    registry
}

/// Completes on Ctrl-C, or on SIGTERM where available. The SIGTERM handler
/// is installed when this is called, not when the future is first polled.
fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let mut terminate = match tokio::signal::unix::signal(
        tokio::signal::unix::SignalKind::terminate(),
    ) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            None
        }
    };

    async move {
        #[cfg(unix)]
        {
            let terminated = async {
                match terminate.as_mut() {
                    Some(stream) => {
                        stream.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminated => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown requested");
    }
}

#[tokio::main]
async fn main() {
    let command = Command::parse();

    if let Err(e) = run(command).await {
        eprintln!("popqueue: {e:#}");
        process::exit(2);
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let settings = load_config().context("failed to load configuration")?;
    logging::init(&settings.logging.level);

    let broker = MemoryBroker::from_settings(&settings.broker).context("failed to open broker")?;
    let queue = connect(&settings.queue, &broker)?;

    match command {
        Command::Push { task, data } => {
            let data = data.unwrap_or_else(|| Value::Object(Default::default()));
            let id = queue.push(&task, data, None).await?;
            println!("{id}");
        }
        Command::Work { topic } => {
            let worker = Worker::new(WorkerOptions::from(&settings.worker));
            let summary = worker
                .run_until(&queue, topic.as_deref(), &registry(), shutdown_signal())
                .await;
            info!(
                processed = summary.processed,
                failed = summary.failed,
                "worker finished"
            );
        }
    }

    broker.flush()?;
    Ok(())
}
