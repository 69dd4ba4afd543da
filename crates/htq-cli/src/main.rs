//! htq - command line front end for the task broker.
//!
//! `htq worker` runs the workers; every other subcommand performs one broker
//! call and prints the result. Records are printed as JSON on stdout, logs go
//! to stderr.

mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use htq_core::impls::{InMemoryStore, RedisStore};
use htq_core::ports::BackingStore;
use htq_core::{Broker, BrokerBuilder, NewTask, TaskId};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::{LogSettings, Settings};

#[derive(Parser, Debug)]
#[command(name = "htq", version, about = "Queue outbound HTTP calls and collect their responses")]
struct Cli {
    /// Settings file (TOML). Defaults to ./htq.toml when present.
    #[arg(short, long, global = true, env = "HTQ_CONFIG")]
    config: Option<PathBuf>,

    /// Use a throw-away in-memory store instead of Redis.
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run workers until interrupted.
    Worker {
        /// Overrides `worker.concurrency`.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Queue a call and print its id.
    Submit(SubmitArgs),
    /// Print the current status of a task.
    Status { id: TaskId },
    /// Print the full task record.
    Get { id: TaskId },
    /// List tasks still waiting in the queue.
    Queued,
    /// Print the raw length of the dispatch queue.
    Size,
    /// Cancel a task.
    Cancel { id: TaskId },
    /// Wait for a task to finish and print it with its response.
    Response {
        id: TaskId,
        /// Give up after this many seconds.
        #[arg(long)]
        deadline: Option<u64>,
    },
    /// Delete the stored response of a task.
    Purge { id: TaskId },
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[arg(long)]
    url: String,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// `Name: value`, repeatable.
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    #[arg(short, long, default_value = "")]
    data: String,

    /// Seconds; `broker.default_timeout_secs` when omitted.
    #[arg(long)]
    timeout: Option<u64>,

    /// Wait for the outcome and print it instead of just the id.
    #[arg(long)]
    wait: bool,
}

impl SubmitArgs {
    fn to_new_task(&self) -> NewTask {
        let mut task = NewTask::get(&self.url)
            .with_method(&self.method)
            .with_data(&self.data);
        for (name, value) in &self.headers {
            task = task.with_header(name, value);
        }
        if let Some(timeout) = self.timeout {
            task = task.with_timeout(timeout);
        }
        task
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn init_logging(log: &LogSettings) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .with_context(|| format!("invalid log level {:?}", log.level))?;
    let registry = tracing_subscriber::registry().with(env_filter);

    if log.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("failed to initialise JSON logging")?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("failed to initialise logging")?;
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_store(settings: &Settings, memory: bool) -> Result<Arc<dyn BackingStore>> {
    if memory {
        info!("using in-memory store");
        return Ok(Arc::new(InMemoryStore::new()));
    }
    let store = RedisStore::connect(&settings.redis.url)
        .await
        .with_context(|| format!("cannot reach redis at {}", settings.redis.url))?;
    Ok(Arc::new(store))
}

async fn run_workers(broker: &Broker, concurrency: usize) -> Result<()> {
    if concurrency == 0 {
        bail!("worker concurrency must be at least 1");
    }
    let workers = broker.spawn_workers(concurrency);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down, waiting for in-flight calls");
    workers.shutdown_and_join().await;
    Ok(())
}

async fn submit(broker: &Broker, args: &SubmitArgs, settings: &Settings, memory: bool) -> Result<()> {
    let id = broker.submit(args.to_new_task()).await?;
    if !args.wait {
        println!("{id}");
        return Ok(());
    }

    // nobody else can see an in-memory store, so run the workers here
    let workers = memory.then(|| broker.spawn_workers(settings.worker.concurrency.max(1)));
    let result = broker.await_response(id, None).await;
    if let Some(workers) = workers {
        workers.shutdown_and_join().await;
    }
    print_json(&result?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    init_logging(&settings.log)?;

    let store = open_store(&settings, cli.memory).await?;
    let broker = BrokerBuilder::new(store)
        .config(settings.broker.clone())
        .keys(settings.keys.clone())
        .build()?;

    match &cli.command {
        Command::Worker { concurrency } => {
            run_workers(&broker, concurrency.unwrap_or(settings.worker.concurrency)).await?
        }
        Command::Submit(args) => submit(&broker, args, &settings, cli.memory).await?,
        Command::Status { id } => println!("{}", broker.status(*id).await?),
        Command::Get { id } => print_json(&broker.get(*id).await?)?,
        Command::Queued => print_json(&broker.list_queued().await?)?,
        Command::Size => println!("{}", broker.queue_len().await?),
        Command::Cancel { id } => print_json(&broker.cancel(*id).await?)?,
        Command::Response { id, deadline } => {
            let deadline = deadline.map(Duration::from_secs);
            print_json(&broker.await_response(*id, deadline).await?)?
        }
        Command::Purge { id } => {
            broker.purge_response(*id).await?;
            println!("purged {id}");
        }
    }
    Ok(())
}
