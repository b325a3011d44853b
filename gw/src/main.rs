//! gw - apigate command-line driver
//!
//! Inspects configuration and cache keys, fetches URLs through the gateway
//! and benchmarks the scheduler with synthetic work.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use apigate::cli::{Cli, Command, build_descriptor, get_log_path};
use apigate::config::Config;
use apigate::events::{EventBus, spawn_event_logger, spawn_event_tracer};
use apigate::gateway::Gateway;
use apigate::scheduler::{Priority, PriorityScheduler, Scheduler, TaskError};
use apigate::upstream::{build_client, fetch_json};
use respcache::RequestDescriptor;

/// How long `get` and `bench` wait for in-flight work on exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialized yet, so nothing here can be traced
    let log_path = get_log_path();
    let log_dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    // CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Config) | None => cmd_config(&config),
        Some(Command::Key {
            method,
            path,
            query,
            body,
        }) => cmd_key(&method, &path, &query, body.as_deref()),
        Some(Command::Get { url, priority, repeat }) => cmd_get(&config, &url, priority, repeat).await,
        Some(Command::Bench {
            tasks,
            work_ms,
            fail_every,
            events,
        }) => cmd_bench(&config, tasks, work_ms, fail_every, events.as_ref()).await,
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to render configuration")?;
    print!("{}", yaml);
    println!("{} {}", "logs:".dimmed(), get_log_path().display());
    Ok(())
}

fn cmd_key(method: &str, path: &str, query: &[String], body: Option<&str>) -> Result<()> {
    debug!(%method, %path, "cmd_key: called");
    let descriptor = build_descriptor(method, path, query, body)?;
    println!("{}", descriptor.cache_key());
    Ok(())
}

async fn cmd_get(config: &Config, url: &str, priority: Priority, repeat: usize) -> Result<()> {
    debug!(%url, %priority, repeat, "cmd_get: called");
    let client = build_client(&config.upstream)?;
    let gateway = Gateway::new(config);
    let _tracer = spawn_event_tracer(gateway.scheduler().inner().events());
    let descriptor = RequestDescriptor::new("GET", url);

    for i in 0..repeat.max(1) {
        let client = client.clone();
        let target = url.to_string();
        let started = Instant::now();

        let result = gateway
            .fetch(&descriptor, priority, move |cancel: CancellationToken| {
                let client = client.clone();
                let target = target.clone();
                async move { fetch_json(&client, &target, cancel).await }
            })
            .await;

        match result {
            Ok(fetched) => {
                let source = if fetched.cache_hit { "cache".cyan() } else { "upstream".yellow() };
                let status = if fetched.response.is_success() {
                    fetched.response.status.to_string().green()
                } else {
                    fetched.response.status.to_string().red()
                };
                println!(
                    "{} {} {} {}",
                    format!("#{}", i + 1).dimmed(),
                    status,
                    source,
                    format!("{}ms", started.elapsed().as_millis()).dimmed()
                );
                if i == 0 {
                    println!("{}", serde_json::to_string_pretty(&fetched.response.body)?);
                }
            }
            Err(e) => println!("{} {} {}", format!("#{}", i + 1).dimmed(), "✗".red(), e),
        }
    }

    print_json_stats(&gateway.stats())?;
    gateway.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}

async fn cmd_bench(
    config: &Config,
    tasks: usize,
    work_ms: u64,
    fail_every: usize,
    events: Option<&PathBuf>,
) -> Result<()> {
    debug!(tasks, work_ms, fail_every, ?events, "cmd_bench: called");
    let bus = Arc::new(EventBus::with_default_capacity());
    let logger = match events {
        Some(path) => Some(spawn_event_logger(&bus, path)?),
        None => None,
    };
    let _tracer = spawn_event_tracer(&bus);

    let scheduler = PriorityScheduler::new(Scheduler::with_event_bus(config.scheduler.clone(), bus.clone()));
    let tiers = [Priority::High, Priority::Normal, Priority::Low];
    let started = Instant::now();

    let handles: Vec<_> = (0..tasks)
        .map(|i| {
            let flaky = fail_every > 0 && (i + 1) % fail_every == 0;
            let attempts = Arc::new(AtomicUsize::new(0));
            scheduler.submit_at(tiers[i % tiers.len()], move |_| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    tokio::time::sleep(Duration::from_millis(work_ms)).await;
                    if flaky && attempt == 1 {
                        eyre::bail!("synthetic failure in task {}", i);
                    }
                    Ok(i)
                }
            })
        })
        .collect();

    let results: Vec<Result<usize, TaskError>> = futures::future::join_all(handles).await;
    let elapsed = started.elapsed();
    let failed = results.iter().filter(|r| r.is_err()).count();

    println!(
        "{} {} tasks in {}ms ({} failed)",
        "✓".green(),
        results.len(),
        elapsed.as_millis(),
        if failed > 0 { failed.to_string().red() } else { failed.to_string().green() }
    );
    print_json_stats(&scheduler.stats())?;

    scheduler.shutdown(SHUTDOWN_GRACE).await;
    drop(scheduler);
    drop(bus);

    if let (Some(handle), Some(path)) = (logger, events) {
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        println!("{} {}", "events:".dimmed(), path.display());
    }
    Ok(())
}

fn print_json_stats<S: serde::Serialize>(stats: &S) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(stats).context("Failed to render stats")?);
    Ok(())
}
