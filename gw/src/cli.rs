//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use eyre::Result;
use respcache::RequestDescriptor;
use std::path::PathBuf;
use tracing::debug;

use crate::scheduler::Priority;

/// apigate - scheduling and caching core for an API gateway
#[derive(Parser)]
#[command(
    name = "gw",
    about = "Exercise the apigate scheduler and response cache",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the effective configuration as YAML
    Config,

    /// Print the cache key for a request description
    Key {
        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request path
        #[arg(short, long)]
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_name = "KEY=VALUE")]
        query: Vec<String>,

        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Fetch a URL through the scheduler and cache
    Get {
        /// URL to fetch
        url: String,

        /// Priority tier (high, normal, low)
        #[arg(short, long, default_value = "normal")]
        priority: Priority,

        /// Number of times to issue the request
        #[arg(short, long, default_value = "1")]
        repeat: usize,
    },

    /// Run synthetic tasks through the scheduler and report stats
    Bench {
        /// Number of tasks to submit
        #[arg(short, long, default_value = "20")]
        tasks: usize,

        /// Simulated work per task in milliseconds
        #[arg(short, long, default_value = "50")]
        work_ms: u64,

        /// Make every Nth task fail its first attempt (0 disables)
        #[arg(short, long, default_value = "0")]
        fail_every: usize,

        /// Write scheduler events to this JSONL file
        #[arg(short, long)]
        events: Option<PathBuf>,
    },
}

/// Build a request descriptor from `key` subcommand arguments
pub fn build_descriptor(method: &str, path: &str, query: &[String], body: Option<&str>) -> Result<RequestDescriptor> {
    debug!(%method, %path, ?query, "build_descriptor: called");
    let mut descriptor = RequestDescriptor::new(method, path);

    for pair in query {
        let (key, value) = parse_query_pair(pair)?;
        descriptor = descriptor.query(key, value);
    }

    if let Some(body) = body {
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| eyre::eyre!("Invalid JSON body: {}", e))?;
        descriptor = descriptor.body(value);
    }

    Ok(descriptor)
}

/// Split `key=value`; the value may itself contain `=`
fn parse_query_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(eyre::eyre!("Invalid query parameter '{}', expected KEY=VALUE", pair)),
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("apigate")
        .join("logs")
        .join("apigate.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["gw"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_key() {
        let cli = Cli::parse_from(["gw", "key", "--path", "/weather", "-q", "city=Oslo", "-q", "units=metric"]);
        match cli.command {
            Some(Command::Key {
                method,
                path,
                query,
                body,
            }) => {
                assert_eq!(method, "GET");
                assert_eq!(path, "/weather");
                assert_eq!(query, vec!["city=Oslo", "units=metric"]);
                assert!(body.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_get_priority() {
        let cli = Cli::parse_from(["gw", "get", "http://localhost/x", "--priority", "high", "--repeat", "3"]);
        assert!(matches!(
            cli.command,
            Some(Command::Get {
                priority: Priority::High,
                repeat: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_priority() {
        assert!(Cli::try_parse_from(["gw", "get", "http://localhost/x", "-p", "urgent"]).is_err());
    }

    #[test]
    fn test_cli_parse_bench_defaults() {
        let cli = Cli::parse_from(["gw", "bench"]);
        assert!(matches!(
            cli.command,
            Some(Command::Bench {
                tasks: 20,
                work_ms: 50,
                fail_every: 0,
                events: None,
            })
        ));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["gw", "config", "--log-level", "debug", "-c", "/tmp/gw.yml"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/gw.yml")));
    }

    #[test]
    fn test_build_descriptor() {
        let descriptor = build_descriptor(
            "post",
            "/search",
            &["q=rust".to_string(), "filter=a=b".to_string()],
            Some(r#"{"limit": 5}"#),
        )
        .unwrap();
        assert_eq!(descriptor.method, "POST");
        assert_eq!(descriptor.query.get("filter"), Some(&vec!["a=b".to_string()]));
        assert_eq!(descriptor.body, Some(json!({"limit": 5})));
    }

    #[test]
    fn test_build_descriptor_repeated_query() {
        let repeated = build_descriptor("GET", "/posts", &["tag=a".to_string(), "tag=b".to_string()], None).unwrap();
        let single = build_descriptor("GET", "/posts", &["tag=b".to_string()], None).unwrap();
        assert_eq!(repeated.query.get("tag").map(Vec::len), Some(2));
        assert_ne!(repeated.cache_key(), single.cache_key());
    }

    #[test]
    fn test_build_descriptor_rejects_bad_input() {
        assert!(build_descriptor("GET", "/", &["novalue".to_string()], None).is_err());
        assert!(build_descriptor("GET", "/", &["=x".to_string()], None).is_err());
        assert!(build_descriptor("GET", "/", &[], Some("{not json")).is_err());
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("apigate/logs/apigate.log"));
    }
}
