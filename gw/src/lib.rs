//! apigate - scheduling and caching core for a multi-provider API gateway
//!
//! Every outbound request a route handler makes goes through one shared
//! [`Gateway`], which serves repeat requests from the response cache and
//! runs the rest on a bounded, prioritized task scheduler.
//!
//! # Core Concepts
//!
//! - **Bounded Concurrency**: at most `max-concurrent` upstream calls in flight
//! - **Priority Tiers**: high, normal and low work share one ordered queue
//! - **Retry With Backoff**: failed attempts wait `retry-delay * 2^(n-1)`
//! - **Content Keys**: identical requests map to the same SHA-256 cache key
//!
//! # Modules
//!
//! - [`scheduler`] - Task scheduler and priority wrapper
//! - [`events`] - Scheduler lifecycle events, logging and tracing
//! - [`gateway`] - Composition root combining scheduler and cache
//! - [`upstream`] - Generic JSON fetching over HTTP
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod events;
pub mod gateway;
pub mod scheduler;
pub mod upstream;

// Re-export commonly used types
pub use config::{Config, UpstreamConfig};
pub use events::{EventBus, EventLogEntry, EventLogger, SchedulerEvent, read_events, spawn_event_logger, spawn_event_tracer};
pub use gateway::{Fetched, Gateway, GatewayError, GatewayStats};
pub use respcache::{CacheConfig, CacheKey, CachePolicy, CacheStats, RequestDescriptor, ResponseCache, compute_key};
pub use scheduler::{
    Priority, PriorityScheduler, Scheduler, SchedulerConfig, SchedulerStats, SubmitOptions, TaskError, TaskHandle, TaskId,
};
pub use upstream::{UpstreamResponse, build_client, fetch_json};
