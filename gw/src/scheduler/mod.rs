//! Scheduler for outbound work
//!
//! Admission-controlled execution with priority queuing, concurrency
//! limits, per-attempt timeouts and retry with exponential backoff.

mod config;
mod core;
mod error;
mod priority;
mod task;

pub use config::SchedulerConfig;
pub use core::{Scheduler, SchedulerStats};
pub use error::TaskError;
pub use priority::{Priority, PriorityScheduler};
pub use task::{SubmitOptions, TaskHandle, TaskId};
