//! Event types for scheduler activity
//!
//! These events cover the full task lifecycle:
//! - Admission (enqueued, started)
//! - Settlement (succeeded, failed after all attempts)
//! - Retries with their backoff delay
//! - Forced clearing of the waiting set

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::TaskId;

/// Everything the scheduler reports to observers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SchedulerEvent {
    /// A task entered the waiting set
    Enqueued {
        task_id: TaskId,
        priority: i32,
        waiting: usize,
        executing: usize,
    },
    /// An attempt took an execution slot
    Started { task_id: TaskId, attempt: u32 },
    /// The work produced a value
    Succeeded {
        task_id: TaskId,
        attempts: u32,
        duration_ms: u64,
    },
    /// An attempt failed and the task will run again after `delay_ms`
    Retrying {
        task_id: TaskId,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// Every attempt failed; the caller gets the error
    Failed {
        task_id: TaskId,
        attempts: u32,
        error: String,
        /// Time since the task was first enqueued
        total_ms: u64,
    },
    /// Waiting tasks were rejected by `clear()`
    Cleared { count: usize },
}

impl SchedulerEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "Enqueued",
            Self::Started { .. } => "Started",
            Self::Succeeded { .. } => "Succeeded",
            Self::Retrying { .. } => "Retrying",
            Self::Failed { .. } => "Failed",
            Self::Cleared { .. } => "Cleared",
        }
    }

    /// The task this event concerns, if any
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::Enqueued { task_id, .. }
            | Self::Started { task_id, .. }
            | Self::Succeeded { task_id, .. }
            | Self::Retrying { task_id, .. }
            | Self::Failed { task_id, .. } => Some(*task_id),
            Self::Cleared { .. } => None,
        }
    }

    /// Whether the task reached a final state with this event
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: SchedulerEvent,
}

impl EventLogEntry {
    pub fn new(event: SchedulerEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
