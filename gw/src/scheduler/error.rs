//! Task failure types

use thiserror::Error;

/// Why a submitted task did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The work itself returned an error
    #[error("{0}")]
    Failed(String),

    /// One attempt ran past its time budget
    #[error("Task timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The task was still waiting when the queue was cleared
    #[error("Queue cleared")]
    QueueCleared,

    /// Every allowed attempt failed; carries the last failure
    #[error("{last} (gave up after {attempts} attempts)")]
    Exhausted { attempts: u32, last: Box<TaskError> },

    /// Submitted after the scheduler shut down
    #[error("Scheduler is shut down")]
    ShutDown,

    /// The scheduler was dropped before the task settled
    #[error("Scheduler dropped before task completed")]
    Abandoned,
}

impl TaskError {
    /// The innermost failure, looking through `Exhausted`
    pub fn root(&self) -> &TaskError {
        match self {
            TaskError::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), TaskError::Timeout { .. })
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self, TaskError::QueueCleared)
    }

    /// Whether the scheduler will try the task again after this failure
    ///
    /// Work failures and timeouts are retried alike; nothing distinguishes
    /// a malformed request from a transient network error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Failed(_) | TaskError::Timeout { .. })
    }
}
