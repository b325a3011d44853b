//! Named priority tiers and the convenience wrapper that uses them

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::core::{Scheduler, SchedulerStats};
use super::task::{SubmitOptions, TaskHandle};

/// Named priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Numeric value used for ordering in the scheduler
    pub fn value(self) -> i32 {
        match self {
            Self::Low => 1,
            Self::Normal => 5,
            Self::High => 10,
        }
    }
}

impl From<Priority> for i32 {
    fn from(priority: Priority) -> Self {
        priority.value()
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Scheduler front end that submits at a named tier
///
/// Holds no state of its own beyond the scheduler handle.
#[derive(Clone)]
pub struct PriorityScheduler {
    scheduler: Scheduler,
}

impl PriorityScheduler {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    /// The wrapped scheduler
    pub fn inner(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Submit at `priority`, with the scheduler's default timeout and retries
    pub fn submit_at<T, F, Fut>(&self, priority: Priority, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        self.scheduler.submit(SubmitOptions::new().priority(priority.value()), work)
    }

    pub fn submit_high<T, F, Fut>(&self, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        self.submit_at(Priority::High, work)
    }

    pub fn submit_normal<T, F, Fut>(&self, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        self.submit_at(Priority::Normal, work)
    }

    pub fn submit_low<T, F, Fut>(&self, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        self.submit_at(Priority::Low, work)
    }

    pub async fn drain(&self) {
        self.scheduler.drain().await
    }

    pub fn clear(&self) -> usize {
        self.scheduler.clear()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.scheduler.shutdown(grace).await
    }
}

impl From<Scheduler> for PriorityScheduler {
    fn from(scheduler: Scheduler) -> Self {
        Self::new(scheduler)
    }
}
