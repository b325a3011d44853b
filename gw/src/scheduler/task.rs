//! Task records, submission options and result handles

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{self, BoxFuture, Either};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::error::TaskError;

/// Identifier assigned to each submitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Per-task overrides; unset fields fall back to the scheduler config
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Larger values execute first
    pub priority: i32,
    /// Budget for a single attempt
    pub timeout: Option<Duration>,
    /// Total attempts before giving up
    pub max_retries: Option<u32>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Eventual result of a submitted task
///
/// Await it to get the work's value or the [`TaskError`] that ended it.
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Abandoned)))
    }
}

/// Result of running one attempt
pub(crate) enum AttemptOutcome {
    /// The work produced a value; calling the closure hands it to the caller
    Succeeded(Box<dyn FnOnce() + Send>),
    /// The attempt failed; the job comes back so it can be retried or rejected
    Failed { job: Box<dyn Job>, error: TaskError },
}

/// Type-erased unit of work owned by the scheduler
pub(crate) trait Job: Send {
    /// Run one attempt bounded by `timeout`
    fn run(self: Box<Self>, timeout: Duration, cancel: CancellationToken) -> BoxFuture<'static, AttemptOutcome>;

    /// Settle the caller's handle with a failure
    fn reject(self: Box<Self>, error: TaskError);
}

struct TypedJob<T, F> {
    work: F,
    reply: oneshot::Sender<Result<T, TaskError>>,
}

impl<T, F, Fut> Job for TypedJob<T, F>
where
    T: Send + 'static,
    F: FnMut(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = eyre::Result<T>> + Send + 'static,
{
    fn run(mut self: Box<Self>, timeout: Duration, cancel: CancellationToken) -> BoxFuture<'static, AttemptOutcome> {
        Box::pin(async move {
            // A panic while building or polling the attempt is an ordinary failure
            let attempt = match panic::catch_unwind(AssertUnwindSafe(|| (self.work)(cancel.clone()))) {
                Ok(attempt) => Either::Left(AssertUnwindSafe(attempt).catch_unwind()),
                Err(payload) => Either::Right(future::ready(Err(payload))),
            };

            match tokio::time::timeout(timeout, attempt).await {
                Ok(Ok(Ok(value))) => {
                    let reply = self.reply;
                    AttemptOutcome::Succeeded(Box::new(move || {
                        let _ = reply.send(Ok(value));
                    }))
                }
                Ok(Ok(Err(e))) => AttemptOutcome::Failed {
                    job: self,
                    error: TaskError::Failed(e.to_string()),
                },
                Ok(Err(payload)) => AttemptOutcome::Failed {
                    job: self,
                    error: TaskError::Failed(format!("task panicked: {}", panic_message(payload.as_ref()))),
                },
                Err(_) => {
                    // The attempt future is already dropped; the token reaches
                    // anything the work spawned on its own
                    cancel.cancel();
                    AttemptOutcome::Failed {
                        job: self,
                        error: TaskError::Timeout {
                            timeout_ms: timeout.as_millis() as u64,
                        },
                    }
                }
            }
        })
    }

    fn reject(self: Box<Self>, error: TaskError) {
        let _ = self.reply.send(Err(error));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Create a job and the handle its caller awaits
pub(crate) fn new_job<T, F, Fut>(id: TaskId, work: F) -> (Box<dyn Job>, TaskHandle<T>)
where
    T: Send + 'static,
    F: FnMut(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = eyre::Result<T>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    (Box::new(TypedJob { work, reply: tx }), TaskHandle { id, rx })
}

/// A task in the waiting set
pub(crate) struct QueuedTask {
    pub id: TaskId,
    pub priority: i32,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub attempts: u32,
    pub enqueued_at: Instant,
    pub job: Box<dyn Job>,
}

/// Insert into a queue kept in descending priority order
///
/// New arrivals go behind every item of equal priority (FIFO within a
/// tier). Retried items go in front of their tier so they keep their
/// standing against later arrivals.
pub(crate) fn insert_by_priority<T>(queue: &mut VecDeque<T>, item: T, priority: impl Fn(&T) -> i32, ahead_of_peers: bool) {
    let p = priority(&item);
    let index = if ahead_of_peers {
        queue.partition_point(|queued| priority(queued) > p)
    } else {
        queue.partition_point(|queued| priority(queued) >= p)
    };
    queue.insert(index, item);
}
