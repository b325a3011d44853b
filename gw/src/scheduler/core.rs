//! Scheduler implementation

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::{EventBus, SchedulerEvent};

use super::config::SchedulerConfig;
use super::error::TaskError;
use super::task::{AttemptOutcome, QueuedTask, SubmitOptions, TaskHandle, TaskId, insert_by_priority, new_job};

/// Point-in-time scheduler counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub waiting: usize,
    pub executing: usize,
    /// Tasks that succeeded
    pub processed: u64,
    /// Tasks that failed permanently
    pub errors: u64,
    pub max_concurrent: usize,
}

/// Internal state protected by mutex
struct SchedulerState {
    /// Waiting tasks, descending priority, FIFO within a priority
    waiting: VecDeque<QueuedTask>,

    /// Tasks holding an execution slot (running or backing off)
    executing: usize,

    processed: u64,
    errors: u64,
    next_id: u64,
}

struct Shared {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    /// Signalled whenever the scheduler becomes idle
    idle: Notify,
    events: Arc<EventBus>,
    shutdown: CancellationToken,
}

/// Admission-controlled task executor
///
/// Runs submitted work with at most `max_concurrent` tasks in flight,
/// highest priority first, bounding each attempt by a timeout and retrying
/// failures with exponential backoff. Cloning yields another handle to the
/// same scheduler. Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a new scheduler with its own event bus
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_event_bus(config, Arc::new(EventBus::with_default_capacity()))
    }

    /// Create a new scheduler that reports to an existing event bus
    pub fn with_event_bus(mut config: SchedulerConfig, events: Arc<EventBus>) -> Self {
        debug!(?config, "Scheduler::new: called");
        if config.max_concurrent == 0 {
            warn!("Scheduler::new: max_concurrent is 0, using 1");
            config.max_concurrent = 1;
        }

        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(SchedulerState {
                    waiting: VecDeque::new(),
                    executing: 0,
                    processed: 0,
                    errors: 0,
                    next_id: 0,
                }),
                idle: Notify::new(),
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// The bus this scheduler emits on
    pub fn events(&self) -> &Arc<EventBus> {
        &self.shared.events
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.shared.events.subscribe()
    }

    /// Queue `work` for execution
    ///
    /// `work` is called once per attempt with a token that is cancelled when
    /// the attempt times out or the scheduler shuts down.
    pub fn submit<T, F, Fut>(&self, options: SubmitOptions, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        let config = &self.shared.config;
        let mut state = self.shared.state.lock();
        state.next_id += 1;
        let id = TaskId(state.next_id);
        let (job, handle) = new_job(id, work);

        if self.shared.shutdown.is_cancelled() {
            drop(state);
            debug!(%id, "Scheduler::submit: shut down, rejecting");
            job.reject(TaskError::ShutDown);
            return handle;
        }

        let task = QueuedTask {
            id,
            priority: options.priority,
            timeout: options.timeout.unwrap_or_else(|| config.timeout()),
            max_attempts: options.max_retries.unwrap_or(config.retry_attempts).max(1),
            attempts: 0,
            enqueued_at: Instant::now(),
            job,
        };
        debug!(%id, priority = task.priority, timeout = ?task.timeout, max_attempts = task.max_attempts, "Scheduler::submit: enqueuing");

        insert_by_priority(&mut state.waiting, task, |t| t.priority, false);
        let waiting = state.waiting.len();
        let executing = state.executing;
        drop(state);

        self.emit(SchedulerEvent::Enqueued {
            task_id: id,
            priority: options.priority,
            waiting,
            executing,
        });

        self.schedule();
        handle
    }

    /// Wait until nothing is waiting and nothing is executing
    ///
    /// Returns immediately when already idle.
    pub async fn drain(&self) {
        debug!("Scheduler::drain: called");
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a wakeup between the two is not lost
            notified.as_mut().enable();

            if self.is_idle() {
                debug!("Scheduler::drain: idle");
                return;
            }
            notified.await;
        }
    }

    /// Reject every waiting task with [`TaskError::QueueCleared`]
    ///
    /// Executing tasks are left alone. Returns the number rejected.
    pub fn clear(&self) -> usize {
        let cleared: Vec<QueuedTask> = self.shared.state.lock().waiting.drain(..).collect();
        let count = cleared.len();

        for task in cleared {
            debug!(id = %task.id, "Scheduler::clear: rejecting waiting task");
            task.job.reject(TaskError::QueueCleared);
        }

        info!(count, "Scheduler::clear: queue cleared");
        self.emit(SchedulerEvent::Cleared { count });
        self.notify_if_idle();
        count
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        SchedulerStats {
            waiting: state.waiting.len(),
            executing: state.executing,
            processed: state.processed,
            errors: state.errors,
            max_concurrent: self.shared.config.max_concurrent,
        }
    }

    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.lock();
        state.waiting.is_empty() && state.executing == 0
    }

    /// Drain for up to `grace`, then stop
    ///
    /// If draining does not finish in time, waiting tasks are cleared. In
    /// both cases every attempt's cancellation token is cancelled and later
    /// submissions are rejected. Returns whether the drain finished.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!(?grace, "Scheduler::shutdown: draining");
        let drained = tokio::time::timeout(grace, self.drain()).await.is_ok();

        if !drained {
            let stats = self.stats();
            warn!(
                waiting = stats.waiting,
                executing = stats.executing,
                "Scheduler::shutdown: grace period expired"
            );
            self.clear();
        }

        self.shared.shutdown.cancel();
        info!(drained, "Scheduler::shutdown: complete");
        drained
    }

    fn emit(&self, event: SchedulerEvent) {
        self.shared.events.emit(event);
    }

    fn notify_if_idle(&self) {
        if self.is_idle() {
            self.shared.idle.notify_waiters();
        }
    }

    /// Start waiting tasks while slots are free
    ///
    /// The capacity check and the slot increment happen under one lock, so
    /// concurrent callers can never over-admit.
    fn schedule(&self) {
        loop {
            let task = {
                let mut state = self.shared.state.lock();
                if state.executing >= self.shared.config.max_concurrent {
                    return;
                }
                let Some(task) = state.waiting.pop_front() else {
                    return;
                };
                state.executing += 1;
                task
            };
            self.spawn_attempt(task);
        }
    }

    /// Run one attempt on its own Tokio task
    ///
    /// Completion frees the slot and schedules again from that task, never
    /// from inside the caller's stack.
    fn spawn_attempt(&self, task: QueuedTask) {
        let scheduler = self.clone();

        tokio::spawn(async move {
            let QueuedTask {
                id,
                priority,
                timeout,
                max_attempts,
                attempts,
                enqueued_at,
                job,
            } = task;
            let attempt = attempts + 1;

            debug!(%id, attempt, "Scheduler: starting attempt");
            scheduler.emit(SchedulerEvent::Started { task_id: id, attempt });

            let started = Instant::now();
            let cancel = scheduler.shared.shutdown.child_token();

            match job.run(timeout, cancel).await {
                AttemptOutcome::Succeeded(deliver) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    {
                        let mut state = scheduler.shared.state.lock();
                        state.processed += 1;
                        state.executing -= 1;
                    }
                    deliver();
                    debug!(%id, attempt, duration_ms, "Scheduler: task succeeded");
                    scheduler.emit(SchedulerEvent::Succeeded {
                        task_id: id,
                        attempts: attempt,
                        duration_ms,
                    });
                }
                AttemptOutcome::Failed { job, error } if attempt < max_attempts => {
                    let delay = scheduler.shared.config.backoff(attempt);
                    warn!(%id, attempt, ?delay, %error, "Scheduler: attempt failed, retrying");
                    scheduler.emit(SchedulerEvent::Retrying {
                        task_id: id,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error: error.to_string(),
                    });

                    // The slot stays held through the backoff
                    let backed_off = tokio::select! {
                        biased;
                        _ = scheduler.shared.shutdown.cancelled() => false,
                        _ = tokio::time::sleep(delay) => true,
                    };

                    if backed_off {
                        let task = QueuedTask {
                            id,
                            priority,
                            timeout,
                            max_attempts,
                            attempts: attempt,
                            enqueued_at,
                            job,
                        };
                        let mut state = scheduler.shared.state.lock();
                        insert_by_priority(&mut state.waiting, task, |t| t.priority, true);
                        state.executing -= 1;
                    } else {
                        debug!(%id, "Scheduler: shut down during backoff");
                        scheduler.shared.state.lock().executing -= 1;
                        job.reject(TaskError::ShutDown);
                    }
                }
                AttemptOutcome::Failed { job, error } => {
                    let total_ms = enqueued_at.elapsed().as_millis() as u64;
                    {
                        let mut state = scheduler.shared.state.lock();
                        state.errors += 1;
                        state.executing -= 1;
                    }
                    error!(%id, attempts = attempt, total_ms, %error, "Scheduler: task failed permanently");
                    scheduler.emit(SchedulerEvent::Failed {
                        task_id: id,
                        attempts: attempt,
                        error: error.to_string(),
                        total_ms,
                    });
                    job.reject(TaskError::Exhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    });
                }
            }

            scheduler.notify_if_idle();
            scheduler.schedule();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scheduler(max_concurrent: usize) -> Scheduler {
        Scheduler::new(SchedulerConfig {
            max_concurrent,
            timeout_ms: 1_000,
            retry_attempts: 1,
            retry_delay_ms: 10,
        })
    }

    #[tokio::test]
    async fn test_submit_resolves_value() {
        let scheduler = scheduler(2);
        let handle = scheduler.submit(SubmitOptions::new(), |_| async { Ok::<_, eyre::Report>(21 * 2) });
        assert_eq!(handle.await, Ok(42));

        let stats = scheduler.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.executing, 0);
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.max_concurrent, 2);
    }

    #[tokio::test]
    async fn test_task_ids_increase() {
        let scheduler = scheduler(2);
        let a = scheduler.submit(SubmitOptions::new(), |_| async { Ok::<_, eyre::Report>(()) });
        let b = scheduler.submit(SubmitOptions::new(), |_| async { Ok::<_, eyre::Report>(()) });
        assert!(b.id() > a.id());
        let _ = a.await;
        let _ = b.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_limit() {
        let scheduler = scheduler(2);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scheduler.submit(SubmitOptions::new(), |_| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, eyre::Report>(())
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let stats = scheduler.stats();
        assert_eq!(stats.executing, 2);
        assert_eq!(stats.waiting, 2);

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(scheduler.stats().processed, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_failure_is_retried_then_succeeds() {
        let scheduler = Scheduler::new(SchedulerConfig {
            retry_attempts: 3,
            retry_delay_ms: 100,
            ..Default::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let handle = scheduler.submit(SubmitOptions::new(), move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    eyre::bail!("transient");
                }
                Ok::<_, eyre::Report>("ok")
            }
        });

        assert_eq!(handle.await, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.stats().errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_task_max_retries_override() {
        let scheduler = scheduler(1);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let handle = scheduler.submit(SubmitOptions::new().max_retries(4), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(eyre::eyre!("always")) }
        });

        let err = handle.await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err, TaskError::Exhausted { attempts: 4, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_retries_still_runs_once() {
        let scheduler = scheduler(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = scheduler.submit(SubmitOptions::new().max_retries(0), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(eyre::eyre!("nope")) }
        });
        assert!(handle.await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_uses_per_task_budget() {
        let scheduler = scheduler(1);
        let handle = scheduler.submit(SubmitOptions::new().timeout(Duration::from_millis(20)), |_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, eyre::Report>(())
        });

        let err = handle.await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("20ms"));
        assert_eq!(scheduler.stats().errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_attempt_sees_cancellation() {
        let scheduler = scheduler(1);
        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut tx = Some(tx);

        let handle = scheduler.submit(SubmitOptions::new().timeout(Duration::from_millis(20)), move |cancel| {
            // Hand the token to a watcher that outlives the attempt
            if let Some(tx) = tx.take() {
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    let _ = tx.send(());
                });
            }
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, eyre::Report>(())
            }
        });

        assert!(handle.await.is_err());
        assert!(rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_ordering_when_saturated() {
        let scheduler = scheduler(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let blocker = scheduler.submit(SubmitOptions::new(), |_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, eyre::Report>(())
        });

        let mut handles = Vec::new();
        for (name, priority) in [("low", 1), ("normal-1", 5), ("high", 10), ("normal-2", 5)] {
            let order = order.clone();
            handles.push(scheduler.submit(SubmitOptions::new().priority(priority), move |_| {
                order.lock().push(name);
                async { Ok::<_, eyre::Report>(()) }
            }));
        }

        blocker.await.unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec!["high", "normal-1", "normal-2", "low"]);
    }

    #[tokio::test]
    async fn test_drain_when_idle_returns_immediately() {
        let scheduler = scheduler(1);
        let result = tokio::time::timeout(Duration::from_millis(50), scheduler.drain()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_in_flight() {
        let scheduler = scheduler(2);
        let finished = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let finished = finished.clone();
            let _ = scheduler.submit(SubmitOptions::new(), move |_| {
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, eyre::Report>(())
                }
            });
        }

        scheduler.drain().await;

        assert_eq!(finished.load(Ordering::SeqCst), 5);
        let stats = scheduler.stats();
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.executing, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_only_rejects_waiting() {
        let scheduler = scheduler(1);
        let running = scheduler.submit(SubmitOptions::new(), |_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, eyre::Report>("finished")
        });
        let waiting_a = scheduler.submit(SubmitOptions::new(), |_| async { Ok::<_, eyre::Report>("a") });
        let waiting_b = scheduler.submit(SubmitOptions::new(), |_| async { Ok::<_, eyre::Report>("b") });

        tokio::task::yield_now().await;
        assert_eq!(scheduler.clear(), 2);

        assert_eq!(waiting_a.await, Err(TaskError::QueueCleared));
        assert_eq!(waiting_b.await, Err(TaskError::QueueCleared));
        assert_eq!(running.await, Ok("finished"));

        let stats = scheduler.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_clear_on_empty_queue() {
        let scheduler = scheduler(1);
        assert_eq!(scheduler.clear(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_later_submissions() {
        let scheduler = scheduler(1);
        assert!(scheduler.shutdown(Duration::from_secs(1)).await);

        let handle = scheduler.submit(SubmitOptions::new(), |_| async { Ok::<_, eyre::Report>(()) });
        assert_eq!(handle.await, Err(TaskError::ShutDown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_grace_expiry_clears_and_cancels() {
        let scheduler = scheduler(1);
        let stuck = scheduler.submit(SubmitOptions::new().timeout(Duration::from_secs(3600)), |cancel| async move {
            cancel.cancelled().await;
            Err::<(), _>(eyre::eyre!("cancelled"))
        });
        let queued = scheduler.submit(SubmitOptions::new(), |_| async { Ok::<_, eyre::Report>(()) });

        assert!(!scheduler.shutdown(Duration::from_millis(100)).await);
        assert_eq!(queued.await, Err(TaskError::QueueCleared));

        let err = stuck.await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_zero_max_concurrent_clamped() {
        let scheduler = scheduler(0);
        assert_eq!(scheduler.stats().max_concurrent, 1);
        let handle = scheduler.submit(SubmitOptions::new(), |_| async { Ok::<_, eyre::Report>(1) });
        assert_eq!(handle.await, Ok(1));
    }
}
