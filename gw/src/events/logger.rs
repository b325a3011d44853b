//! Event sinks - JSONL persistence and tracing mirror
//!
//! The EventLogger subscribes to the EventBus and appends every event to a
//! JSONL file for analytics and replay. The tracer re-emits events through
//! `tracing` so they land in the regular log.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, SchedulerEvent};

/// Event logger that appends events to one JSONL file
pub struct EventLogger {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl EventLogger {
    /// Open (or create) the log file for appending
    pub fn open(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "EventLogger::open: opening log file");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one event as a JSON line
    pub fn write_event(&mut self, event: &SchedulerEvent) -> eyre::Result<()> {
        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Consume events until the bus is dropped
    ///
    /// This is meant to be spawned as a background task.
    pub async fn run(mut self, mut rx: broadcast::Receiver<SchedulerEvent>) {
        debug!(path = ?self.path, "EventLogger::run: starting event logger");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(error = %e, "EventLogger: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        let _ = self.writer.flush();
        info!(written = self.written, path = ?self.path, "EventLogger: stopped");
    }
}

/// Read events back from a JSONL log, skipping unparseable lines
pub fn read_events(path: impl AsRef<Path>) -> eyre::Result<Vec<EventLogEntry>> {
    let path = path.as_ref();
    debug!(?path, "read_events: reading log file");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_events: loaded entries");
    Ok(entries)
}

/// Spawn a JSONL logger for everything emitted on `bus` from now on
pub fn spawn_event_logger(bus: &EventBus, path: impl AsRef<Path>) -> eyre::Result<tokio::task::JoinHandle<()>> {
    let logger = EventLogger::open(path)?;
    let rx = bus.subscribe();
    Ok(tokio::spawn(logger.run(rx)))
}

/// Spawn a task that mirrors scheduler events into `tracing`
pub fn spawn_event_tracer(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => trace_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "event tracer: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn trace_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::Enqueued {
            task_id,
            priority,
            waiting,
            executing,
        } => debug!(%task_id, priority, waiting, executing, "task enqueued"),
        SchedulerEvent::Started { task_id, attempt } => debug!(%task_id, attempt, "task started"),
        SchedulerEvent::Succeeded {
            task_id,
            attempts,
            duration_ms,
        } => info!(%task_id, attempts, duration_ms, "task succeeded"),
        SchedulerEvent::Retrying {
            task_id,
            attempt,
            delay_ms,
            error,
        } => warn!(%task_id, attempt, delay_ms, %error, "task retrying"),
        SchedulerEvent::Failed {
            task_id,
            attempts,
            error,
            total_ms,
        } => error!(%task_id, attempts, total_ms, %error, "task failed"),
        SchedulerEvent::Cleared { count } => info!(count, "queue cleared"),
    }
}
