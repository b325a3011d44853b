//! Scheduler notifications
//!
//! The scheduler reports every lifecycle transition as a [`SchedulerEvent`]
//! on an [`EventBus`]. Observers subscribe independently:
//!
//! ```text
//!                 Scheduler
//!                     │ emit
//!                     ▼
//!   ┌──────────────────────────────────────┐
//!   │               EVENT BUS              │
//!   │   (tokio::sync::broadcast channel)   │
//!   └──────────────────────────────────────┘
//!        │               │              │
//!        ▼               ▼              ▼
//!   tracing mirror   JSONL logger   analytics
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let scheduler = Scheduler::new(SchedulerConfig::default());
//! let tracer = spawn_event_tracer(scheduler.events());
//!
//! let mut rx = scheduler.subscribe();
//! while let Ok(event) = rx.recv().await {
//!     println!("{}: {:?}", event.event_type(), event.task_id());
//! }
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use logger::{EventLogger, read_events, spawn_event_logger, spawn_event_tracer};
pub use types::{EventLogEntry, SchedulerEvent};
