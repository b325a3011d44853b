//! Event Bus - pub/sub for scheduler notifications
//!
//! The EventBus uses a tokio broadcast channel so any number of observers
//! (tracing mirror, JSONL logger, analytics) can follow scheduler activity.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::SchedulerEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Fan-out channel for [`SchedulerEvent`]s
pub struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped, and a full
    /// channel overwrites the oldest event.
    pub fn emit(&self, event: SchedulerEvent) {
        debug!(event_type = event.event_type(), task_id = ?event.task_id(), "EventBus::emit");
        // No subscribers is OK
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskId;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(SchedulerEvent::Started {
            task_id: TaskId(1),
            attempt: 1,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "Started");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(SchedulerEvent::Cleared { count: 0 });
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(SchedulerEvent::Cleared { count: 3 });

        assert_eq!(rx1.recv().await.unwrap(), SchedulerEvent::Cleared { count: 3 });
        assert_eq!(rx2.recv().await.unwrap(), SchedulerEvent::Cleared { count: 3 });
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for count in 0..5 {
            bus.emit(SchedulerEvent::Cleared { count });
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
    }
}
