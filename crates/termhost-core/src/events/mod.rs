//! Broadcast event buses
//!
//! The supervisor publishes its own lifecycle events on one bus and forwards
//! backend domain notifications on another. Subscribers only see events
//! published after they subscribe; slow subscribers lag instead of blocking
//! the supervisor.

use crate::crash::{CrashRecord, FatalNotice};
use crate::protocol::DomainEvent;
use std::time::Duration;
use tokio::sync::broadcast;

/// Lifecycle and terminal I/O events emitted by the supervisor
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// A backend instance reported ready
    Ready { generation: u64, restarted: bool },

    /// Output chunk from a terminal (message-passing path)
    TerminalData { id: String, data: String },

    /// A terminal process exited
    TerminalExit { id: String, exit_code: Option<i32> },

    /// The backend reported a terminal-level error
    TerminalError { id: String, error: String },

    /// The backend exited non-cleanly
    Crashed { generation: u64, record: CrashRecord },

    /// A restart will be attempted after `delay`
    RestartScheduled { attempt: u32, delay: Duration },

    /// Launching the replacement backend failed
    RestartFailed { attempt: u32, error: String },

    /// The restart budget is exhausted
    Fatal(FatalNotice),

    /// The supervisor was disposed
    Disposed,
}

impl SupervisorEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::TerminalData { .. } => "terminal_data",
            Self::TerminalExit { .. } => "terminal_exit",
            Self::TerminalError { .. } => "terminal_error",
            Self::Crashed { .. } => "crashed",
            Self::RestartScheduled { .. } => "restart_scheduled",
            Self::RestartFailed { .. } => "restart_failed",
            Self::Fatal(_) => "fatal",
            Self::Disposed => "disposed",
        }
    }
}

/// Broadcast bus for a single event type
#[derive(Debug)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
    capacity: usize,
}

impl<E: Clone> EventBus<E> {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event, returning how many subscribers will see it
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(256)
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            capacity: self.capacity,
        }
    }
}

/// Bus carrying backend domain notifications to the rest of the application
pub type DomainEventBus = EventBus<DomainEvent>;

/// Bus carrying supervisor lifecycle events
pub type SupervisorEventBus = EventBus<SupervisorEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus: SupervisorEventBus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(SupervisorEvent::Disposed), 2);
        assert!(matches!(first.recv().await.unwrap(), SupervisorEvent::Disposed));
        assert!(matches!(second.recv().await.unwrap(), SupervisorEvent::Disposed));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus: DomainEventBus = EventBus::default();
        let sent = bus.publish(DomainEvent::TerminalRestored { id: "t1".into() });
        assert_eq!(sent, 0);
        assert_eq!(bus.capacity(), 256);
    }

    #[test]
    fn test_clone_shares_channel() {
        let bus: SupervisorEventBus = EventBus::new(4);
        let clone = bus.clone();
        let _rx = clone.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}
