//! Splits inbound backend messages into domain notifications and transport
//! traffic
//!
//! Domain events are published on the [`DomainEventBus`] and consumed here;
//! everything else is handed back for the supervisor's transport handling.
//! Adding a new domain notification only touches [`DomainEvent`].

use crate::events::DomainEventBus;
use crate::protocol::{DomainEvent, InboundMessage, TransportMessage};
use tracing::trace;

/// Router installed in front of the supervisor's transport switch
#[derive(Debug, Clone)]
pub struct DomainEventRouter {
    bus: DomainEventBus,
    forwarded: u64,
}

impl DomainEventRouter {
    pub fn new(bus: DomainEventBus) -> Self {
        Self { bus, forwarded: 0 }
    }

    /// Route one message; `Some` means the caller still has to handle it
    pub fn route(&mut self, message: InboundMessage) -> Option<TransportMessage> {
        match message {
            InboundMessage::Domain(event) => {
                self.forward(event);
                None
            }
            InboundMessage::Transport(message) => Some(message),
        }
    }

    fn forward(&mut self, event: DomainEvent) {
        trace!(
            event_type = event.event_type(),
            terminal = event.terminal_id(),
            "forwarding domain event"
        );
        self.forwarded += 1;
        self.bus.publish(event);
    }

    /// Number of domain events forwarded so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}
