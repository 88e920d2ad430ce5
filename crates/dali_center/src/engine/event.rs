use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the event bus before slow listeners start lagging
const EVENT_BUS_CAPACITY: usize = 256;

/// An event fired on the bus, e.g. a panel button press.
///
/// Distinct from `FromIntegrationMessage` (transport-level): events are what
/// automations and device triggers listen to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event_type: String,
    pub data: serde_json::Value,
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    pub fn fire(&self, event_type: impl Into<String>, data: serde_json::Value) {
        let event = Event {
            event_type: event_type.into(),
            data,
        };
        trace!(event_type = %event.event_type, "firing event");
        // No listeners is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
