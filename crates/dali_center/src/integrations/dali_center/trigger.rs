//! Device triggers for panel buttons.
//!
//! A panel's event entity advertises its event types as a capability; each
//! one becomes a trigger. Attaching a trigger listens on the event bus for
//! matching `dali_center_event`s.

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use tracing::warn;

use super::DOMAIN;
use super::EVENT_TYPE;
use crate::engine::Event;
use crate::engine::Hub;

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("invalid trigger config: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("trigger platform must be \"device\", got {0:?}")]
    WrongPlatform(String),

    #[error("trigger domain must be \"dali_center\", got {0:?}")]
    WrongDomain(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTrigger {
    pub platform: String,
    pub device_id: String,
    pub domain: String,
    pub entity_id: String,
    #[serde(rename = "type")]
    pub trigger_type: String,
}

/// Every trigger the event entities of a device offer
pub fn get_triggers(hub: &Hub, device_id: &str) -> Vec<DeviceTrigger> {
    let mut triggers = Vec::new();
    for entry in hub
        .entities
        .entries_for_device(device_id)
        .into_iter()
        .filter(|e| e.domain == "event" && e.platform == DOMAIN)
    {
        let Some(event_types) = entry
            .capabilities
            .get("event_types")
            .and_then(|v| v.as_array())
            .filter(|types| !types.is_empty())
        else {
            debug!("No event_types found for {}, skipping", entry.entity_id);
            continue;
        };

        triggers.extend(event_types.iter().filter_map(|t| t.as_str()).map(|event_type| {
            DeviceTrigger {
                platform: "device".to_string(),
                device_id: device_id.to_string(),
                domain: DOMAIN.to_string(),
                entity_id: entry.entity_id.clone(),
                trigger_type: event_type.to_string(),
            }
        }));
    }
    triggers
}

pub fn validate_trigger_config(config: serde_json::Value) -> Result<DeviceTrigger, TriggerError> {
    let trigger: DeviceTrigger = serde_json::from_value(config)?;
    if trigger.platform != "device" {
        return Err(TriggerError::WrongPlatform(trigger.platform));
    }
    if trigger.domain != DOMAIN {
        return Err(TriggerError::WrongDomain(trigger.domain));
    }
    Ok(trigger)
}

/// Matching events for one attached trigger
pub struct TriggerListener {
    trigger: DeviceTrigger,
    rx: broadcast::Receiver<Event>,
}

impl TriggerListener {
    fn matches(&self, event: &Event) -> bool {
        event.event_type == EVENT_TYPE
            && event.data.get("entity_id").and_then(|v| v.as_str())
                == Some(self.trigger.entity_id.as_str())
            && event.data.get("event_type").and_then(|v| v.as_str())
                == Some(self.trigger.trigger_type.as_str())
    }

    /// Wait for the next matching event. `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        "Trigger {} on {} missed {} events",
                        self.trigger.trigger_type, self.trigger.entity_id, n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

pub fn attach_trigger(hub: &Hub, trigger: DeviceTrigger) -> TriggerListener {
    debug!(
        "Setting up device trigger: entity={}, event_type={}",
        trigger.entity_id, trigger.trigger_type
    );
    TriggerListener {
        rx: hub.bus.subscribe(),
        trigger,
    }
}
