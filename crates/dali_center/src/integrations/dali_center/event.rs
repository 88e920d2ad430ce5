//! Panel button events.
//!
//! Each panel gets one event entity whose event types are derived from its
//! type code. Every key action also fires `dali_center_event` on the hub's
//! event bus, which is what device triggers listen to.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use strum::Display;
use strum::EnumString;
use tracing::debug;

use super::EVENT_TYPE;
use super::entity::Availability;
use super::entity::DaliEntity;
use super::entity::EntityError;
use super::entity::device_spec;
use super::gateway::GatewayCommand;
use super::gateway::GatewayEvent;
use super::model::Device;
use crate::engine::EntityCommand;
use crate::engine::Hub;
use crate::engine::device::DeviceSpec;
use crate::engine::entity::Entity;

/// Key action reported by a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ButtonEvent {
    Press,
    DoublePress,
    Hold,
    Rotate,
    Release,
}

impl ButtonEvent {
    pub fn from_dpid(dpid: u8) -> Option<Self> {
        match dpid {
            1 => Some(ButtonEvent::Press),
            2 => Some(ButtonEvent::DoublePress),
            3 => Some(ButtonEvent::Hold),
            4 => Some(ButtonEvent::Rotate),
            5 => Some(ButtonEvent::Release),
            _ => None,
        }
    }
}

struct PanelConfig {
    button_count: u8,
    events: &'static [ButtonEvent],
}

const KEY_EVENTS: &[ButtonEvent] = &[
    ButtonEvent::Press,
    ButtonEvent::Hold,
    ButtonEvent::DoublePress,
    ButtonEvent::Release,
];

const KNOB_EVENTS: &[ButtonEvent] = &[
    ButtonEvent::Press,
    ButtonEvent::DoublePress,
    ButtonEvent::Rotate,
];

fn panel_config(dev_type: &str) -> Option<PanelConfig> {
    let (button_count, events) = match dev_type {
        "0302" => (2, KEY_EVENTS),
        "0304" => (4, KEY_EVENTS),
        "0306" => (6, KEY_EVENTS),
        "0308" => (8, KEY_EVENTS),
        "0300" => (1, KNOB_EVENTS),
        _ => return None,
    };
    Some(PanelConfig {
        button_count,
        events,
    })
}

pub fn event_name(key_no: u8, event: ButtonEvent) -> String {
    format!("button_{}_{}", key_no, event)
}

/// Every event type a panel of this type can produce
pub fn panel_event_types(dev_type: &str) -> Vec<String> {
    let Some(config) = panel_config(dev_type) else {
        return vec![
            event_name(1, ButtonEvent::Press),
            event_name(1, ButtonEvent::DoublePress),
            event_name(1, ButtonEvent::Hold),
        ];
    };

    (1..=config.button_count)
        .flat_map(|key| config.events.iter().map(move |event| event_name(key, *event)))
        .collect()
}

pub struct PanelEvent {
    device: Device,
    unique_id: String,
    event_types: Vec<String>,
    availability: Availability,
    last_event: Option<String>,
    entity_id: Option<String>,
    hub: Option<Arc<Hub>>,
}

impl PanelEvent {
    pub fn new(device: Device) -> Self {
        Self {
            unique_id: format!("{}_panel_events", device.dev_id),
            event_types: panel_event_types(&device.dev_type),
            availability: Availability::for_device(&device),
            device,
            last_event: None,
            entity_id: None,
            hub: None,
        }
    }

    fn fire(&self, event_type: &str, rotate_value: Option<&serde_json::Value>) {
        let Some(hub) = &self.hub else {
            return;
        };
        let mut data = json!({
            "entity_id": self.entity_id,
            "event_type": event_type,
        });
        if let Some(value) = rotate_value {
            data["rotate_value"] = value.clone();
        }
        hub.bus.fire(EVENT_TYPE, data);
    }
}

impl Entity for PanelEvent {
    fn state_json(&self) -> serde_json::Value {
        json!(self.last_event)
    }

    fn platform(&self) -> &'static str {
        "event"
    }

    fn attributes_json(&self) -> serde_json::Value {
        json!({
            "device_class": "button",
            "event_types": self.event_types,
        })
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for PanelEvent {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> String {
        format!("{} Panel Buttons", self.device.name)
    }

    fn device(&self) -> DeviceSpec {
        DeviceSpec {
            model: Some(format!("Panel Type {}", self.device.dev_type)),
            ..device_spec(&self.device)
        }
    }

    fn capabilities(&self) -> serde_json::Value {
        json!({ "event_types": self.event_types })
    }

    fn attached(&mut self, entity_id: &str, hub: &Arc<Hub>) {
        self.entity_id = Some(entity_id.to_string());
        self.hub = Some(hub.clone());
    }

    fn initial_commands(&self) -> Vec<GatewayCommand> {
        vec![GatewayCommand::ReadStatus {
            dev_id: self.device.dev_id.clone(),
        }]
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        let GatewayEvent::DeviceStatus { dev_id, properties } = event else {
            return self.availability.update(event);
        };
        if *dev_id != self.device.dev_id {
            return false;
        }

        let mut changed = false;
        for property in properties {
            let (Some(event), Some(key_no)) = (ButtonEvent::from_dpid(property.dpid), property.key_no)
            else {
                debug!(
                    "Unknown event for {}: dpid={}, keyNo={:?}, value={}",
                    self.unique_id, property.dpid, property.key_no, property.value
                );
                continue;
            };

            let name = event_name(key_no, event);
            debug!("Panel event triggered: {} (device={})", name, self.unique_id);
            let rotate_value = (event == ButtonEvent::Rotate && !property.value.is_null())
                .then_some(&property.value);
            self.fire(&name, rotate_value);
            self.last_event = Some(name);
            changed = true;
        }
        changed
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        Err(EntityError::unsupported("event", command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::dali_center::gateway::DeviceProperty;

    fn press(dev_id: &str, dpid: u8, key_no: Option<u8>, value: serde_json::Value) -> GatewayEvent {
        GatewayEvent::DeviceStatus {
            dev_id: dev_id.to_string(),
            properties: vec![DeviceProperty {
                dpid,
                key_no,
                value,
            }],
        }
    }

    #[test]
    fn test_event_types_by_panel_type() {
        let two_key = panel_event_types("0302");
        assert_eq!(two_key.len(), 8);
        assert_eq!(&two_key[..4], &[
            "button_1_press",
            "button_1_hold",
            "button_1_double_press",
            "button_1_release"
        ]);
        assert_eq!(two_key[7], "button_2_release");

        assert_eq!(panel_event_types("0308").len(), 32);
        assert_eq!(
            panel_event_types("0300"),
            vec!["button_1_press", "button_1_double_press", "button_1_rotate"]
        );
        assert_eq!(
            panel_event_types("0399"),
            vec!["button_1_press", "button_1_double_press", "button_1_hold"]
        );
    }

    #[tokio::test]
    async fn test_key_press_fires_bus_event() {
        let hub = Arc::new(Hub::new());
        let mut events = hub.bus.subscribe();
        let device = Device::new("GW1", "0304", 0, 12, "Kitchen Panel");
        let mut panel = PanelEvent::new(device.clone());
        panel.attached("event.kitchen_panel_buttons", &hub);

        assert!(panel.handle_gateway_event(&press(&device.dev_id, 1, Some(3), json!(1))));
        assert_eq!(panel.state_json(), json!("button_3_press"));

        let fired = events.recv().await.unwrap();
        assert_eq!(fired.event_type, "dali_center_event");
        assert_eq!(
            fired.data,
            json!({
                "entity_id": "event.kitchen_panel_buttons",
                "event_type": "button_3_press",
            })
        );
    }

    #[tokio::test]
    async fn test_rotation_carries_value() {
        let hub = Arc::new(Hub::new());
        let mut events = hub.bus.subscribe();
        let device = Device::new("GW1", "0300", 0, 13, "Knob");
        let mut panel = PanelEvent::new(device.clone());
        panel.attached("event.knob_panel_buttons", &hub);

        panel.handle_gateway_event(&press(&device.dev_id, 4, Some(1), json!(-3)));

        let fired = events.recv().await.unwrap();
        assert_eq!(fired.data["event_type"], "button_1_rotate");
        assert_eq!(fired.data["rotate_value"], json!(-3));
    }

    #[test]
    fn test_unknown_dpid_is_skipped() {
        let device = Device::new("GW1", "0304", 0, 12, "Panel");
        let mut panel = PanelEvent::new(device.clone());

        assert!(!panel.handle_gateway_event(&press(&device.dev_id, 99, Some(1), json!(1))));
        assert!(!panel.handle_gateway_event(&press(&device.dev_id, 1, None, json!(1))));
        assert_eq!(panel.state_json(), serde_json::Value::Null);
    }
}
