//! Type-safe message system for the engine
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use serde::Deserialize;

use super::state::EntityState;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
        state: EntityState,
    },

    /// An entity was removed (device gone from the bus, entry unloaded, etc.)
    EntityRemoved { entity_id: String },

    /// An entity's state or availability changed
    EntityStateChanged {
        entity_id: String,
        state: EntityState,
    },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone)]
pub enum ToIntegrationMessage {
    /// Command aimed at one entity
    EntityCommand {
        entity_id: String,
        command: EntityCommand,
    },

    /// Service call on the integration's domain, e.g. `dali_center.scan_bus`
    CallService {
        service: String,
        data: serde_json::Value,
    },
}

/// What an entity can be asked to do
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EntityCommand {
    TurnOn {
        #[serde(default)]
        brightness: Option<u8>,
        #[serde(default)]
        color_temp_kelvin: Option<u16>,
        #[serde(default)]
        hs_color: Option<(f64, f64)>,
        #[serde(default)]
        rgbw_color: Option<(u8, u8, u8, u8)>,
    },
    TurnOff,
    Press,
    SetValue {
        value: f64,
    },
    Activate,
}

impl EntityCommand {
    /// Plain turn-on with no brightness or colour
    pub fn turn_on() -> Self {
        EntityCommand::TurnOn {
            brightness: None,
            color_temp_kelvin: None,
            hs_color: None,
            rgbw_color: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_commands() {
        let cmd: EntityCommand =
            serde_json::from_str(r#"{"command": "turn_on", "brightness": 128}"#).unwrap();
        assert_eq!(
            cmd,
            EntityCommand::TurnOn {
                brightness: Some(128),
                color_temp_kelvin: None,
                hs_color: None,
                rgbw_color: None,
            }
        );

        let cmd: EntityCommand =
            serde_json::from_str(r#"{"command": "set_value", "value": 12}"#).unwrap();
        assert_eq!(cmd, EntityCommand::SetValue { value: 12.0 });

        let cmd: EntityCommand = serde_json::from_str(r#"{"command": "press"}"#).unwrap();
        assert_eq!(cmd, EntityCommand::Press);
    }
}
