use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::DOMAIN;
use super::entity::Availability;
use super::entity::DaliEntity;
use super::entity::EntityError;
use super::entity::device_spec;
use super::gateway::GatewayCommand;
use super::gateway::GatewayEvent;
use super::gateway::MotionState;
use super::model::Device;
use crate::engine::EntityCommand;
use crate::engine::device::DeviceSpec;
use crate::engine::entity::Entity;

/// Energy consumed by a light, in Wh
pub struct EnergySensor {
    device: Device,
    unique_id: String,
    availability: Availability,
    energy_wh: f64,
}

impl EnergySensor {
    pub fn new(device: Device) -> Self {
        Self {
            unique_id: format!("{}_energy", device.unique_id),
            availability: Availability::for_device(&device),
            device,
            energy_wh: 0.0,
        }
    }
}

impl Entity for EnergySensor {
    fn state_json(&self) -> serde_json::Value {
        json!(self.energy_wh)
    }

    fn platform(&self) -> &'static str {
        "sensor"
    }

    fn attributes_json(&self) -> serde_json::Value {
        let mut attributes = self.device.attributes();
        attributes["unit_of_measurement"] = json!("Wh");
        attributes["device_class"] = json!("energy");
        attributes
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for EnergySensor {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> String {
        format!("{} Energy", self.device.name)
    }

    fn device(&self) -> DeviceSpec {
        DeviceSpec::new((DOMAIN.to_string(), self.device.dev_id.clone()))
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        match event {
            GatewayEvent::EnergyReport { dev_id, energy_wh } if *dev_id == self.device.dev_id => {
                self.energy_wh = *energy_wh;
                true
            }
            other => self.availability.update(other),
        }
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        Err(EntityError::unsupported("sensor", command))
    }
}

pub struct MotionSensor {
    device: Device,
    availability: Availability,
    state: MotionState,
}

impl MotionSensor {
    pub fn new(device: Device) -> Self {
        Self {
            availability: Availability::for_device(&device),
            device,
            state: MotionState::default(),
        }
    }
}

impl Entity for MotionSensor {
    fn state_json(&self) -> serde_json::Value {
        json!(self.state)
    }

    fn platform(&self) -> &'static str {
        "sensor"
    }

    fn attributes_json(&self) -> serde_json::Value {
        let mut attributes = self.device.attributes();
        attributes["device_class"] = json!("enum");
        attributes["options"] = json!([
            MotionState::NoMotion,
            MotionState::Motion,
            MotionState::Vacant,
            MotionState::Presence,
            MotionState::Occupancy,
        ]);
        attributes
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for MotionSensor {
    fn unique_id(&self) -> &str {
        &self.device.unique_id
    }

    fn name(&self) -> String {
        format!("{} State", self.device.name)
    }

    fn device(&self) -> DeviceSpec {
        device_spec(&self.device)
    }

    fn initial_commands(&self) -> Vec<GatewayCommand> {
        vec![GatewayCommand::ReadStatus {
            dev_id: self.device.dev_id.clone(),
        }]
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        match event {
            GatewayEvent::MotionStatus { dev_id, state } if *dev_id == self.device.unique_id => {
                self.state = *state;
                true
            }
            other => self.availability.update(other),
        }
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        Err(EntityError::unsupported("sensor", command))
    }
}

/// Light level in lux. Cleared while the sensor is disabled.
pub struct IlluminanceSensor {
    device: Device,
    availability: Availability,
    lux: Option<f64>,
    enabled: bool,
}

impl IlluminanceSensor {
    pub fn new(device: Device) -> Self {
        Self {
            availability: Availability::for_device(&device),
            device,
            lux: None,
            enabled: true,
        }
    }
}

impl Entity for IlluminanceSensor {
    fn state_json(&self) -> serde_json::Value {
        json!(self.lux)
    }

    fn platform(&self) -> &'static str {
        "sensor"
    }

    fn attributes_json(&self) -> serde_json::Value {
        let mut attributes = self.device.attributes();
        attributes["unit_of_measurement"] = json!("lx");
        attributes["device_class"] = json!("illuminance");
        attributes
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for IlluminanceSensor {
    fn unique_id(&self) -> &str {
        &self.device.unique_id
    }

    fn name(&self) -> String {
        format!("{} State", self.device.name)
    }

    fn device(&self) -> DeviceSpec {
        device_spec(&self.device)
    }

    fn initial_commands(&self) -> Vec<GatewayCommand> {
        vec![GatewayCommand::ReadStatus {
            dev_id: self.device.dev_id.clone(),
        }]
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        match event {
            GatewayEvent::IlluminanceStatus {
                dev_id,
                lux,
                is_valid,
            } if *dev_id == self.device.unique_id => {
                if !is_valid {
                    debug!(
                        "Illuminance {} value is not valid: {} lux",
                        self.device.unique_id, lux
                    );
                    return false;
                }
                self.lux = Some(*lux);
                true
            }
            GatewayEvent::SensorOnOff { dev_id, enabled } if *dev_id == self.device.unique_id => {
                self.enabled = *enabled;
                if !self.enabled {
                    self.lux = None;
                }
                true
            }
            other => self.availability.update(other),
        }
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        Err(EntityError::unsupported("sensor", command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_report() {
        let device = Device::new("GW1", "0102", 0, 1, "Desk");
        let mut sensor = EnergySensor::new(device.clone());
        assert_eq!(sensor.unique_id(), format!("{}_energy", device.unique_id));
        assert_eq!(sensor.state_json(), json!(0.0));

        assert!(sensor.handle_gateway_event(&GatewayEvent::EnergyReport {
            dev_id: device.dev_id.clone(),
            energy_wh: 12.5,
        }));
        assert_eq!(sensor.state_json(), json!(12.5));

        assert!(!sensor.handle_gateway_event(&GatewayEvent::EnergyReport {
            dev_id: "other".to_string(),
            energy_wh: 99.0,
        }));
    }

    #[test]
    fn test_motion_state() {
        let device = Device::new("GW1", "0201", 0, 4, "Hall Motion");
        let mut sensor = MotionSensor::new(device.clone());
        assert_eq!(sensor.state_json(), json!("no_motion"));

        sensor.handle_gateway_event(&GatewayEvent::MotionStatus {
            dev_id: device.unique_id.clone(),
            state: MotionState::Presence,
        });
        assert_eq!(sensor.state_json(), json!("presence"));
    }

    #[test]
    fn test_illuminance_ignores_invalid_and_clears_when_disabled() {
        let device = Device::new("GW1", "0202", 0, 5, "Lux");
        let mut sensor = IlluminanceSensor::new(device.clone());
        let reading = |lux, is_valid| GatewayEvent::IlluminanceStatus {
            dev_id: device.unique_id.clone(),
            lux,
            is_valid,
        };

        assert!(sensor.handle_gateway_event(&reading(310.0, true)));
        assert!(!sensor.handle_gateway_event(&reading(9999.0, false)));
        assert_eq!(sensor.state_json(), json!(310.0));

        sensor.handle_gateway_event(&GatewayEvent::SensorOnOff {
            dev_id: device.unique_id.clone(),
            enabled: false,
        });
        assert_eq!(sensor.state_json(), serde_json::Value::Null);
    }
}
