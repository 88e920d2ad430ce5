use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::entity::Availability;
use super::entity::DaliEntity;
use super::entity::EntityError;
use super::entity::device_spec;
use super::gateway::Gateway;
use super::gateway::GatewayCommand;
use super::gateway::GatewayEvent;
use super::model::Device;
use crate::engine::EntityCommand;
use crate::engine::device::DeviceSpec;
use crate::engine::entity::Entity;

/// Turns an illuminance sensor's measurements on and off
pub struct SensorEnableSwitch {
    device: Device,
    gateway: Arc<dyn Gateway>,
    unique_id: String,
    availability: Availability,
    is_on: bool,
}

impl SensorEnableSwitch {
    pub fn new(device: Device, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            unique_id: format!("{}_sensor_enable", device.dev_id),
            availability: Availability::for_device(&device),
            device,
            gateway,
            is_on: true,
        }
    }
}

impl Entity for SensorEnableSwitch {
    fn state_json(&self) -> serde_json::Value {
        json!(if self.is_on { "on" } else { "off" })
    }

    fn platform(&self) -> &'static str {
        "switch"
    }

    fn attributes_json(&self) -> serde_json::Value {
        let mut attributes = self.device.attributes();
        attributes["entity_category"] = json!("config");
        attributes
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for SensorEnableSwitch {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> String {
        format!("{} Sensor Enable", self.device.name)
    }

    fn device(&self) -> DeviceSpec {
        device_spec(&self.device)
    }

    fn initial_commands(&self) -> Vec<GatewayCommand> {
        vec![GatewayCommand::GetSensorEnabled {
            dev_id: self.device.dev_id.clone(),
        }]
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        match event {
            GatewayEvent::SensorOnOff { dev_id, enabled } if *dev_id == self.device.dev_id => {
                self.is_on = *enabled;
                true
            }
            other => self.availability.update(other),
        }
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        let enabled = match command {
            EntityCommand::TurnOn { .. } => true,
            EntityCommand::TurnOff => false,
            other => return Err(EntityError::unsupported("switch", other)),
        };
        self.gateway
            .send(GatewayCommand::SetSensorEnabled {
                dev_id: self.device.dev_id.clone(),
                enabled,
            })
            .await?;
        self.is_on = enabled;
        Ok(())
    }
}
