use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use strum::Display;
use strum::EnumIter;
use strum::IntoEnumIterator;

use super::DOMAIN;
use super::entity::Availability;
use super::entity::DaliEntity;
use super::entity::EntityError;
use super::gateway::DeviceParameters;
use super::gateway::Gateway;
use super::gateway::GatewayCommand;
use super::gateway::GatewayEvent;
use super::model::Device;
use crate::engine::EntityCommand;
use crate::engine::device::DeviceSpec;
use crate::engine::entity::Entity;

/// A configurable light parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceParam {
    FadeTime,
    FadeRate,
    MinBrightness,
    MaxBrightness,
}

impl DeviceParam {
    pub fn label(self) -> &'static str {
        match self {
            DeviceParam::FadeTime => "Fade Time",
            DeviceParam::FadeRate => "Fade Rate",
            DeviceParam::MinBrightness => "Minimum Brightness",
            DeviceParam::MaxBrightness => "Maximum Brightness",
        }
    }

    /// Inclusive range; brightness 10..=1000 stands for 1%..=100%
    pub fn range(self) -> (u16, u16) {
        match self {
            DeviceParam::FadeTime | DeviceParam::FadeRate => (0, 15),
            DeviceParam::MinBrightness | DeviceParam::MaxBrightness => (10, 1000),
        }
    }

    fn get(self, params: &DeviceParameters) -> Option<u16> {
        match self {
            DeviceParam::FadeTime => params.fade_time,
            DeviceParam::FadeRate => params.fade_rate,
            DeviceParam::MinBrightness => params.min_brightness,
            DeviceParam::MaxBrightness => params.max_brightness,
        }
    }

    fn only(self, value: u16) -> DeviceParameters {
        let mut params = DeviceParameters::default();
        match self {
            DeviceParam::FadeTime => params.fade_time = Some(value),
            DeviceParam::FadeRate => params.fade_rate = Some(value),
            DeviceParam::MinBrightness => params.min_brightness = Some(value),
            DeviceParam::MaxBrightness => params.max_brightness = Some(value),
        }
        params
    }
}

pub struct ParameterNumber {
    device: Device,
    gateway: Arc<dyn Gateway>,
    param: DeviceParam,
    unique_id: String,
    availability: Availability,
    value: Option<u16>,
}

impl ParameterNumber {
    pub fn new(device: Device, gateway: Arc<dyn Gateway>, param: DeviceParam) -> Self {
        Self {
            unique_id: format!("{}_{}", device.unique_id, param),
            availability: Availability::for_device(&device),
            device,
            gateway,
            param,
            value: None,
        }
    }

    /// One number per parameter
    pub fn all_for(device: &Device, gateway: &Arc<dyn Gateway>) -> Vec<Self> {
        DeviceParam::iter()
            .map(|param| Self::new(device.clone(), gateway.clone(), param))
            .collect()
    }
}

impl Entity for ParameterNumber {
    fn state_json(&self) -> serde_json::Value {
        json!(self.value)
    }

    fn platform(&self) -> &'static str {
        "number"
    }

    fn attributes_json(&self) -> serde_json::Value {
        let (min, max) = self.param.range();
        let mut attributes = self.device.attributes();
        attributes["min"] = json!(min);
        attributes["max"] = json!(max);
        attributes["step"] = json!(1);
        attributes
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for ParameterNumber {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> String {
        format!("{} {}", self.device.name, self.param.label())
    }

    fn device(&self) -> DeviceSpec {
        DeviceSpec::new((DOMAIN.to_string(), self.device.dev_id.clone()))
    }

    fn initial_commands(&self) -> Vec<GatewayCommand> {
        vec![GatewayCommand::GetDeviceParameters {
            dev_id: self.device.dev_id.clone(),
        }]
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        match event {
            GatewayEvent::DeviceParameters { dev_id, params } if *dev_id == self.device.dev_id => {
                match self.param.get(params) {
                    Some(value) => {
                        self.value = Some(value);
                        true
                    }
                    None => false,
                }
            }
            other => self.availability.update(other),
        }
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        let EntityCommand::SetValue { value } = command else {
            return Err(EntityError::unsupported("number", command));
        };
        let (min, max) = self.param.range();
        if !(min as f64..=max as f64).contains(value) {
            return Err(EntityError::OutOfRange(*value));
        }

        let dev_id = self.device.dev_id.clone();
        self.gateway
            .send(GatewayCommand::SetDeviceParameters {
                dev_id: dev_id.clone(),
                params: self.param.only(*value as u16),
            })
            .await?;
        // Read back so every parameter entity sees the stored values
        self.gateway
            .send(GatewayCommand::GetDeviceParameters { dev_id })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::dali_center::gateway::MockGateway;

    #[test]
    fn test_one_number_per_parameter() {
        let gateway: Arc<dyn Gateway> = Arc::new(MockGateway::new("GW1"));
        let device = Device::new("GW1", "0102", 0, 1, "Desk");

        let numbers = ParameterNumber::all_for(&device, &gateway);
        let ids: Vec<&str> = numbers.iter().map(|n| n.unique_id()).collect();
        assert_eq!(
            ids,
            vec![
                format!("{}_fade_time", device.unique_id),
                format!("{}_fade_rate", device.unique_id),
                format!("{}_min_brightness", device.unique_id),
                format!("{}_max_brightness", device.unique_id),
            ]
        );
        assert_eq!(numbers[2].name(), "Desk Minimum Brightness");
    }

    #[tokio::test]
    async fn test_set_value_writes_then_reads_back() {
        let gateway = Arc::new(MockGateway::new("GW1"));
        let device = Device::new("GW1", "0102", 0, 1, "Desk");
        let mut fade = ParameterNumber::new(device.clone(), gateway.clone(), DeviceParam::FadeTime);

        fade.handle_command(&EntityCommand::SetValue { value: 7.0 })
            .await
            .unwrap();
        assert!(matches!(
            fade.handle_command(&EntityCommand::SetValue { value: 16.0 }).await,
            Err(EntityError::OutOfRange(_))
        ));

        assert_eq!(
            gateway.sent(),
            vec![
                GatewayCommand::SetDeviceParameters {
                    dev_id: device.dev_id.clone(),
                    params: DeviceParameters {
                        fade_time: Some(7),
                        ..Default::default()
                    },
                },
                GatewayCommand::GetDeviceParameters {
                    dev_id: device.dev_id.clone()
                },
            ]
        );
    }

    #[test]
    fn test_parameter_report_updates_matching_param_only() {
        let gateway = Arc::new(MockGateway::new("GW1"));
        let device = Device::new("GW1", "0102", 0, 1, "Desk");
        let mut max = ParameterNumber::new(device.clone(), gateway, DeviceParam::MaxBrightness);

        assert!(!max.handle_gateway_event(&GatewayEvent::DeviceParameters {
            dev_id: device.dev_id.clone(),
            params: DeviceParameters {
                fade_time: Some(3),
                ..Default::default()
            },
        }));
        assert!(max.handle_gateway_event(&GatewayEvent::DeviceParameters {
            dev_id: device.dev_id.clone(),
            params: DeviceParameters {
                max_brightness: Some(900),
                ..Default::default()
            },
        }));
        assert_eq!(max.state_json(), json!(900));
    }
}
