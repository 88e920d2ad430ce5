use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use tracing::info;

use super::entity::Availability;
use super::entity::DaliEntity;
use super::entity::EntityError;
use super::entity::device_spec;
use super::entity::gateway_ref;
use super::gateway::Gateway;
use super::gateway::GatewayCommand;
use super::gateway::GatewayEvent;
use super::model::Device;
use super::scan::ScanLauncher;
use crate::engine::EntityCommand;
use crate::engine::device::DeviceSpec;
use crate::engine::entity::Entity;

fn require_press(entity: &'static str, command: &EntityCommand) -> Result<(), EntityError> {
    match command {
        EntityCommand::Press => Ok(()),
        other => Err(EntityError::unsupported(entity, other)),
    }
}

pub struct RestartButton {
    gateway: Arc<dyn Gateway>,
    unique_id: String,
    availability: Availability,
}

impl RestartButton {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let gw_sn = gateway.serial_number();
        Self {
            unique_id: format!("{}_restart", gw_sn),
            availability: Availability::for_gateway(gw_sn),
            gateway,
        }
    }
}

impl Entity for RestartButton {
    fn state_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn platform(&self) -> &'static str {
        "button"
    }

    fn attributes_json(&self) -> serde_json::Value {
        json!({"entity_category": "diagnostic"})
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for RestartButton {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> String {
        format!("{} Restart", self.gateway.name())
    }

    fn device(&self) -> DeviceSpec {
        gateway_ref(self.gateway.serial_number())
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        self.availability.update(event)
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        require_press("restart button", command)?;
        info!("Restarting gateway {}", self.gateway.serial_number());
        self.gateway.send(GatewayCommand::Restart).await?;
        Ok(())
    }
}

/// Starts or stops bus scans; only one of the pair is available at a time
pub struct ScanButton {
    launcher: Arc<ScanLauncher>,
    unique_id: String,
    gw_sn: String,
    stop: bool,
    scanning: bool,
    availability: Availability,
}

impl ScanButton {
    pub fn scan(launcher: Arc<ScanLauncher>) -> Self {
        Self::build(launcher, false)
    }

    pub fn stop(launcher: Arc<ScanLauncher>) -> Self {
        Self::build(launcher, true)
    }

    fn build(launcher: Arc<ScanLauncher>, stop: bool) -> Self {
        let gw_sn = launcher.runtime().gw_sn().to_string();
        let suffix = if stop { "stop_scan" } else { "scan_bus" };
        Self {
            unique_id: format!("{}_{}", gw_sn, suffix),
            availability: Availability::for_gateway(&gw_sn),
            scanning: launcher.is_scanning(),
            gw_sn,
            stop,
            launcher,
        }
    }
}

impl Entity for ScanButton {
    fn state_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn platform(&self) -> &'static str {
        "button"
    }

    fn attributes_json(&self) -> serde_json::Value {
        json!({"entity_category": "config"})
    }

    fn available(&self) -> bool {
        self.availability.available() && self.scanning == self.stop
    }
}

#[async_trait]
impl DaliEntity for ScanButton {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> String {
        if self.stop {
            "Stop Scan".to_string()
        } else {
            "Scan Bus".to_string()
        }
    }

    fn device(&self) -> DeviceSpec {
        gateway_ref(&self.gw_sn)
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        self.availability.update(event)
    }

    fn handle_scan_state(&mut self, scanning: bool) -> bool {
        let changed = self.scanning != scanning;
        self.scanning = scanning;
        changed
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        require_press("scan button", command)?;
        if self.stop {
            info!("Stop scan requested for gateway {}", self.gw_sn);
            self.launcher.stop().await?;
        } else {
            // The scan runs in the background; the press returns at once
            if self.launcher.launch().is_none() {
                debug!("Scan already running for gateway {}", self.gw_sn);
            }
        }
        Ok(())
    }
}

pub struct IdentifyButton {
    device: Device,
    gateway: Arc<dyn Gateway>,
    unique_id: String,
    availability: Availability,
}

impl IdentifyButton {
    pub fn new(device: Device, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            unique_id: format!("{}_identify", device.unique_id),
            availability: Availability::for_device(&device),
            device,
            gateway,
        }
    }
}

impl Entity for IdentifyButton {
    fn state_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn platform(&self) -> &'static str {
        "button"
    }

    fn attributes_json(&self) -> serde_json::Value {
        json!({"device_class": "identify", "entity_category": "config"})
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for IdentifyButton {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> String {
        format!("{} Identify", self.device.name)
    }

    fn device(&self) -> DeviceSpec {
        device_spec(&self.device)
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        self.availability.update(event)
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        require_press("identify button", command)?;
        debug!("Identifying device {}", self.device.dev_id);
        self.gateway
            .send(GatewayCommand::Identify {
                dev_id: self.device.dev_id.clone(),
            })
            .await?;
        Ok(())
    }
}
