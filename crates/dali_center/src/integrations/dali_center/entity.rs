//! Shared entity plumbing for every DALI Center platform.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::DOMAIN;
use super::GATEWAY_MODEL;
use super::MANUFACTURER;
use super::gateway::Gateway;
use super::gateway::GatewayCommand;
use super::gateway::GatewayError;
use super::gateway::GatewayEvent;
use super::model::Device;
use super::sn_to_mac;
use crate::engine::EntityCommand;
use crate::engine::Hub;
use crate::engine::device::CONNECTION_NETWORK_MAC;
use crate::engine::device::DeviceSpec;
use crate::engine::entity::Entity;

#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error("{entity} does not support {command}")]
    Unsupported {
        entity: &'static str,
        command: String,
    },

    #[error("{0} is out of range")]
    OutOfRange(f64),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl EntityError {
    pub fn unsupported(entity: &'static str, command: &EntityCommand) -> Self {
        EntityError::Unsupported {
            entity,
            command: format!("{:?}", command),
        }
    }
}

/// An entity owned by a gateway entry
#[async_trait]
pub trait DaliEntity: Entity {
    fn unique_id(&self) -> &str;

    /// Suggested display name, used for the entity id
    fn name(&self) -> String;

    /// Registry device the entity is attached to
    fn device(&self) -> DeviceSpec;

    /// Static capabilities stored in the entity registry
    fn capabilities(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Called once the entity has an entity id
    fn attached(&mut self, _entity_id: &str, _hub: &Arc<Hub>) {}

    /// Commands to send once the entity is added, e.g. a status read
    fn initial_commands(&self) -> Vec<GatewayCommand> {
        Vec::new()
    }

    /// Apply a push event. Returns whether the state changed.
    fn handle_gateway_event(&mut self, _event: &GatewayEvent) -> bool {
        false
    }

    /// Returns whether the state changed
    fn handle_scan_state(&mut self, _scanning: bool) -> bool {
        false
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError>;
}

pub type SharedEntity = Arc<Mutex<dyn DaliEntity>>;

pub fn shared<E: DaliEntity + 'static>(entity: E) -> SharedEntity {
    Arc::new(Mutex::new(entity))
}

/// Gateway and device reachability.
///
/// An entity is available only while both are online. For entities of the
/// gateway itself `dev_id` is the gateway serial number.
#[derive(Debug, Clone)]
pub struct Availability {
    gw_sn: String,
    dev_id: String,
    gateway_online: bool,
    device_online: bool,
}

impl Availability {
    pub fn new(gw_sn: &str, dev_id: &str, device_online: bool) -> Self {
        Self {
            gw_sn: gw_sn.to_string(),
            dev_id: dev_id.to_string(),
            gateway_online: true,
            device_online,
        }
    }

    pub fn for_device(device: &Device) -> Self {
        Self::new(&device.gw_sn, &device.dev_id, device.is_online())
    }

    pub fn for_gateway(gw_sn: &str) -> Self {
        Self::new(gw_sn, gw_sn, true)
    }

    pub fn available(&self) -> bool {
        self.gateway_online && self.device_online
    }

    /// Returns whether availability changed
    pub fn update(&mut self, event: &GatewayEvent) -> bool {
        let GatewayEvent::OnlineStatus { dev_id, available } = event else {
            return false;
        };

        let before = self.available();
        if *dev_id == self.gw_sn {
            self.gateway_online = *available;
        }
        if *dev_id == self.dev_id {
            self.device_online = *available;
        }

        let changed = before != self.available();
        if changed {
            debug!(
                "Availability of {} changed: gateway {}, device {}",
                self.dev_id, self.gateway_online, self.device_online
            );
        }
        changed
    }
}

/// Registry description of the gateway device
pub fn gateway_device_spec(gateway: &dyn Gateway) -> DeviceSpec {
    let gw_sn = gateway.serial_number();
    DeviceSpec {
        connections: vec![(CONNECTION_NETWORK_MAC.to_string(), sn_to_mac(gw_sn))],
        name: Some(gateway.name().to_string()),
        manufacturer: Some(MANUFACTURER.to_string()),
        model: Some(GATEWAY_MODEL.to_string()),
        serial_number: Some(gw_sn.to_string()),
        sw_version: gateway.software_version(),
        hw_version: gateway.firmware_version(),
        ..DeviceSpec::new((DOMAIN.to_string(), gw_sn.to_string()))
    }
}

/// Identifier-only spec for entities attached to the gateway device
pub fn gateway_ref(gw_sn: &str) -> DeviceSpec {
    DeviceSpec::new((DOMAIN.to_string(), gw_sn.to_string()))
}

/// Registry description of a bus device, reached through its gateway
pub fn device_spec(device: &Device) -> DeviceSpec {
    DeviceSpec {
        name: Some(device.name.clone()),
        manufacturer: Some(MANUFACTURER.to_string()),
        model: Some(device.model.clone()),
        via_device: Some((DOMAIN.to_string(), device.gw_sn.clone())),
        ..DeviceSpec::new((DOMAIN.to_string(), device.dev_id.clone()))
    }
}
