//! Gateway client seam.
//!
//! Everything that talks to a DALI Center gateway goes through the
//! [`Gateway`] trait. Backends register themselves in [`GATEWAY_BACKENDS`]
//! and are picked per entry by name.

use std::sync::Arc;

use async_trait::async_trait;
use linkme::distributed_slice;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;
use tokio::sync::broadcast;

use super::config::EntryConfig;
use super::model::Device;
use super::model::Group;
use super::model::Scene;
use super::model::SceneDetails;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("gateway did not answer in time")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("gateway is not connected")]
    NotConnected,

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("command rejected: {0}")]
    Command(String),

    #[error("no gateway backend named {0:?}")]
    UnknownBackend(String),
}

/// Occupancy state reported by a motion sensor
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    #[default]
    NoMotion,
    Motion,
    Vacant,
    Presence,
    Occupancy,
}

/// One data point of a status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperty {
    pub dpid: u8,
    /// Panel key the property belongs to
    #[serde(default, rename = "keyNo")]
    pub key_no: Option<u8>,
    pub value: serde_json::Value,
}

/// Device parameters; `None` means not reported or not changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceParameters {
    pub fade_time: Option<u16>,
    pub fade_rate: Option<u16>,
    pub min_brightness: Option<u16>,
    pub max_brightness: Option<u16>,
}

/// Pushed by the gateway whenever something on the bus changes
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// `dev_id` is the gateway serial number for gateway availability
    OnlineStatus { dev_id: String, available: bool },
    DeviceStatus {
        dev_id: String,
        properties: Vec<DeviceProperty>,
    },
    EnergyReport { dev_id: String, energy_wh: f64 },
    MotionStatus { dev_id: String, state: MotionState },
    IlluminanceStatus {
        dev_id: String,
        lux: f64,
        is_valid: bool,
    },
    SensorOnOff { dev_id: String, enabled: bool },
    DeviceParameters {
        dev_id: String,
        params: DeviceParameters,
    },
}

/// Addressing for light commands
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Device { dev_id: String },
    Group { group_id: u8, channel: u8 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnOnParams {
    pub brightness: Option<u8>,
    pub color_temp_kelvin: Option<u16>,
    pub hs_color: Option<(f64, f64)>,
    pub rgbw_color: Option<(u8, u8, u8, u8)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Uint8,
    Uint16,
    String,
}

/// Raw data point write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DpWrite {
    pub dpid: u8,
    #[serde(rename = "dataType")]
    pub data_type: DataType,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCommand {
    TurnOn { target: Target, params: TurnOnParams },
    TurnOff { target: Target },
    /// Raw write; address `"FFFF"` broadcasts to every device
    WriteDevice {
        address: String,
        dev_type: u8,
        channel: u8,
        properties: Vec<DpWrite>,
    },
    ReadStatus { dev_id: String },
    Identify { dev_id: String },
    SetSensorEnabled { dev_id: String, enabled: bool },
    GetSensorEnabled { dev_id: String },
    SetDeviceParameters {
        dev_id: String,
        params: DeviceParameters,
    },
    GetDeviceParameters { dev_id: String },
    ActivateScene { scene_id: u8, channel: u8 },
    Restart,
}

/// Client for one DALI Center gateway
///
/// Methods take `&self` so a scan can be stopped while it is in flight.
#[async_trait]
pub trait Gateway: Send + Sync {
    fn serial_number(&self) -> &str;

    fn name(&self) -> &str;

    fn software_version(&self) -> Option<String> {
        None
    }

    fn firmware_version(&self) -> Option<String> {
        None
    }

    async fn connect(&self) -> Result<(), GatewayError>;

    async fn disconnect(&self) -> Result<(), GatewayError>;

    async fn discover_devices(&self) -> Result<Vec<Device>, GatewayError>;

    async fn discover_groups(&self) -> Result<Vec<Group>, GatewayError>;

    async fn discover_scenes(&self) -> Result<Vec<Scene>, GatewayError>;

    async fn read_scene(&self, scene: &Scene) -> Result<SceneDetails, GatewayError>;

    /// Every channel the gateway drives
    fn channel_total(&self) -> Vec<u8>;

    /// Whether a bus scan is in progress
    fn bus_scanning(&self) -> bool;

    /// Sweep the given channels and return every device that answered
    async fn scan_bus(&self, channels: &[u8]) -> Result<Vec<Device>, GatewayError>;

    async fn stop_scan(&self) -> Result<(), GatewayError>;

    async fn send(&self, command: GatewayCommand) -> Result<(), GatewayError>;

    /// Push events from the gateway
    fn subscribe(&self) -> broadcast::Receiver<GatewayEvent>;
}

/// A named way of building a gateway client for an entry
pub struct GatewayBackend {
    pub name: &'static str,
    pub build: fn(&EntryConfig) -> Result<Arc<dyn Gateway>, GatewayError>,
}

#[distributed_slice]
pub static GATEWAY_BACKENDS: [GatewayBackend];

pub fn build_gateway(config: &EntryConfig) -> Result<Arc<dyn Gateway>, GatewayError> {
    let backend = GATEWAY_BACKENDS
        .iter()
        .find(|b| b.name == config.backend)
        .ok_or_else(|| GatewayError::UnknownBackend(config.backend.clone()))?;
    (backend.build)(config)
}

#[cfg(test)]
pub use mock::MockGateway;
#[cfg(test)]
pub use mock::MockScan;
