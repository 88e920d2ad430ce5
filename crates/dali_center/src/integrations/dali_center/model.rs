//! Devices, groups and scenes as the gateway reports them.

use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

/// What a device is, derived from its 4-digit DALI type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceKind {
    Light,
    MotionSensor,
    IlluminanceSensor,
    Panel,
    Group,
    Other,
}

impl DeviceKind {
    pub fn of(dev_type: &str) -> Self {
        match dev_type {
            "0201" => DeviceKind::MotionSensor,
            "0202" => DeviceKind::IlluminanceSensor,
            "0401" => DeviceKind::Group,
            t if t.starts_with("01") => DeviceKind::Light,
            t if t.starts_with("03") => DeviceKind::Panel,
            _ => DeviceKind::Other,
        }
    }
}

/// Colour capability a light reports
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    #[default]
    Brightness,
    ColorTemp,
    Hs,
    Rgbw,
}

/// Unique id of a device on one gateway
pub fn gen_device_unique_id(dev_type: &str, channel: u8, address: u8, gw_sn: &str) -> String {
    format!("{}{:02}{:02}{}", dev_type, channel, address, gw_sn)
}

/// Unique id of a group address on one gateway
pub fn gen_group_unique_id(address: u8, channel: u8, gw_sn: &str) -> String {
    format!("group_{:02}{:02}{}", channel, address, gw_sn)
}

/// Unique id of a scene on one gateway
pub fn gen_scene_unique_id(scene_id: u8, channel: u8, gw_sn: &str) -> String {
    format!("scene_{:02}{:02}{}", channel, scene_id, gw_sn)
}

/// A device record. `dev_id` is stable across scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub dev_id: String,
    pub unique_id: String,
    pub name: String,
    pub dev_type: String,
    pub channel: u8,
    pub address: u8,
    pub status: String,
    pub gw_sn: String,
    pub model: String,
    pub color_mode: ColorMode,
}

impl Device {
    pub fn new(gw_sn: &str, dev_type: &str, channel: u8, address: u8, name: &str) -> Self {
        let unique_id = gen_device_unique_id(dev_type, channel, address, gw_sn);
        Self {
            dev_id: unique_id.clone(),
            unique_id,
            name: name.to_string(),
            dev_type: dev_type.to_string(),
            channel,
            address,
            status: "online".to_string(),
            gw_sn: gw_sn.to_string(),
            model: format!("DALI Type {}", dev_type),
            color_mode: ColorMode::default(),
        }
    }

    pub fn with_color_mode(mut self, color_mode: ColorMode) -> Self {
        self.color_mode = color_mode;
        self
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::of(&self.dev_type)
    }

    pub fn is_online(&self) -> bool {
        self.status == "online"
    }

    /// Attributes shared by every entity of this device
    pub fn attributes(&self) -> serde_json::Value {
        serde_json::json!({
            "gateway_sn": self.gw_sn,
            "address": self.address,
            "channel": self.channel,
            "device_type": self.dev_type,
            "device_model": self.model,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: u8,
    pub unique_id: String,
    pub name: String,
    pub channel: u8,
    pub gw_sn: String,
}

impl Group {
    pub fn new(gw_sn: &str, group_id: u8, channel: u8, name: &str) -> Self {
        Self {
            group_id,
            unique_id: gen_group_unique_id(group_id, channel, gw_sn),
            name: name.to_string(),
            channel,
            gw_sn: gw_sn.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_id: u8,
    pub unique_id: String,
    pub name: String,
    pub channel: u8,
    pub gw_sn: String,
}

impl Scene {
    pub fn new(gw_sn: &str, scene_id: u8, channel: u8, name: &str) -> Self {
        Self {
            scene_id,
            unique_id: gen_scene_unique_id(scene_id, channel, gw_sn),
            name: name.to_string(),
            channel,
            gw_sn: gw_sn.to_string(),
        }
    }
}

/// A device or group address taking part in a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMember {
    pub dev_type: String,
    pub channel: u8,
    pub address: u8,
}

impl SceneMember {
    /// Unique id of the light entity driving this member
    pub fn light_unique_id(&self, gw_sn: &str) -> String {
        match DeviceKind::of(&self.dev_type) {
            DeviceKind::Group => gen_group_unique_id(self.address, self.channel, gw_sn),
            _ => gen_device_unique_id(&self.dev_type, self.channel, self.address, gw_sn),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDetails {
    pub area_id: String,
    pub channel: u8,
    pub devices: Vec<SceneMember>,
}
