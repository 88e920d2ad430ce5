//! Light platform: bus lights, group addresses and the gateway-wide
//! "All Lights" broadcast control.

use std::sync::Arc;

use async_trait::async_trait;
use palette::FromColor;
use palette::Hsv;
use palette::Srgb;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use super::entity::Availability;
use super::entity::DaliEntity;
use super::entity::EntityError;
use super::entity::device_spec;
use super::entity::gateway_ref;
use super::gateway::DataType;
use super::gateway::DpWrite;
use super::gateway::Gateway;
use super::gateway::GatewayCommand;
use super::gateway::GatewayEvent;
use super::gateway::Target;
use super::gateway::TurnOnParams;
use super::model::ColorMode;
use super::model::Device;
use super::model::Group;
use crate::engine::EntityCommand;
use crate::engine::device::DeviceSpec;
use crate::engine::entity::Entity;

pub const MIN_COLOR_TEMP_KELVIN: u16 = 1000;
pub const MAX_COLOR_TEMP_KELVIN: u16 = 8000;

/// Address that reaches every device on the gateway
const BROADCAST_ADDRESS: &str = "FFFF";

const DPID_POWER: u8 = 20;
const DPID_WHITE: u8 = 21;
const DPID_BRIGHTNESS: u8 = 22;
const DPID_COLOR_TEMP: u8 = 23;
const DPID_COLOR: u8 = 24;

/// Colour space the gateway reports hue, saturation and value in
type GatewayHsv = Hsv<palette::encoding::Srgb, f64>;

/// 12 hex digit colour string: hue * 16 (0..5760), saturation and value
/// (0..1000), four digits each
pub fn rgb_to_hsv_string(rgb: (u8, u8, u8)) -> String {
    let hsv = GatewayHsv::from_color(Srgb::new(rgb.0, rgb.1, rgb.2).into_format::<f64>());
    format!(
        "{:04x}{:04x}{:04x}",
        (hsv.hue.into_positive_degrees() * 16.0) as u32,
        (hsv.saturation * 1000.0) as u32,
        (hsv.value * 1000.0) as u32
    )
}

/// Hue in degrees, saturation and value 0..=1
fn hsv_to_rgb8(hue: f64, saturation: f64, value: f64) -> (u8, u8, u8) {
    Srgb::<f64>::from_color(GatewayHsv::new(hue, saturation, value))
        .into_format::<u8>()
        .into_components()
}

fn hex_field(hex: &str, index: usize) -> Option<u16> {
    hex.get(index * 4..index * 4 + 4)
        .and_then(|digits| u16::from_str_radix(digits, 16).ok())
}

fn value_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn value_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        other => value_f64(other).map(|v| v != 0.0),
    }
}

fn value_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn on_off(on: Option<bool>) -> serde_json::Value {
    match on {
        Some(true) => json!("on"),
        Some(false) => json!("off"),
        None => serde_json::Value::Null,
    }
}

fn turn_on_params(command: &EntityCommand) -> Option<TurnOnParams> {
    match command {
        EntityCommand::TurnOn {
            brightness,
            color_temp_kelvin,
            hs_color,
            rgbw_color,
        } => Some(TurnOnParams {
            brightness: *brightness,
            color_temp_kelvin: *color_temp_kelvin,
            hs_color: *hs_color,
            rgbw_color: *rgbw_color,
        }),
        _ => None,
    }
}

/// A light on the DALI bus. State follows the gateway's status reports.
pub struct DaliLight {
    device: Device,
    gateway: Arc<dyn Gateway>,
    availability: Availability,
    color_mode: ColorMode,
    is_on: Option<bool>,
    brightness: Option<u8>,
    white_level: Option<u8>,
    color_temp_kelvin: Option<u16>,
    hs_color: Option<(f64, f64)>,
    rgbw_color: Option<(u8, u8, u8, u8)>,
}

impl DaliLight {
    pub fn new(device: Device, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            availability: Availability::for_device(&device),
            color_mode: device.color_mode,
            device,
            gateway,
            is_on: None,
            brightness: None,
            white_level: None,
            color_temp_kelvin: None,
            hs_color: None,
            rgbw_color: None,
        }
    }

    fn apply_property(&mut self, dpid: u8, value: &serde_json::Value) {
        match dpid {
            DPID_POWER => {
                if let Some(on) = value_bool(value) {
                    self.is_on = Some(on);
                }
            }
            DPID_WHITE => {
                if let Some(white) = value_f64(value) {
                    let white = white.clamp(0.0, 255.0) as u8;
                    self.white_level = Some(white);
                    if let Some((r, g, b, _)) = self.rgbw_color {
                        self.rgbw_color = Some((r, g, b, white));
                    }
                }
            }
            DPID_BRIGHTNESS => {
                if let Some(level) = value_f64(value) {
                    self.brightness = if level == 0.0 && self.brightness.is_none() {
                        Some(255)
                    } else {
                        Some((level.clamp(0.0, 1000.0) / 1000.0 * 255.0) as u8)
                    };
                }
            }
            DPID_COLOR_TEMP if self.color_mode == ColorMode::ColorTemp => {
                if let Some(kelvin) = value_f64(value) {
                    self.color_temp_kelvin = Some(kelvin as u16);
                }
            }
            DPID_COLOR if self.color_mode == ColorMode::Hs => {
                let hex = value_string(value);
                match (hex_field(&hex, 0), hex_field(&hex, 1)) {
                    (Some(h), Some(s)) => self.hs_color = Some((h as f64, s as f64 / 10.0)),
                    _ => warn!("Malformed colour {:?} from {}", hex, self.device.dev_id),
                }
            }
            DPID_COLOR if self.color_mode == ColorMode::Rgbw => {
                let hex = value_string(value);
                let (Some(h), Some(s), Some(v)) =
                    (hex_field(&hex, 0), hex_field(&hex, 1), hex_field(&hex, 2))
                else {
                    warn!("Malformed colour {:?} from {}", hex, self.device.dev_id);
                    return;
                };
                let h = h.min(360) as f64;
                let s = s.min(1000) as f64 / 1000.0;
                let mut v = v.min(1000) as f64 / 1000.0;
                if v == 0.0 && self.rgbw_color.is_none() {
                    v = 1.0;
                }
                let (r, g, b) = hsv_to_rgb8(h, s, v);
                self.rgbw_color = Some((r, g, b, self.white_level.unwrap_or(0)));
            }
            _ => {}
        }
    }
}

impl Entity for DaliLight {
    fn state_json(&self) -> serde_json::Value {
        on_off(self.is_on)
    }

    fn platform(&self) -> &'static str {
        "light"
    }

    fn attributes_json(&self) -> serde_json::Value {
        let mut attributes = self.device.attributes();
        attributes["color_mode"] = json!(self.color_mode);
        attributes["brightness"] = json!(self.brightness);
        attributes["color_temp_kelvin"] = json!(self.color_temp_kelvin);
        attributes["hs_color"] = json!(self.hs_color);
        attributes["rgbw_color"] = json!(self.rgbw_color);
        attributes
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for DaliLight {
    fn unique_id(&self) -> &str {
        &self.device.unique_id
    }

    fn name(&self) -> String {
        format!("{} Light", self.device.name)
    }

    fn device(&self) -> DeviceSpec {
        DeviceSpec {
            model: Some(format!("Dali Light Type {}", self.device.dev_type)),
            ..device_spec(&self.device)
        }
    }

    fn capabilities(&self) -> serde_json::Value {
        json!({
            "supported_color_modes": [self.color_mode],
            "min_color_temp_kelvin": MIN_COLOR_TEMP_KELVIN,
            "max_color_temp_kelvin": MAX_COLOR_TEMP_KELVIN,
        })
    }

    fn initial_commands(&self) -> Vec<GatewayCommand> {
        vec![GatewayCommand::ReadStatus {
            dev_id: self.device.dev_id.clone(),
        }]
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        match event {
            GatewayEvent::DeviceStatus { dev_id, properties } if *dev_id == self.device.dev_id => {
                for property in properties {
                    self.apply_property(property.dpid, &property.value);
                }
                true
            }
            other => self.availability.update(other),
        }
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        let target = Target::Device {
            dev_id: self.device.dev_id.clone(),
        };
        debug!("Light {} command {:?}", self.device.unique_id, command);
        let gateway_command = match command {
            EntityCommand::TurnOff => GatewayCommand::TurnOff { target },
            other => match turn_on_params(other) {
                Some(params) => GatewayCommand::TurnOn { target, params },
                None => return Err(EntityError::unsupported("light", other)),
            },
        };
        self.gateway.send(gateway_command).await?;
        Ok(())
    }
}

/// A DALI group address. The gateway gives no group feedback, so state is
/// optimistic.
pub struct DaliLightGroup {
    group: Group,
    gateway: Arc<dyn Gateway>,
    availability: Availability,
    color_mode: ColorMode,
    is_on: bool,
    brightness: u8,
    color_temp_kelvin: u16,
    rgbw_color: Option<(u8, u8, u8, u8)>,
}

impl DaliLightGroup {
    pub fn new(group: Group, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            availability: Availability::for_gateway(&group.gw_sn),
            group,
            gateway,
            color_mode: ColorMode::Rgbw,
            is_on: false,
            brightness: 0,
            color_temp_kelvin: MIN_COLOR_TEMP_KELVIN,
            rgbw_color: None,
        }
    }
}

impl Entity for DaliLightGroup {
    fn state_json(&self) -> serde_json::Value {
        on_off(Some(self.is_on))
    }

    fn platform(&self) -> &'static str {
        "light"
    }

    fn attributes_json(&self) -> serde_json::Value {
        json!({
            "gateway_sn": self.group.gw_sn,
            "group_id": self.group.group_id,
            "channel": self.group.channel,
            "color_mode": self.color_mode,
            "brightness": self.brightness,
            "color_temp_kelvin": self.color_temp_kelvin,
            "rgbw_color": self.rgbw_color,
        })
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for DaliLightGroup {
    fn unique_id(&self) -> &str {
        &self.group.unique_id
    }

    fn name(&self) -> String {
        self.group.name.clone()
    }

    fn device(&self) -> DeviceSpec {
        gateway_ref(&self.group.gw_sn)
    }

    fn capabilities(&self) -> serde_json::Value {
        json!({
            "supported_color_modes": [ColorMode::ColorTemp, ColorMode::Rgbw],
            "min_color_temp_kelvin": MIN_COLOR_TEMP_KELVIN,
            "max_color_temp_kelvin": MAX_COLOR_TEMP_KELVIN,
        })
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        self.availability.update(event)
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        let target = Target::Group {
            group_id: self.group.group_id,
            channel: self.group.channel,
        };
        match command {
            EntityCommand::TurnOff => {
                self.gateway.send(GatewayCommand::TurnOff { target }).await?;
                self.is_on = false;
            }
            other => {
                let Some(params) = turn_on_params(other) else {
                    return Err(EntityError::unsupported("light group", other));
                };
                // Groups take no HS colour
                let params = TurnOnParams {
                    hs_color: None,
                    ..params
                };
                self.gateway
                    .send(GatewayCommand::TurnOn { target, params })
                    .await?;

                self.is_on = true;
                if let Some(brightness) = params.brightness {
                    self.brightness = brightness;
                }
                if let Some(rgbw) = params.rgbw_color {
                    self.color_mode = ColorMode::Rgbw;
                    self.rgbw_color = Some(rgbw);
                }
                if let Some(kelvin) = params.color_temp_kelvin {
                    self.color_mode = ColorMode::ColorTemp;
                    self.color_temp_kelvin = kelvin;
                }
            }
        }
        Ok(())
    }
}

/// Broadcast control of every light behind one gateway
pub struct AllLights {
    gw_sn: String,
    unique_id: String,
    gateway_name: String,
    gateway: Arc<dyn Gateway>,
    availability: Availability,
    color_mode: ColorMode,
    is_on: bool,
    brightness: Option<u8>,
    color_temp_kelvin: Option<u16>,
    hs_color: Option<(f64, f64)>,
    rgbw_color: Option<(u8, u8, u8, u8)>,
}

impl AllLights {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let gw_sn = gateway.serial_number().to_string();
        Self {
            unique_id: format!("{}_all_lights", gw_sn),
            gateway_name: gateway.name().to_string(),
            availability: Availability::for_gateway(&gw_sn),
            gw_sn,
            gateway,
            color_mode: ColorMode::Rgbw,
            is_on: false,
            brightness: None,
            color_temp_kelvin: None,
            hs_color: None,
            rgbw_color: None,
        }
    }

    /// Data points for a broadcast turn-on; applies the optimistic state
    fn turn_on_writes(&mut self, params: TurnOnParams) -> Vec<DpWrite> {
        let mut writes = vec![DpWrite {
            dpid: DPID_POWER,
            data_type: DataType::Bool,
            value: json!(true),
        }];

        if let Some(brightness) = params.brightness {
            writes.push(DpWrite {
                dpid: DPID_BRIGHTNESS,
                data_type: DataType::Uint16,
                value: json!(brightness),
            });
            self.brightness = Some(brightness);
        }

        if let Some(kelvin) = params.color_temp_kelvin {
            writes.push(DpWrite {
                dpid: DPID_COLOR_TEMP,
                data_type: DataType::Uint16,
                value: json!(kelvin),
            });
            self.color_temp_kelvin = Some(kelvin);
            self.color_mode = ColorMode::ColorTemp;
        }

        if let Some((r, g, b, w)) = params.rgbw_color {
            writes.push(DpWrite {
                dpid: DPID_COLOR,
                data_type: DataType::String,
                value: json!(rgb_to_hsv_string((r, g, b))),
            });
            if w > 0 {
                writes.push(DpWrite {
                    dpid: DPID_WHITE,
                    data_type: DataType::Uint8,
                    value: json!(w),
                });
            }
            self.rgbw_color = Some((r, g, b, w));
            self.color_mode = ColorMode::Rgbw;
        } else if let Some((h, s)) = params.hs_color {
            let rgb = hsv_to_rgb8(h, s / 100.0, 1.0);
            writes.push(DpWrite {
                dpid: DPID_COLOR,
                data_type: DataType::String,
                value: json!(rgb_to_hsv_string(rgb)),
            });
            self.hs_color = Some((h, s));
            self.color_mode = ColorMode::Hs;
        }

        writes
    }

    fn broadcast(properties: Vec<DpWrite>) -> GatewayCommand {
        GatewayCommand::WriteDevice {
            address: BROADCAST_ADDRESS.to_string(),
            dev_type: 0,
            channel: 1,
            properties,
        }
    }
}

impl Entity for AllLights {
    fn state_json(&self) -> serde_json::Value {
        on_off(Some(self.is_on))
    }

    fn platform(&self) -> &'static str {
        "light"
    }

    fn attributes_json(&self) -> serde_json::Value {
        json!({
            "gateway_sn": self.gw_sn,
            "color_mode": self.color_mode,
            "brightness": self.brightness,
            "color_temp_kelvin": self.color_temp_kelvin,
            "hs_color": self.hs_color,
            "rgbw_color": self.rgbw_color,
        })
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for AllLights {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> String {
        format!("{} All Lights", self.gateway_name)
    }

    fn device(&self) -> DeviceSpec {
        gateway_ref(&self.gw_sn)
    }

    fn capabilities(&self) -> serde_json::Value {
        json!({
            "supported_color_modes": [ColorMode::Brightness, ColorMode::ColorTemp, ColorMode::Rgbw],
            "min_color_temp_kelvin": MIN_COLOR_TEMP_KELVIN,
            "max_color_temp_kelvin": MAX_COLOR_TEMP_KELVIN,
        })
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        self.availability.update(event)
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        match command {
            EntityCommand::TurnOff => {
                let off = vec![DpWrite {
                    dpid: DPID_POWER,
                    data_type: DataType::Bool,
                    value: json!(false),
                }];
                self.gateway.send(Self::broadcast(off)).await?;
                self.is_on = false;
            }
            other => {
                let Some(params) = turn_on_params(other) else {
                    return Err(EntityError::unsupported("all lights", other));
                };
                let writes = self.turn_on_writes(params);
                self.gateway.send(Self::broadcast(writes)).await?;
                self.is_on = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::dali_center::gateway::DeviceProperty;
    use crate::integrations::dali_center::gateway::MockGateway;

    fn status(dev_id: &str, props: &[(u8, serde_json::Value)]) -> GatewayEvent {
        GatewayEvent::DeviceStatus {
            dev_id: dev_id.to_string(),
            properties: props
                .iter()
                .map(|(dpid, value)| DeviceProperty {
                    dpid: *dpid,
                    key_no: None,
                    value: value.clone(),
                })
                .collect(),
        }
    }

    fn light(color_mode: ColorMode) -> (DaliLight, Arc<MockGateway>) {
        let gateway = Arc::new(MockGateway::new("GW1"));
        let device = Device::new("GW1", "0102", 0, 3, "Desk").with_color_mode(color_mode);
        (DaliLight::new(device, gateway.clone()), gateway)
    }

    #[test]
    fn test_rgb_to_hsv_string() {
        assert_eq!(rgb_to_hsv_string((255, 0, 0)), "000003e803e8");
        assert_eq!(rgb_to_hsv_string((255, 255, 255)), "0000000003e8");
        assert_eq!(rgb_to_hsv_string((0, 0, 0)), "000000000000");
        // 120 degrees * 16
        assert_eq!(rgb_to_hsv_string((0, 255, 0)), "078003e803e8");
    }

    #[test]
    fn test_hsv_to_rgb_primaries() {
        assert_eq!(hsv_to_rgb8(0.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb8(120.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(hsv_to_rgb8(180.0, 0.0, 1.0), (255, 255, 255));
    }

    #[test]
    fn test_status_report_updates_light() {
        let (mut light, _) = light(ColorMode::Brightness);
        let dev_id = light.device.dev_id.clone();

        assert!(light.handle_gateway_event(&status(
            &dev_id,
            &[(20, json!(true)), (22, json!(1000))]
        )));
        assert_eq!(light.state_json(), json!("on"));
        assert_eq!(light.brightness, Some(255));

        light.handle_gateway_event(&status(&dev_id, &[(22, json!("500"))]));
        assert_eq!(light.brightness, Some(127));

        // Reports for other devices are ignored
        assert!(!light.handle_gateway_event(&status("other", &[(20, json!(false))])));
        assert_eq!(light.state_json(), json!("on"));
    }

    #[test]
    fn test_first_zero_brightness_reads_as_full() {
        let (mut light, _) = light(ColorMode::Brightness);
        let dev_id = light.device.dev_id.clone();

        light.handle_gateway_event(&status(&dev_id, &[(22, json!(0))]));
        assert_eq!(light.brightness, Some(255));

        light.handle_gateway_event(&status(&dev_id, &[(22, json!(0))]));
        assert_eq!(light.brightness, Some(0));
    }

    #[test]
    fn test_colour_reports_follow_color_mode() {
        let (mut hs, _) = light(ColorMode::Hs);
        let dev_id = hs.device.dev_id.clone();
        hs.handle_gateway_event(&status(&dev_id, &[(24, json!("007803e8ffff"))]));
        assert_eq!(hs.hs_color, Some((120.0, 100.0)));
        assert_eq!(hs.rgbw_color, None);

        let (mut plain, _) = light(ColorMode::Brightness);
        plain.handle_gateway_event(&status(&dev_id, &[(23, json!(3000)), (24, json!("007803e8"))]));
        assert_eq!(plain.hs_color, None);
        assert_eq!(plain.color_temp_kelvin, None);

        let (mut ct, _) = light(ColorMode::ColorTemp);
        ct.handle_gateway_event(&status(&dev_id, &[(23, json!(3000))]));
        assert_eq!(ct.color_temp_kelvin, Some(3000));
    }

    #[test]
    fn test_rgbw_report() {
        let (mut light, _) = light(ColorMode::Rgbw);
        let dev_id = light.device.dev_id.clone();

        // Zero value on the first report is treated as full value
        light.handle_gateway_event(&status(&dev_id, &[(21, json!(40)), (24, json!("000003e80000"))]));
        assert_eq!(light.rgbw_color, Some((255, 0, 0, 40)));

        light.handle_gateway_event(&status(&dev_id, &[(21, json!(7))]));
        assert_eq!(light.rgbw_color, Some((255, 0, 0, 7)));

        // Malformed colours leave the state alone
        light.handle_gateway_event(&status(&dev_id, &[(24, json!("zz"))]));
        assert_eq!(light.rgbw_color, Some((255, 0, 0, 7)));
    }

    #[tokio::test]
    async fn test_light_commands_go_to_the_device() {
        let (mut light, gateway) = light(ColorMode::Brightness);
        let dev_id = light.device.dev_id.clone();

        light
            .handle_command(&EntityCommand::TurnOn {
                brightness: Some(100),
                color_temp_kelvin: None,
                hs_color: None,
                rgbw_color: None,
            })
            .await
            .unwrap();
        light.handle_command(&EntityCommand::TurnOff).await.unwrap();
        assert!(light.handle_command(&EntityCommand::Press).await.is_err());

        let target = Target::Device { dev_id };
        assert_eq!(
            gateway.sent(),
            vec![
                GatewayCommand::TurnOn {
                    target: target.clone(),
                    params: TurnOnParams {
                        brightness: Some(100),
                        ..Default::default()
                    },
                },
                GatewayCommand::TurnOff { target },
            ]
        );
        // No optimistic state for bus lights
        assert_eq!(light.state_json(), serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_group_is_optimistic() {
        let gateway = Arc::new(MockGateway::new("GW1"));
        let mut group = DaliLightGroup::new(Group::new("GW1", 2, 0, "Hall"), gateway.clone());
        assert_eq!(group.state_json(), json!("off"));
        assert_eq!(group.color_temp_kelvin, 1000);

        group
            .handle_command(&EntityCommand::TurnOn {
                brightness: Some(80),
                color_temp_kelvin: Some(2700),
                hs_color: Some((10.0, 10.0)),
                rgbw_color: None,
            })
            .await
            .unwrap();

        assert_eq!(group.state_json(), json!("on"));
        assert_eq!(group.brightness, 80);
        assert_eq!(group.color_mode, ColorMode::ColorTemp);
        assert_eq!(
            gateway.sent(),
            vec![GatewayCommand::TurnOn {
                target: Target::Group {
                    group_id: 2,
                    channel: 0
                },
                params: TurnOnParams {
                    brightness: Some(80),
                    color_temp_kelvin: Some(2700),
                    hs_color: None,
                    rgbw_color: None,
                },
            }]
        );

        group.handle_command(&EntityCommand::TurnOff).await.unwrap();
        assert_eq!(group.state_json(), json!("off"));
    }

    #[tokio::test]
    async fn test_all_lights_broadcast() {
        let gateway = Arc::new(MockGateway::new("GW1"));
        let mut all = AllLights::new(gateway.clone());
        assert_eq!(all.unique_id(), "GW1_all_lights");

        all.handle_command(&EntityCommand::TurnOn {
            brightness: Some(200),
            color_temp_kelvin: None,
            hs_color: None,
            rgbw_color: Some((255, 0, 0, 0)),
        })
        .await
        .unwrap();
        all.handle_command(&EntityCommand::TurnOn {
            brightness: None,
            color_temp_kelvin: None,
            hs_color: Some((0.0, 100.0)),
            rgbw_color: None,
        })
        .await
        .unwrap();
        all.handle_command(&EntityCommand::TurnOff).await.unwrap();

        let sent = gateway.sent();
        assert_eq!(sent.len(), 3);
        let GatewayCommand::WriteDevice {
            address,
            dev_type,
            channel,
            properties,
        } = &sent[0]
        else {
            panic!("expected a broadcast write, got {:?}", sent[0]);
        };
        assert_eq!((address.as_str(), *dev_type, *channel), ("FFFF", 0, 1));
        assert_eq!(
            serde_json::to_value(properties).unwrap(),
            json!([
                {"dpid": 20, "dataType": "bool", "value": true},
                {"dpid": 22, "dataType": "uint16", "value": 200},
                {"dpid": 24, "dataType": "string", "value": "000003e803e8"},
            ])
        );

        let GatewayCommand::WriteDevice { properties, .. } = &sent[1] else {
            panic!("expected a broadcast write");
        };
        assert_eq!(properties[1].value, json!("000003e803e8"));
        assert_eq!(all.hs_color, Some((0.0, 100.0)));

        let GatewayCommand::WriteDevice { properties, .. } = &sent[2] else {
            panic!("expected a broadcast write");
        };
        assert_eq!(properties[0].value, json!(false));
        assert_eq!(all.state_json(), json!("off"));
    }

    #[tokio::test]
    async fn test_all_lights_sends_white_channel_when_set() {
        let gateway = Arc::new(MockGateway::new("GW1"));
        let mut all = AllLights::new(gateway.clone());

        all.handle_command(&EntityCommand::TurnOn {
            brightness: None,
            color_temp_kelvin: Some(4000),
            hs_color: None,
            rgbw_color: Some((255, 255, 255, 90)),
        })
        .await
        .unwrap();

        let GatewayCommand::WriteDevice { properties, .. } = &gateway.sent()[0] else {
            panic!("expected a broadcast write");
        };
        let dpids: Vec<u8> = properties.iter().map(|p| p.dpid).collect();
        assert_eq!(dpids, vec![20, 23, 24, 21]);
        assert_eq!(all.color_mode, ColorMode::Rgbw);
    }
}
