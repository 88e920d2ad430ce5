//! In-memory gateway for running without hardware.
//!
//! The bus contents come from the entry's `[simulated]` table. Commands are
//! answered with the push events a real gateway would send back.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use linkme::distributed_slice;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::config::EntryConfig;
use super::config::SimulatedConfig;
use super::config::SimulatedDevice;
use super::gateway::DeviceParameters;
use super::gateway::DeviceProperty;
use super::gateway::GATEWAY_BACKENDS;
use super::gateway::Gateway;
use super::gateway::GatewayBackend;
use super::gateway::GatewayCommand;
use super::gateway::GatewayError;
use super::gateway::GatewayEvent;
use super::gateway::MotionState;
use super::gateway::Target;
use super::model::ColorMode;
use super::model::Device;
use super::model::DeviceKind;
use super::model::Group;
use super::model::Scene;
use super::model::SceneDetails;
use super::model::SceneMember;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Illuminance reported by sensors without a configured reading
const DEFAULT_LUX: f64 = 300.0;

#[distributed_slice(GATEWAY_BACKENDS)]
static SIMULATED_BACKEND: GatewayBackend = GatewayBackend {
    name: "simulated",
    build: build_simulated,
};

fn build_simulated(config: &EntryConfig) -> Result<Arc<dyn Gateway>, GatewayError> {
    Ok(Arc::new(SimulatedGateway::new(config)))
}

/// Cancellation handle of the scan in progress, if any
type ScanSlot = Mutex<Option<CancellationToken>>;

/// Empties the scan slot when the scan ends, however it ends
struct ActiveScan<'a>(&'a ScanSlot);

impl Drop for ActiveScan<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

pub struct SimulatedGateway {
    serial: String,
    name: String,
    bus: SimulatedConfig,
    connected: AtomicBool,
    scan: ScanSlot,
    parameters: Mutex<HashMap<String, DeviceParameters>>,
    events: broadcast::Sender<GatewayEvent>,
}

impl SimulatedGateway {
    pub fn new(config: &EntryConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            serial: config.serial_number.clone(),
            name: config.name.clone(),
            bus: config.simulated.clone(),
            connected: AtomicBool::new(false),
            scan: Mutex::new(None),
            parameters: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn ensure_connected(&self) -> Result<(), GatewayError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    fn device(&self, sim: &SimulatedDevice) -> Device {
        let device = Device::new(&self.serial, &sim.dev_type, sim.channel, sim.address, &sim.name);
        match sim.color_mode.as_deref().map(ColorMode::from_str) {
            None => device,
            Some(Ok(mode)) => device.with_color_mode(mode),
            Some(Err(_)) => {
                warn!(
                    "Unknown colour mode {:?} for simulated device {}",
                    sim.color_mode, sim.name
                );
                device
            }
        }
    }

    fn emit(&self, event: GatewayEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_status(&self, dev_id: &str, properties: Vec<(u8, serde_json::Value)>) {
        self.emit(GatewayEvent::DeviceStatus {
            dev_id: dev_id.to_string(),
            properties: properties
                .into_iter()
                .map(|(dpid, value)| DeviceProperty {
                    dpid,
                    key_no: None,
                    value,
                })
                .collect(),
        });
    }

    /// Report what a status read of `dev_id` returns on a real bus
    fn emit_readings(&self, dev_id: &str) {
        let Some(sim) = self
            .bus
            .devices
            .iter()
            .chain(self.bus.bus.iter().flatten())
            .find(|d| self.device(d).dev_id == dev_id)
        else {
            debug!("Status read for unknown simulated device {}", dev_id);
            return;
        };
        let dev_id = dev_id.to_string();
        match DeviceKind::of(&sim.dev_type) {
            DeviceKind::Light => self.emit(GatewayEvent::EnergyReport {
                dev_id,
                energy_wh: sim.reading.unwrap_or(0.0),
            }),
            DeviceKind::MotionSensor => self.emit(GatewayEvent::MotionStatus {
                dev_id,
                state: MotionState::NoMotion,
            }),
            DeviceKind::IlluminanceSensor => self.emit(GatewayEvent::IlluminanceStatus {
                dev_id,
                lux: sim.reading.unwrap_or(DEFAULT_LUX),
                is_valid: true,
            }),
            _ => {}
        }
    }

    fn parameters(&self, dev_id: &str) -> DeviceParameters {
        *self
            .parameters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(dev_id.to_string())
            .or_insert(DeviceParameters {
                fade_time: Some(0),
                fade_rate: Some(7),
                min_brightness: Some(10),
                max_brightness: Some(1000),
            })
    }

    fn set_parameters(&self, dev_id: &str, update: &DeviceParameters) {
        let mut params = self.parameters(dev_id);
        params.fade_time = update.fade_time.or(params.fade_time);
        params.fade_rate = update.fade_rate.or(params.fade_rate);
        params.min_brightness = update.min_brightness.or(params.min_brightness);
        params.max_brightness = update.max_brightness.or(params.max_brightness);
        self.parameters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(dev_id.to_string(), params);
    }
}

#[async_trait]
impl Gateway for SimulatedGateway {
    fn serial_number(&self) -> &str {
        &self.serial
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn software_version(&self) -> Option<String> {
        Some("simulated".to_string())
    }

    async fn connect(&self) -> Result<(), GatewayError> {
        self.connected.store(true, Ordering::SeqCst);
        info!("Simulated gateway {} connected", self.serial);
        self.emit(GatewayEvent::OnlineStatus {
            dev_id: self.serial.clone(),
            available: true,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        self.connected.store(false, Ordering::SeqCst);
        info!("Simulated gateway {} disconnected", self.serial);
        Ok(())
    }

    async fn discover_devices(&self) -> Result<Vec<Device>, GatewayError> {
        self.ensure_connected()?;
        Ok(self.bus.devices.iter().map(|d| self.device(d)).collect())
    }

    async fn discover_groups(&self) -> Result<Vec<Group>, GatewayError> {
        self.ensure_connected()?;
        Ok(self
            .bus
            .groups
            .iter()
            .map(|g| Group::new(&self.serial, g.group_id, g.channel, &g.name))
            .collect())
    }

    async fn discover_scenes(&self) -> Result<Vec<Scene>, GatewayError> {
        self.ensure_connected()?;
        Ok(self
            .bus
            .scenes
            .iter()
            .map(|s| Scene::new(&self.serial, s.scene_id, s.channel, &s.name))
            .collect())
    }

    async fn read_scene(&self, scene: &Scene) -> Result<SceneDetails, GatewayError> {
        self.ensure_connected()?;
        let sim = self
            .bus
            .scenes
            .iter()
            .find(|s| s.scene_id == scene.scene_id && s.channel == scene.channel)
            .ok_or_else(|| GatewayError::Command(format!("unknown scene {}", scene.scene_id)))?;
        Ok(SceneDetails {
            area_id: String::new(),
            channel: sim.channel,
            devices: sim
                .members
                .iter()
                .map(|(dev_type, channel, address)| SceneMember {
                    dev_type: dev_type.clone(),
                    channel: *channel,
                    address: *address,
                })
                .collect(),
        })
    }

    fn channel_total(&self) -> Vec<u8> {
        if self.bus.channels.is_empty() {
            vec![0]
        } else {
            self.bus.channels.clone()
        }
    }

    fn bus_scanning(&self) -> bool {
        self.scan
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    async fn scan_bus(&self, channels: &[u8]) -> Result<Vec<Device>, GatewayError> {
        self.ensure_connected()?;
        let stop = {
            let mut slot = self.scan.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_some() {
                return Err(GatewayError::Command("bus scan already running".to_string()));
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };
        let _active = ActiveScan(&self.scan);
        debug!("Simulated scan of channels {:?} on {}", channels, self.serial);

        let found = self.bus.bus.as_ref().unwrap_or(&self.bus.devices);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(self.bus.scan_duration_ms)) => {
                Ok(found
                    .iter()
                    .filter(|d| channels.contains(&d.channel))
                    .map(|d| self.device(d))
                    .collect())
            }
            _ = stop.cancelled() => Err(GatewayError::Cancelled),
        }
    }

    async fn stop_scan(&self) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        // Cancels only the scan in progress
        if let Some(token) = self.scan.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            token.cancel();
        }
        Ok(())
    }

    async fn send(&self, command: GatewayCommand) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        debug!("Simulated gateway {} <- {:?}", self.serial, command);
        match command {
            GatewayCommand::TurnOn {
                target: Target::Device { dev_id },
                params,
            } => {
                let mut properties = vec![(20, json!(true))];
                if let Some(brightness) = params.brightness {
                    properties.push((22, json!(brightness as u32 * 1000 / 255)));
                }
                if let Some(kelvin) = params.color_temp_kelvin {
                    properties.push((23, json!(kelvin)));
                }
                self.emit_status(&dev_id, properties);
            }
            GatewayCommand::TurnOff {
                target: Target::Device { dev_id },
            } => self.emit_status(&dev_id, vec![(20, json!(false))]),
            GatewayCommand::ReadStatus { dev_id } => {
                self.emit(GatewayEvent::OnlineStatus {
                    dev_id: dev_id.clone(),
                    available: true,
                });
                self.emit_readings(&dev_id);
            }
            GatewayCommand::GetSensorEnabled { dev_id } => {
                self.emit(GatewayEvent::SensorOnOff {
                    dev_id,
                    enabled: true,
                });
            }
            GatewayCommand::SetSensorEnabled { dev_id, enabled } => {
                self.emit(GatewayEvent::SensorOnOff { dev_id, enabled });
            }
            GatewayCommand::GetDeviceParameters { dev_id } => {
                let params = self.parameters(&dev_id);
                self.emit(GatewayEvent::DeviceParameters { dev_id, params });
            }
            GatewayCommand::SetDeviceParameters { dev_id, params } => {
                self.set_parameters(&dev_id, &params);
            }
            GatewayCommand::Restart => {
                info!("Simulated gateway {} restarting", self.serial);
            }
            // Group, broadcast, identify and scene commands have no visible echo
            _ => {}
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }
}
