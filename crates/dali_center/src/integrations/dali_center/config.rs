use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

fn default_scan_timeout_secs() -> u64 {
    600
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_max_concurrent_setups() -> usize {
    2
}

fn default_port() -> u16 {
    1883
}

fn default_backend() -> String {
    "simulated".to_string()
}

/// Configuration for the DALI Center integration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Upper bound on one bus scan (default: 600 seconds)
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    /// Upper bound on connecting to a gateway (default: 15 seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Delay before retrying an entry that was not ready
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,

    /// Gateways initialised at the same time
    #[serde(default = "default_max_concurrent_setups")]
    pub max_concurrent_setups: usize,

    /// Configured gateways, keyed by entry id
    #[serde(default)]
    pub entries: BTreeMap<String, EntryConfig>,
}

impl Config {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

/// One configured gateway
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawEntryConfig")]
pub struct EntryConfig {
    pub serial_number: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub name: String,

    /// Gateway backend to drive this entry with
    pub backend: String,

    pub simulated: SimulatedConfig,
}

/// Bus contents for the simulated backend
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulatedConfig {
    /// Channels the gateway reports
    #[serde(default)]
    pub channels: Vec<u8>,

    /// Devices known to the gateway at connect time
    #[serde(default)]
    pub devices: Vec<SimulatedDevice>,

    /// Devices a bus scan finds (defaults to `devices`)
    #[serde(default)]
    pub bus: Option<Vec<SimulatedDevice>>,

    #[serde(default)]
    pub groups: Vec<SimulatedGroup>,

    #[serde(default)]
    pub scenes: Vec<SimulatedScene>,

    /// How long a bus scan takes
    #[serde(default)]
    pub scan_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulatedDevice {
    pub dev_type: String,
    #[serde(default)]
    pub channel: u8,
    pub address: u8,
    pub name: String,
    #[serde(default)]
    pub color_mode: Option<String>,
    /// Energy total in Wh for lights, lux for illuminance sensors
    #[serde(default)]
    pub reading: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulatedGroup {
    pub group_id: u8,
    #[serde(default)]
    pub channel: u8,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulatedScene {
    pub scene_id: u8,
    #[serde(default)]
    pub channel: u8,
    pub name: String,
    /// Member devices as `(dev_type, channel, address)`
    #[serde(default)]
    pub members: Vec<(String, u8, u8)>,
}

/// Gateway table as written by older releases
#[derive(Debug, Clone, Deserialize)]
struct LegacyGateway {
    gw_sn: String,
    gw_ip: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    username: String,
    #[serde(default)]
    passwd: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntryConfig {
    #[serde(default)]
    gateway: Option<LegacyGateway>,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_backend")]
    backend: String,
    #[serde(default)]
    simulated: SimulatedConfig,
}

impl TryFrom<RawEntryConfig> for EntryConfig {
    type Error = String;

    fn try_from(raw: RawEntryConfig) -> Result<Self, Self::Error> {
        if let Some(legacy) = raw.gateway {
            info!(
                "Migrating gateway configuration for {} from legacy format",
                legacy.gw_sn
            );
            return Ok(migrate_gateway_config(legacy, raw.backend, raw.simulated));
        }

        let serial_number = raw
            .serial_number
            .ok_or_else(|| "missing field `serial_number`".to_string())?;
        let host = raw.host.ok_or_else(|| "missing field `host`".to_string())?;

        Ok(EntryConfig {
            name: raw.name.unwrap_or_else(|| serial_number.clone()),
            serial_number,
            host,
            port: raw.port.unwrap_or_else(default_port),
            username: raw.username.unwrap_or_default(),
            password: raw.password.unwrap_or_default(),
            backend: raw.backend,
            simulated: raw.simulated,
        })
    }
}

fn migrate_gateway_config(
    legacy: LegacyGateway,
    backend: String,
    simulated: SimulatedConfig,
) -> EntryConfig {
    EntryConfig {
        name: legacy.name.unwrap_or_else(|| legacy.gw_sn.clone()),
        serial_number: legacy.gw_sn,
        host: legacy.gw_ip,
        port: legacy.port,
        username: legacy.username,
        password: legacy.passwd,
        backend,
        simulated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config: Config = toml::from_str(
            r#"
            [entries.office]
            serial_number = "6A242121110E"
            host = "192.168.1.20"
            "#,
        )
        .unwrap();

        assert_eq!(config.scan_timeout(), Duration::from_secs(600));
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.max_concurrent_setups, 2);

        let entry = &config.entries["office"];
        assert_eq!(entry.port, 1883);
        assert_eq!(entry.name, "6A242121110E");
        assert_eq!(entry.backend, "simulated");
        assert!(entry.simulated.devices.is_empty());
    }

    #[test]
    fn test_legacy_gateway_table_is_migrated() {
        let config: Config = toml::from_str(
            r#"
            [entries.old]
            gateway = { gw_sn = "6A242121110E", gw_ip = "10.0.0.5", port = 8883, username = "admin", passwd = "secret", name = "Hall" }
            "#,
        )
        .unwrap();

        assert_eq!(
            config.entries["old"],
            EntryConfig {
                serial_number: "6A242121110E".to_string(),
                host: "10.0.0.5".to_string(),
                port: 8883,
                username: "admin".to_string(),
                password: "secret".to_string(),
                name: "Hall".to_string(),
                backend: "simulated".to_string(),
                simulated: SimulatedConfig::default(),
            }
        );
    }

    #[test]
    fn test_missing_serial_number_is_rejected() {
        let err = toml::from_str::<Config>(
            r#"
            [entries.broken]
            host = "10.0.0.5"
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("serial_number"));
    }

    #[test]
    fn test_parse_simulated_bus() {
        let config: Config = toml::from_str(
            r#"
            scan_timeout_secs = 30

            [entries.lab]
            serial_number = "6A242121110E"
            host = "127.0.0.1"

            [entries.lab.simulated]
            channels = [0, 1]
            scan_duration_ms = 250

            [[entries.lab.simulated.devices]]
            dev_type = "0102"
            address = 1
            name = "Desk"
            color_mode = "color_temp"

            [[entries.lab.simulated.scenes]]
            scene_id = 3
            name = "Evening"
            members = [["0102", 0, 1]]
            "#,
        )
        .unwrap();

        assert_eq!(config.scan_timeout(), Duration::from_secs(30));
        let sim = &config.entries["lab"].simulated;
        assert_eq!(sim.channels, vec![0, 1]);
        assert_eq!(sim.devices[0].color_mode.as_deref(), Some("color_temp"));
        assert_eq!(sim.scenes[0].members, vec![("0102".to_string(), 0, 1)]);
        assert!(sim.bus.is_none());
    }
}
