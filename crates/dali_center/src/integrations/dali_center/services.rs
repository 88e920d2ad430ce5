//! `dali_center.scan_bus` and `dali_center.stop_scan`.
//!
//! Both services take a `device_id` (one id or a list) and act on the
//! entries those devices belong to.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::scan::ScanLauncher;
use crate::engine::Hub;

pub const SERVICE_SCAN_BUS: &str = "scan_bus";
pub const SERVICE_STOP_SCAN: &str = "stop_scan";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("invalid service data: {0}")]
    InvalidData(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeviceIds {
    One(String),
    Many(Vec<String>),
}

impl Default for DeviceIds {
    fn default() -> Self {
        DeviceIds::Many(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct ServiceData {
    /// Missing means no devices
    #[serde(default)]
    device_id: DeviceIds,
}

pub fn parse_device_ids(data: &serde_json::Value) -> Result<Vec<String>, ServiceError> {
    let data = ServiceData::deserialize(data)?;
    Ok(match data.device_id {
        DeviceIds::One(id) => vec![id],
        DeviceIds::Many(ids) => ids,
    })
}

/// Launchers of the loaded entries the devices belong to, each at most once
pub fn resolve_launchers(
    hub: &Hub,
    device_ids: &[String],
    loaded: &BTreeMap<String, Arc<ScanLauncher>>,
) -> Vec<Arc<ScanLauncher>> {
    let mut launchers: Vec<Arc<ScanLauncher>> = Vec::new();
    for device_id in device_ids {
        let launcher = hub.devices.get(device_id).and_then(|device| {
            device
                .config_entries
                .iter()
                .find_map(|entry_id| loaded.get(entry_id))
                .cloned()
        });
        match launcher {
            Some(launcher) => {
                if !launchers.iter().any(|l| Arc::ptr_eq(l, &launcher)) {
                    launchers.push(launcher);
                }
            }
            None => warn!("No config entry found for device {}", device_id),
        }
    }
    launchers
}

/// Handle a service call.
///
/// `scan_bus` returns the task running the scans; they run one entry after
/// the other, so the caller is never blocked and `stop_scan` stays usable.
pub async fn call_service(
    service: &str,
    data: &serde_json::Value,
    hub: &Hub,
    loaded: &BTreeMap<String, Arc<ScanLauncher>>,
) -> Result<Option<JoinHandle<()>>, ServiceError> {
    match service {
        SERVICE_SCAN_BUS => {
            let launchers = resolve_launchers(hub, &parse_device_ids(data)?, loaded);
            Ok(Some(tokio::spawn(async move {
                for launcher in launchers {
                    let Some(scan) = launcher.launch() else {
                        continue;
                    };
                    if let Err(e) = scan.await {
                        error!("Bus scan task failed: {}", e);
                    }
                }
            })))
        }
        SERVICE_STOP_SCAN => {
            for launcher in resolve_launchers(hub, &parse_device_ids(data)?, loaded) {
                match launcher.stop().await {
                    Ok(true) => info!("Stopped bus scan for gateway {}", launcher.runtime().gw_sn()),
                    Ok(false) => {}
                    Err(e) => error!(
                        "Failed to stop bus scan for gateway {}: {}",
                        launcher.runtime().gw_sn(),
                        e
                    ),
                }
            }
            Ok(None)
        }
        other => Err(ServiceError::UnknownService(other.to_string())),
    }
}
