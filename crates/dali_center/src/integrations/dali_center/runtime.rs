use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use tracing::debug;

use super::gateway::Gateway;
use super::model::Device;
use super::model::Group;
use super::model::Scene;

/// Outcome of aligning the device list with one scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanDiff {
    /// Devices present now and absent before, in scan order
    pub added: Vec<Device>,
    /// Devices present before and absent now, in their old order
    pub removed: Vec<Device>,
    pub unchanged: usize,
}

/// The devices known for one gateway.
///
/// Readers take snapshots; the membership only ever changes through
/// [`DeviceCollection::apply_scan_diff`], which runs under a single lock.
#[derive(Debug, Default)]
pub struct DeviceCollection {
    devices: Mutex<Vec<Device>>,
}

impl DeviceCollection {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
        }
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make the membership equal the scanned set.
    ///
    /// New devices are appended in scan order after the existing ones;
    /// devices in both sets are left as they are.
    pub fn apply_scan_diff(&self, scanned: &[Device]) -> ScanDiff {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());

        let scanned_ids: HashSet<&str> = scanned.iter().map(|d| d.dev_id.as_str()).collect();
        let existing_ids: HashSet<String> = devices.iter().map(|d| d.dev_id.clone()).collect();

        let mut seen = HashSet::new();
        let added: Vec<Device> = scanned
            .iter()
            .filter(|d| !existing_ids.contains(&d.dev_id) && seen.insert(d.dev_id.as_str()))
            .cloned()
            .collect();

        let (kept, removed): (Vec<Device>, Vec<Device>) = devices
            .drain(..)
            .partition(|d| scanned_ids.contains(d.dev_id.as_str()));
        *devices = kept;
        devices.extend(added.iter().cloned());

        let unchanged = scanned_ids.len() - added.len();
        debug!(
            "Applied scan: {} added, {} removed, {} unchanged",
            added.len(),
            removed.len(),
            unchanged
        );

        ScanDiff {
            added,
            removed,
            unchanged,
        }
    }
}

/// Live state of one configured gateway entry
pub struct GatewayRuntime {
    pub entry_id: String,
    pub gateway: Arc<dyn Gateway>,
    pub devices: DeviceCollection,
    pub groups: Vec<Group>,
    pub scenes: Vec<Scene>,
}

impl GatewayRuntime {
    pub fn new(
        entry_id: &str,
        gateway: Arc<dyn Gateway>,
        devices: Vec<Device>,
        groups: Vec<Group>,
        scenes: Vec<Scene>,
    ) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            gateway,
            devices: DeviceCollection::new(devices),
            groups,
            scenes,
        }
    }

    pub fn gw_sn(&self) -> &str {
        self.gateway.serial_number()
    }
}
