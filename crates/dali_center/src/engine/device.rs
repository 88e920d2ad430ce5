use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;
use tracing::debug;
use tracing::info;

/// `(domain, id)` pair naming a device from an integration's point of view
pub type DeviceIdentifier = (String, String);

/// Connection type for devices identified by a network MAC address
pub const CONNECTION_NETWORK_MAC: &str = "mac";

/// What an integration knows about a device when registering it
#[derive(Debug, Clone, Default)]
pub struct DeviceSpec {
    pub identifiers: Vec<DeviceIdentifier>,
    pub connections: Vec<(String, String)>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub sw_version: Option<String>,
    pub hw_version: Option<String>,
    /// Identifier of the device this one is reached through (e.g. its gateway)
    pub via_device: Option<DeviceIdentifier>,
}

impl DeviceSpec {
    pub fn new(identifier: DeviceIdentifier) -> Self {
        Self {
            identifiers: vec![identifier],
            ..Default::default()
        }
    }
}

/// A device in the registry.
///
/// A device represents a physical or logical device that contains one or more entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEntry {
    pub id: String,
    pub config_entries: BTreeSet<String>,
    pub identifiers: Vec<DeviceIdentifier>,
    pub connections: Vec<(String, String)>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub sw_version: Option<String>,
    pub hw_version: Option<String>,
    pub via_device_id: Option<String>,
}

impl DeviceEntry {
    fn matches(&self, spec: &DeviceSpec) -> bool {
        spec.identifiers.iter().any(|i| self.identifiers.contains(i))
            || spec.connections.iter().any(|c| self.connections.contains(c))
    }

    fn merge(&mut self, spec: DeviceSpec, via_device_id: Option<String>) {
        for identifier in spec.identifiers {
            if !self.identifiers.contains(&identifier) {
                self.identifiers.push(identifier);
            }
        }
        for connection in spec.connections {
            if !self.connections.contains(&connection) {
                self.connections.push(connection);
            }
        }

        // Only fields the integration knows about overwrite what is stored
        self.name = spec.name.or(self.name.take());
        self.manufacturer = spec.manufacturer.or(self.manufacturer.take());
        self.model = spec.model.or(self.model.take());
        self.serial_number = spec.serial_number.or(self.serial_number.take());
        self.sw_version = spec.sw_version.or(self.sw_version.take());
        self.hw_version = spec.hw_version.or(self.hw_version.take());
        self.via_device_id = via_device_id.or(self.via_device_id.take());
    }
}

/// Registry of every device known to the hub, keyed by registry id
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<String, DeviceEntry>>,
    next_id: AtomicU64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the device matching any of the spec's identifiers or
    /// connections, or create it, and attach it to `config_entry_id`.
    pub fn get_or_create(&self, config_entry_id: &str, spec: DeviceSpec) -> DeviceEntry {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());

        let via_device_id = spec.via_device.as_ref().and_then(|via| {
            devices
                .values()
                .find(|d| d.identifiers.contains(via))
                .map(|d| d.id.clone())
        });

        if let Some(existing) = devices.values_mut().find(|d| d.matches(&spec)) {
            existing.config_entries.insert(config_entry_id.to_string());
            existing.merge(spec, via_device_id);
            debug!("Updated device {}", existing.id);
            return existing.clone();
        }

        let id = format!("{:032x}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let entry = DeviceEntry {
            id: id.clone(),
            config_entries: BTreeSet::from([config_entry_id.to_string()]),
            identifiers: spec.identifiers,
            connections: spec.connections,
            name: spec.name,
            manufacturer: spec.manufacturer,
            model: spec.model,
            serial_number: spec.serial_number,
            sw_version: spec.sw_version,
            hw_version: spec.hw_version,
            via_device_id,
        };
        info!(
            "Registered device {} ({})",
            entry.name.as_deref().unwrap_or("unnamed"),
            id
        );
        devices.insert(id, entry.clone());
        entry
    }

    /// Look up a device by its registry id
    pub fn get(&self, device_id: &str) -> Option<DeviceEntry> {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .cloned()
    }

    /// Look up a device by an integration identifier
    pub fn get_device(&self, domain: &str, id: &str) -> Option<DeviceEntry> {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|d| d.identifiers.iter().any(|(dm, i)| dm == domain && i == id))
            .cloned()
    }

    pub fn entries_for_config_entry(&self, config_entry_id: &str) -> Vec<DeviceEntry> {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|d| d.config_entries.contains(config_entry_id))
            .cloned()
            .collect()
    }

    /// Remove a device. Devices reached through it lose their link.
    pub fn remove_device(&self, device_id: &str) -> Option<DeviceEntry> {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        let removed = devices.remove(device_id)?;

        for other in devices.values_mut() {
            if other.via_device_id.as_deref() == Some(device_id) {
                other.via_device_id = None;
            }
        }

        info!("Removed device {}", device_id);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.devices.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(id: &str) -> DeviceIdentifier {
        ("dali_center".to_string(), id.to_string())
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let registry = DeviceRegistry::new();
        let first = registry.get_or_create("entry1", DeviceSpec::new(ident("gw1")));
        let second = registry.get_or_create(
            "entry1",
            DeviceSpec {
                name: Some("Gateway".to_string()),
                ..DeviceSpec::new(ident("gw1"))
            },
        );

        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Gateway"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_by_identifier_and_via_device() {
        let registry = DeviceRegistry::new();
        let gateway = registry.get_or_create("entry1", DeviceSpec::new(ident("gw1")));
        let light = registry.get_or_create(
            "entry1",
            DeviceSpec {
                via_device: Some(ident("gw1")),
                ..DeviceSpec::new(ident("light1"))
            },
        );

        assert_eq!(light.via_device_id.as_deref(), Some(gateway.id.as_str()));
        assert_eq!(
            registry.get_device("dali_center", "light1").map(|d| d.id),
            Some(light.id.clone())
        );
        assert!(registry.get_device("other", "light1").is_none());
        assert_eq!(registry.entries_for_config_entry("entry1").len(), 2);
    }

    #[test]
    fn test_remove_device_unlinks_children() {
        let registry = DeviceRegistry::new();
        let gateway = registry.get_or_create("entry1", DeviceSpec::new(ident("gw1")));
        let light = registry.get_or_create(
            "entry1",
            DeviceSpec {
                via_device: Some(ident("gw1")),
                ..DeviceSpec::new(ident("light1"))
            },
        );

        assert!(registry.remove_device(&gateway.id).is_some());
        assert!(registry.remove_device(&gateway.id).is_none());
        assert_eq!(registry.get(&light.id).unwrap().via_device_id, None);
    }
}
