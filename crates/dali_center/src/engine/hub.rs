use std::sync::Arc;

use super::device::DeviceRegistry;
use super::dispatcher::Dispatcher;
use super::entity::EntityRegistry;
use super::event::EventBus;
use super::notification::PersistentNotifications;

/// Host services shared by the engine and every integration
#[derive(Default)]
pub struct Hub {
    pub dispatcher: Dispatcher,
    pub notifications: Arc<PersistentNotifications>,
    pub devices: DeviceRegistry,
    pub entities: EntityRegistry,
    pub bus: EventBus,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a device and every entity attached to it.
    ///
    /// Returns the removed entity ids, or `None` if the device was unknown.
    pub fn remove_device(&self, device_id: &str) -> Option<Vec<String>> {
        self.devices.remove_device(device_id)?;
        Some(self.entities.remove_for_device(device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::device::DeviceSpec;
    use crate::engine::entity::EntityRegistration;

    #[test]
    fn test_remove_device_cascades_to_entities() {
        let hub = Hub::new();
        let device = hub.devices.get_or_create(
            "entry1",
            DeviceSpec::new(("dali_center".to_string(), "light1".to_string())),
        );
        let entity_id = hub.entities.get_or_create(EntityRegistration {
            domain: "light",
            platform: "dali_center",
            unique_id: "light1",
            suggested_object_id: "Desk",
            device_id: Some(device.id.clone()),
            config_entry_id: Some("entry1".to_string()),
            capabilities: serde_json::Value::Null,
        });

        assert_eq!(hub.remove_device(&device.id), Some(vec![entity_id.clone()]));
        assert!(hub.entities.get(&entity_id).is_none());
        assert_eq!(hub.remove_device(&device.id), None);
    }
}
