//! Entity abstraction and registry.
//!
//! All entities (lights, switches, sensors, etc.) implement the Entity trait.
//! The registry hands out stable entity ids and links entities to devices.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

/// Base trait that all entities must implement
pub trait Entity: Send + Sync {
    /// Serialize current state to JSON for Engine storage
    fn state_json(&self) -> serde_json::Value;

    /// Return the platform type of this entity (e.g. "light", "sensor")
    fn platform(&self) -> &'static str;

    /// Extra attributes shown alongside the state
    fn attributes_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityEntry {
    pub entity_id: String,
    pub unique_id: String,
    /// Entity platform, e.g. "light"
    pub domain: String,
    /// Integration that owns the entity, e.g. "dali_center"
    pub platform: String,
    pub device_id: Option<String>,
    pub config_entry_id: Option<String>,
    /// Static capabilities such as the event types of an event entity
    pub capabilities: serde_json::Value,
}

/// Everything needed to register an entity
#[derive(Debug, Clone)]
pub struct EntityRegistration<'a> {
    pub domain: &'a str,
    pub platform: &'a str,
    pub unique_id: &'a str,
    pub suggested_object_id: &'a str,
    pub device_id: Option<String>,
    pub config_entry_id: Option<String>,
    pub capabilities: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct EntityRegistry {
    entries: Mutex<HashMap<String, EntityEntry>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, returning its entity id.
    ///
    /// Re-registering the same `(domain, platform, unique_id)` keeps the
    /// original entity id.
    pub fn get_or_create(&self, registration: EntityRegistration<'_>) -> String {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = entries.values_mut().find(|e| {
            e.domain == registration.domain
                && e.platform == registration.platform
                && e.unique_id == registration.unique_id
        }) {
            existing.device_id = registration.device_id;
            existing.config_entry_id = registration.config_entry_id;
            existing.capabilities = registration.capabilities;
            return existing.entity_id.clone();
        }

        let base = format!(
            "{}.{}",
            registration.domain,
            slugify(registration.suggested_object_id)
        );
        let mut entity_id = base.clone();
        let mut suffix = 2;
        while entries.contains_key(&entity_id) {
            entity_id = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        debug!(
            "Registered entity {} (unique_id {})",
            entity_id, registration.unique_id
        );
        entries.insert(
            entity_id.clone(),
            EntityEntry {
                entity_id: entity_id.clone(),
                unique_id: registration.unique_id.to_string(),
                domain: registration.domain.to_string(),
                platform: registration.platform.to_string(),
                device_id: registration.device_id,
                config_entry_id: registration.config_entry_id,
                capabilities: registration.capabilities,
            },
        );
        entity_id
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(entity_id)
            .cloned()
    }

    pub fn get_entity_id(&self, domain: &str, platform: &str, unique_id: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|e| e.domain == domain && e.platform == platform && e.unique_id == unique_id)
            .map(|e| e.entity_id.clone())
    }

    pub fn entries_for_device(&self, device_id: &str) -> Vec<EntityEntry> {
        let mut found: Vec<EntityEntry> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|e| e.device_id.as_deref() == Some(device_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        found
    }

    pub fn remove(&self, entity_id: &str) -> Option<EntityEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(entity_id)
    }

    /// Remove every entity attached to a device, returning their ids
    pub fn remove_for_device(&self, device_id: &str) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut removed: Vec<String> = entries
            .values()
            .filter(|e| e.device_id.as_deref() == Some(device_id))
            .map(|e| e.entity_id.clone())
            .collect();
        removed.sort();
        for entity_id in &removed {
            entries.remove(entity_id);
        }
        removed
    }
}

/// Turn a display name into an entity object id ("Living Room" -> "living_room")
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration<'a>(unique_id: &'a str, name: &'a str) -> EntityRegistration<'a> {
        EntityRegistration {
            domain: "light",
            platform: "dali_center",
            unique_id,
            suggested_object_id: name,
            device_id: Some("dev1".to_string()),
            config_entry_id: Some("entry1".to_string()),
            capabilities: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Living Room Light"), "living_room_light");
        assert_eq!(slugify("  Hall -- 2 "), "hall_2");
        assert_eq!(slugify("!!!"), "unnamed");
    }

    #[test]
    fn test_entity_ids_are_unique_and_stable() {
        let registry = EntityRegistry::new();
        let a = registry.get_or_create(registration("u1", "Kitchen"));
        let b = registry.get_or_create(registration("u2", "Kitchen"));
        let again = registry.get_or_create(registration("u1", "Renamed"));

        assert_eq!(a, "light.kitchen");
        assert_eq!(b, "light.kitchen_2");
        assert_eq!(again, a);
        assert_eq!(
            registry.get_entity_id("light", "dali_center", "u2"),
            Some(b)
        );
    }

    #[test]
    fn test_remove_for_device() {
        let registry = EntityRegistry::new();
        registry.get_or_create(registration("u1", "One"));
        registry.get_or_create(registration("u2", "Two"));

        let removed = registry.remove_for_device("dev1");
        assert_eq!(removed, vec!["light.one".to_string(), "light.two".to_string()]);
        assert!(registry.entries_for_device("dev1").is_empty());
    }
}
