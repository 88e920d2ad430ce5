use std::collections::HashMap;

use serde::Serialize;

use super::entity::Entity;

/// State of a single entity as the engine stores it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EntityState {
    /// Platform type, e.g. "light" or "sensor".
    pub platform: String,

    /// Platform-specific state value.
    pub state: serde_json::Value,

    /// Extra attributes (gateway serial, address, channel, ...).
    pub attributes: serde_json::Value,

    pub available: bool,
}

impl EntityState {
    /// Snapshot an entity's current state
    pub fn of<E: Entity + ?Sized>(entity: &E) -> Self {
        Self {
            platform: entity.platform().to_string(),
            state: entity.state_json(),
            attributes: entity.attributes_json(),
            available: entity.available(),
        }
    }
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub entities: HashMap<String, EntityState>,
}
