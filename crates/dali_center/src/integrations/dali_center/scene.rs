use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use tracing::error;

use super::DOMAIN;
use super::entity::Availability;
use super::entity::DaliEntity;
use super::entity::EntityError;
use super::entity::gateway_ref;
use super::gateway::Gateway;
use super::gateway::GatewayCommand;
use super::gateway::GatewayEvent;
use super::model::Scene;
use super::model::SceneDetails;
use crate::engine::EntityCommand;
use crate::engine::Hub;
use crate::engine::device::DeviceSpec;
use crate::engine::entity::Entity;

pub struct DaliScene {
    scene: Scene,
    details: SceneDetails,
    gateway: Arc<dyn Gateway>,
    availability: Availability,
    hub: Option<Arc<Hub>>,
}

impl DaliScene {
    pub fn new(scene: Scene, details: SceneDetails, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            availability: Availability::for_gateway(&scene.gw_sn),
            scene,
            details,
            gateway,
            hub: None,
        }
    }

    /// Entity ids of the member lights that are registered
    fn member_entity_ids(&self) -> Vec<String> {
        let Some(hub) = &self.hub else {
            return Vec::new();
        };
        self.details
            .devices
            .iter()
            .filter_map(|member| {
                hub.entities
                    .get_entity_id("light", DOMAIN, &member.light_unique_id(&self.scene.gw_sn))
            })
            .collect()
    }
}

/// Read the details of every scene, skipping scenes that cannot be read
pub async fn load_scenes(gateway: &Arc<dyn Gateway>, scenes: &[Scene]) -> Vec<DaliScene> {
    let mut loaded = Vec::with_capacity(scenes.len());
    for scene in scenes {
        match gateway.read_scene(scene).await {
            Ok(details) => loaded.push(DaliScene::new(scene.clone(), details, gateway.clone())),
            Err(e) => error!(
                "Failed to read scene details for {}, skipping scene: {}",
                scene.name, e
            ),
        }
    }
    loaded
}

impl Entity for DaliScene {
    fn state_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn platform(&self) -> &'static str {
        "scene"
    }

    fn attributes_json(&self) -> serde_json::Value {
        json!({
            "gateway_sn": self.scene.gw_sn,
            "scene_id": self.scene.scene_id,
            "area_id": self.details.area_id,
            "channel": self.details.channel,
            "entity_id": self.member_entity_ids(),
        })
    }

    fn available(&self) -> bool {
        self.availability.available()
    }
}

#[async_trait]
impl DaliEntity for DaliScene {
    fn unique_id(&self) -> &str {
        &self.scene.unique_id
    }

    fn name(&self) -> String {
        self.scene.name.clone()
    }

    fn device(&self) -> DeviceSpec {
        gateway_ref(&self.scene.gw_sn)
    }

    fn attached(&mut self, _entity_id: &str, hub: &Arc<Hub>) {
        self.hub = Some(hub.clone());
    }

    fn handle_gateway_event(&mut self, event: &GatewayEvent) -> bool {
        self.availability.update(event)
    }

    async fn handle_command(&mut self, command: &EntityCommand) -> Result<(), EntityError> {
        if *command != EntityCommand::Activate {
            return Err(EntityError::unsupported("scene", command));
        }
        debug!("Activating scene: {}", self.scene.name);
        self.gateway
            .send(GatewayCommand::ActivateScene {
                scene_id: self.scene.scene_id,
                channel: self.scene.channel,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::entity::EntityRegistration;
    use crate::integrations::dali_center::gateway::MockGateway;
    use crate::integrations::dali_center::model::Device;
    use crate::integrations::dali_center::model::SceneMember;

    fn details(members: Vec<SceneMember>) -> SceneDetails {
        SceneDetails {
            area_id: "1".to_string(),
            channel: 0,
            devices: members,
        }
    }

    #[tokio::test]
    async fn test_unreadable_scenes_are_skipped() {
        let mock = Arc::new(MockGateway::new("GW1"));
        mock.scene_details.lock().unwrap().insert(1, details(Vec::new()));
        let gateway: Arc<dyn Gateway> = mock;
        let scenes = vec![
            Scene::new("GW1", 1, 0, "Evening"),
            Scene::new("GW1", 2, 0, "Broken"),
        ];

        let loaded = load_scenes(&gateway, &scenes).await;

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name(), "Evening");
    }

    #[tokio::test]
    async fn test_attributes_map_members_to_light_entities() {
        let hub = Arc::new(Hub::new());
        let light = Device::new("GW1", "0102", 0, 4, "Desk");
        let light_entity = hub.entities.get_or_create(EntityRegistration {
            domain: "light",
            platform: DOMAIN,
            unique_id: &light.unique_id,
            suggested_object_id: "Desk Light",
            device_id: None,
            config_entry_id: None,
            capabilities: serde_json::Value::Null,
        });
        let members = vec![
            SceneMember {
                dev_type: "0102".to_string(),
                channel: 0,
                address: 4,
            },
            // Not registered, left out
            SceneMember {
                dev_type: "0401".to_string(),
                channel: 0,
                address: 1,
            },
        ];
        let gateway = Arc::new(MockGateway::new("GW1"));
        let mut scene = DaliScene::new(
            Scene::new("GW1", 3, 0, "Evening"),
            details(members),
            gateway.clone(),
        );
        scene.attached("scene.evening", &hub);

        let attributes = scene.attributes_json();
        assert_eq!(attributes["entity_id"], json!([light_entity]));
        assert_eq!(attributes["scene_id"], json!(3));
        assert_eq!(attributes["area_id"], json!("1"));

        scene.handle_command(&EntityCommand::Activate).await.unwrap();
        assert_eq!(
            gateway.sent(),
            vec![GatewayCommand::ActivateScene {
                scene_id: 3,
                channel: 0
            }]
        );
    }
}
