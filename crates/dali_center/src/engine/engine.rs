use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::hub::Hub;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::EntityCommand;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::State;
use crate::engine::IntegrationContext;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No integration found for entity: {0}")]
    UnknownEntity(String),

    #[error("No integration handles domain: {0}")]
    UnknownDomain(String),

    #[error("Integration {0} is no longer running")]
    IntegrationGone(String),
}

/// Engine
///
/// This structure handles the flow of events, sending commands to the correct
/// integration, and maintaining a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Host services handed to integrations
    hub: Arc<Hub>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        Self::with_hub(Arc::new(Hub::new()))
    }

    pub fn with_hub(hub: Arc<Hub>) -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            hub,
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Register integrations from configuration
    ///
    /// Every factory in the integration registry is offered the config and
    /// registers its integration if it is configured.
    pub fn register_integrations_from_config(&mut self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext {
            config: cfg,
            hub: self.hub.clone(),
        };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        self.integration_channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Close every integration's command channel and wait for the
    /// integrations to shut down
    pub async fn shutdown(&self) {
        info!("Shutting down integrations");
        self.integration_channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        let handles = std::mem::take(
            &mut *self
                .integration_handles
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Integration task failed: {}", e);
            }
        }
    }

    /// Send a command to an integration
    ///
    /// Entity commands are routed by entity_id, service calls by domain.
    pub fn send_command(&self, domain: Option<&str>, msg: ToIntegrationMessage) -> Result<(), EngineError> {
        let integration_name = match (&msg, domain) {
            (ToIntegrationMessage::EntityCommand { entity_id, .. }, _) => {
                let map = self
                    .entity_integration_map
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                map.get(entity_id)
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownEntity(entity_id.clone()))?
            }
            (ToIntegrationMessage::CallService { .. }, Some(domain)) => domain.to_string(),
            (ToIntegrationMessage::CallService { .. }, None) => {
                return Err(EngineError::UnknownDomain(String::new()));
            }
        };

        let tx = self
            .integration_channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&integration_name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDomain(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| EngineError::IntegrationGone(integration_name))
    }

    /// Call a service, e.g. `dali_center.scan_bus`
    pub fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
    ) -> Result<(), EngineError> {
        info!("Calling service {}.{}", domain, service);
        self.send_command(
            Some(domain),
            ToIntegrationMessage::CallService {
                service: service.to_string(),
                data,
            },
        )
    }

    /// Send a command to one entity
    pub fn send_entity_command(
        &self,
        entity_id: String,
        command: EntityCommand,
    ) -> Result<(), EngineError> {
        self.send_command(None, ToIntegrationMessage::EntityCommand { entity_id, command })
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        // Main event loop - only receives FromIntegration messages
        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
                state,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                // Record which integration owns this entity for command routing.
                self.entity_integration_map
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(entity_id.clone(), integration_name);

                self.state.rcu(|current| {
                    let mut next = State::clone(current);
                    next.entities.insert(entity_id.clone(), state.clone());
                    next
                });
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);

                self.state.rcu(|current| {
                    let mut next = State::clone(current);
                    next.entities.remove(&entity_id);
                    next
                });

                // Remove from routing map
                self.entity_integration_map
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&entity_id);
            }
            FromIntegrationMessage::EntityStateChanged { entity_id, state } => {
                debug!(
                    "Entity state changed: {} -> {} (available: {})",
                    entity_id, state.state, state.available
                );

                self.state.rcu(|current| {
                    let mut next = State::clone(current);
                    next.entities.insert(entity_id.clone(), state.clone());
                    next
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
