//! Entry setup and unload.
//!
//! Setting up an entry connects to its gateway, discovers what is on the
//! bus, registers the gateway device and then adds every entity the
//! platforms build for it. Background tasks keep the entities in step with
//! gateway push events and with bus scans.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::Semaphore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::DOMAIN;
use super::button::IdentifyButton;
use super::button::RestartButton;
use super::button::ScanButton;
use super::config::Config;
use super::entity::EntityError;
use super::entity::SharedEntity;
use super::entity::gateway_device_spec;
use super::entity::shared;
use super::event::PanelEvent;
use super::gateway::Gateway;
use super::gateway::GatewayError;
use super::gateway::GatewayEvent;
use super::light::AllLights;
use super::light::DaliLight;
use super::light::DaliLightGroup;
use super::model::Device;
use super::model::DeviceKind;
use super::number::ParameterNumber;
use super::runtime::GatewayRuntime;
use super::scan::ScanLauncher;
use super::scene::load_scenes;
use super::sensor::EnergySensor;
use super::sensor::IlluminanceSensor;
use super::sensor::MotionSensor;
use super::signal_add_entities;
use super::signal_remove_entities;
use super::signal_scan_state;
use super::switch::SensorEnableSwitch;
use crate::engine::EntityCommand;
use crate::engine::EntityState;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Hub;
use crate::engine::dispatcher::DispatchError;
use crate::engine::entity::EntityRegistration;
use crate::engine::notification::NotificationSink;

const CONNECT_TIMEOUT_MESSAGE: &str = "Timeout while connecting to DALI Center gateway.";

/// Why an entry could not be set up. Every variant leaves the entry not
/// ready; setup is retried later.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("gateway {gw_sn} connection failed: {source}")]
    Connection {
        gw_sn: String,
        #[source]
        source: GatewayError,
    },

    #[error("timeout connecting to gateway {0}")]
    ConnectTimeout(String),

    #[error("failed to discover entities for gateway {gw_sn}: {source}")]
    Discovery {
        gw_sn: String,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    Signal(#[from] DispatchError),
}

/// Show an error to the user as a persistent notification.
///
/// The id is derived from the message so the same error is shown once.
pub fn notify_user_error(sink: &dyn NotificationSink, gw_sn: &str, title: &str, message: &str) {
    let mut hasher = DefaultHasher::new();
    format!("{}{}", title, message).hash(&mut hasher);
    sink.create(
        &format!("{}_{}_{}", DOMAIN, gw_sn, hasher.finish()),
        &format!("DALI Center ({}): {}", gw_sn, title),
        message,
    );
}

/// Entities of one entry, keyed by entity id
#[derive(Clone)]
pub struct EntryEntities {
    entry_id: String,
    hub: Arc<Hub>,
    gateway: Arc<dyn Gateway>,
    to_engine: FromIntegrationSender,
    table: Arc<Mutex<HashMap<String, SharedEntity>>>,
}

impl EntryEntities {
    pub fn new(
        entry_id: &str,
        hub: Arc<Hub>,
        gateway: Arc<dyn Gateway>,
        to_engine: FromIntegrationSender,
    ) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            hub,
            gateway,
            to_engine,
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn report(&self, msg: FromIntegrationMessage) {
        if self.to_engine.send(msg).await.is_err() {
            debug!("[{}] Engine is gone, dropping update", self.entry_id);
        }
    }

    pub async fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.table.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn snapshot(&self) -> Vec<(String, SharedEntity)> {
        self.table
            .lock()
            .await
            .iter()
            .map(|(id, entity)| (id.clone(), entity.clone()))
            .collect()
    }

    /// Register entities, announce them to the engine, then send their
    /// initial gateway commands. Returns the ids that were added.
    pub async fn add(&self, entities: Vec<SharedEntity>) -> Vec<String> {
        let mut added = Vec::new();
        let mut commands = Vec::new();

        for entity in entities {
            let mut guard = entity.lock().await;
            let device = self
                .hub
                .devices
                .get_or_create(&self.entry_id, guard.device());
            let entity_id = self.hub.entities.get_or_create(EntityRegistration {
                domain: guard.platform(),
                platform: DOMAIN,
                unique_id: guard.unique_id(),
                suggested_object_id: &guard.name(),
                device_id: Some(device.id),
                config_entry_id: Some(self.entry_id.clone()),
                capabilities: guard.capabilities(),
            });

            {
                let mut table = self.table.lock().await;
                if table.contains_key(&entity_id) {
                    debug!("[{}] {} already added", self.entry_id, entity_id);
                    continue;
                }
                table.insert(entity_id.clone(), entity.clone());
            }

            guard.attached(&entity_id, &self.hub);
            commands.extend(guard.initial_commands());
            let state = EntityState::of(&*guard);
            drop(guard);

            self.report(FromIntegrationMessage::EntityDiscovered {
                entity_id: entity_id.clone(),
                integration_name: DOMAIN.to_string(),
                state,
            })
            .await;
            added.push(entity_id);
        }

        for command in commands {
            if let Err(e) = self.gateway.send(command).await {
                warn!("[{}] Initial command failed: {}", self.entry_id, e);
            }
        }
        added
    }

    /// Drop entities from the table and tell the engine
    pub async fn remove(&self, entity_ids: &[String]) {
        for entity_id in entity_ids {
            if self.table.lock().await.remove(entity_id).is_none() {
                continue;
            }
            info!("[{}] Removing entity {}", self.entry_id, entity_id);
            self.report(FromIntegrationMessage::EntityRemoved {
                entity_id: entity_id.clone(),
            })
            .await;
        }
    }

    async fn publish_changes<F>(&self, mut apply: F)
    where
        F: FnMut(&mut dyn super::entity::DaliEntity) -> bool,
    {
        for (entity_id, entity) in self.snapshot().await {
            let mut guard = entity.lock().await;
            if !apply(&mut *guard) {
                continue;
            }
            let state = EntityState::of(&*guard);
            drop(guard);
            self.report(FromIntegrationMessage::EntityStateChanged { entity_id, state })
                .await;
        }
    }

    pub async fn handle_gateway_event(&self, event: &GatewayEvent) {
        self.publish_changes(|entity| entity.handle_gateway_event(event))
            .await;
    }

    pub async fn handle_scan_state(&self, scanning: bool) {
        self.publish_changes(|entity| entity.handle_scan_state(scanning))
            .await;
    }

    /// Run a command on one entity and publish its state afterwards.
    ///
    /// Returns `Ok(false)` if the entity is not part of this entry.
    pub async fn command(
        &self,
        entity_id: &str,
        command: &EntityCommand,
    ) -> Result<bool, EntityError> {
        let Some(entity) = self.table.lock().await.get(entity_id).cloned() else {
            return Ok(false);
        };

        let mut guard = entity.lock().await;
        guard.handle_command(command).await?;
        let state = EntityState::of(&*guard);
        drop(guard);

        self.report(FromIntegrationMessage::EntityStateChanged {
            entity_id: entity_id.to_string(),
            state,
        })
        .await;
        Ok(true)
    }
}

/// Entities a single bus device contributes
pub fn device_entities(device: &Device, gateway: &Arc<dyn Gateway>) -> Vec<SharedEntity> {
    let mut entities = Vec::new();
    match device.kind() {
        DeviceKind::Light => {
            entities.push(shared(DaliLight::new(device.clone(), gateway.clone())));
            entities.push(shared(EnergySensor::new(device.clone())));
            entities.push(shared(IdentifyButton::new(device.clone(), gateway.clone())));
            entities.extend(
                ParameterNumber::all_for(device, gateway)
                    .into_iter()
                    .map(shared),
            );
        }
        DeviceKind::MotionSensor => {
            entities.push(shared(MotionSensor::new(device.clone())));
        }
        DeviceKind::IlluminanceSensor => {
            entities.push(shared(IlluminanceSensor::new(device.clone())));
            entities.push(shared(SensorEnableSwitch::new(
                device.clone(),
                gateway.clone(),
            )));
        }
        DeviceKind::Panel => {
            entities.push(shared(PanelEvent::new(device.clone())));
        }
        DeviceKind::Group | DeviceKind::Other => {
            debug!("No entities for device {} ({})", device.name, device.dev_type);
        }
    }
    entities
}

/// Every entity of a freshly set up entry
async fn entry_entities(launcher: &Arc<ScanLauncher>) -> Vec<SharedEntity> {
    let runtime = launcher.runtime();
    let gateway = &runtime.gateway;

    let mut entities: Vec<SharedEntity> = Vec::new();
    for device in runtime.devices.snapshot() {
        entities.extend(device_entities(&device, gateway));
    }
    entities.extend(
        runtime
            .groups
            .iter()
            .map(|group| shared(DaliLightGroup::new(group.clone(), gateway.clone()))),
    );
    entities.push(shared(AllLights::new(gateway.clone())));
    entities.push(shared(RestartButton::new(gateway.clone())));
    entities.push(shared(ScanButton::scan(launcher.clone())));
    entities.push(shared(ScanButton::stop(launcher.clone())));
    entities.extend(
        load_scenes(gateway, &runtime.scenes)
            .await
            .into_iter()
            .map(shared),
    );
    entities
}

/// Forward every payload of a broadcast channel to `f` until it closes
async fn pump<T, F, Fut>(mut rx: broadcast::Receiver<T>, what: &'static str, mut f: F)
where
    T: Clone,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        match rx.recv().await {
            Ok(payload) => f(payload).await,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("{} listener missed {} updates", what, n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// A set up entry
pub struct LoadedEntry {
    pub launcher: Arc<ScanLauncher>,
    pub entities: EntryEntities,
    tasks: Vec<JoinHandle<()>>,
}

impl LoadedEntry {
    pub fn runtime(&self) -> &Arc<GatewayRuntime> {
        self.launcher.runtime()
    }
}

/// Connect to the gateway, discover its bus and add every entity.
///
/// `setups` bounds how many entries connect and discover at once.
pub async fn setup_entry(
    entry_id: &str,
    gateway: Arc<dyn Gateway>,
    config: &Config,
    hub: Arc<Hub>,
    setups: &Semaphore,
    to_engine: FromIntegrationSender,
) -> Result<LoadedEntry, SetupError> {
    let gw_sn = gateway.serial_number().to_string();

    let (devices, groups, scenes) = {
        let _permit = setups.acquire().await;

        info!("[{}] Connecting to gateway {}", entry_id, gw_sn);
        match tokio::time::timeout(config.connect_timeout(), gateway.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(GatewayError::Timeout)) | Err(_) => {
                notify_user_error(
                    &*hub.notifications,
                    &gw_sn,
                    "Connection Timeout",
                    CONNECT_TIMEOUT_MESSAGE,
                );
                return Err(SetupError::ConnectTimeout(gw_sn));
            }
            Ok(Err(e)) => {
                notify_user_error(
                    &*hub.notifications,
                    &gw_sn,
                    "Connection Failed",
                    &e.to_string(),
                );
                return Err(SetupError::Connection { gw_sn, source: e });
            }
        }

        let discovered = tokio::try_join!(
            gateway.discover_devices(),
            gateway.discover_groups(),
            gateway.discover_scenes(),
        );
        match discovered {
            Ok(found) => found,
            Err(e) => {
                error!("[{}] Failed to discover entities: {}", entry_id, e);
                notify_user_error(
                    &*hub.notifications,
                    &gw_sn,
                    "Discovery Failed",
                    &e.to_string(),
                );
                if let Err(e) = gateway.disconnect().await {
                    warn!("[{}] Disconnect after failed discovery: {}", entry_id, e);
                }
                return Err(SetupError::Discovery { gw_sn, source: e });
            }
        }
    };
    info!(
        "[{}] Gateway {}: {} devices, {} groups, {} scenes",
        entry_id,
        gw_sn,
        devices.len(),
        groups.len(),
        scenes.len()
    );

    let gateway_rx = gateway.subscribe();
    hub.devices
        .get_or_create(entry_id, gateway_device_spec(&*gateway));

    let runtime = Arc::new(GatewayRuntime::new(
        entry_id,
        gateway.clone(),
        devices,
        groups,
        scenes,
    ));
    let launcher = Arc::new(ScanLauncher::new(
        runtime.clone(),
        hub.clone(),
        config.scan_timeout(),
    ));
    let entities = EntryEntities::new(entry_id, hub.clone(), gateway.clone(), to_engine);

    let scan_rx = hub.dispatcher.connect::<bool>(&signal_scan_state(entry_id))?;
    let add_rx = hub
        .dispatcher
        .connect::<Vec<Device>>(&signal_add_entities(entry_id))?;
    let remove_rx = hub
        .dispatcher
        .connect::<Vec<String>>(&signal_remove_entities(entry_id))?;

    let mut tasks = Vec::new();
    let table = entities.clone();
    tasks.push(tokio::spawn(async move {
        pump(gateway_rx, "gateway event", |event| {
            let table = table.clone();
            async move { table.handle_gateway_event(&event).await }
        })
        .await;
    }));

    let table = entities.clone();
    tasks.push(tokio::spawn(async move {
        pump(scan_rx, "scan state", |scanning| {
            let table = table.clone();
            async move { table.handle_scan_state(scanning).await }
        })
        .await;
    }));

    let table = entities.clone();
    let new_device_gateway = gateway.clone();
    tasks.push(tokio::spawn(async move {
        pump(add_rx, "add entities", |devices: Vec<Device>| {
            let table = table.clone();
            let gateway = new_device_gateway.clone();
            async move {
                let new: Vec<SharedEntity> = devices
                    .iter()
                    .flat_map(|device| device_entities(device, &gateway))
                    .collect();
                let added = table.add(new).await;
                debug!("Added {} entities for new devices", added.len());
            }
        })
        .await;
    }));

    let table = entities.clone();
    tasks.push(tokio::spawn(async move {
        pump(remove_rx, "remove entities", |entity_ids: Vec<String>| {
            let table = table.clone();
            async move { table.remove(&entity_ids).await }
        })
        .await;
    }));

    let added = entities.add(entry_entities(&launcher).await).await;
    info!("[{}] Gateway {} ready with {} entities", entry_id, gw_sn, added.len());

    Ok(LoadedEntry {
        launcher,
        entities,
        tasks,
    })
}

/// Stop the entry's background tasks, disconnect and drop its entities
pub async fn unload_entry(entry: LoadedEntry, hub: &Hub) {
    for task in &entry.tasks {
        task.abort();
    }

    entry.launcher.shutdown().await;

    let runtime = entry.runtime();
    if let Err(e) = runtime.gateway.disconnect().await {
        error!("[{}] Error disconnecting gateway: {}", runtime.entry_id, e);
        notify_user_error(
            &*hub.notifications,
            runtime.gw_sn(),
            "Disconnection Failed",
            &e.to_string(),
        );
    }

    let entity_ids = entry.entities.entity_ids().await;
    entry.entities.remove(&entity_ids).await;
    info!("[{}] Unloaded gateway {}", runtime.entry_id, runtime.gw_sn());
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::integrations::dali_center::gateway::DeviceProperty;
    use crate::integrations::dali_center::gateway::GatewayCommand;
    use crate::integrations::dali_center::gateway::MockGateway;
    use crate::integrations::dali_center::gateway::MockScan;
    use crate::integrations::dali_center::model::Group;
    use crate::integrations::dali_center::scan::ScanError;

    const GW_SN: &str = "6A242121110E";

    fn config() -> Config {
        toml::from_str("").unwrap()
    }

    fn light() -> Device {
        Device::new(GW_SN, "0102", 0, 1, "Desk")
    }

    fn drain(rx: &mut mpsc::Receiver<FromIntegrationMessage>) -> Vec<FromIntegrationMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn discovered(msgs: &[FromIntegrationMessage]) -> Vec<String> {
        msgs.iter()
            .filter_map(|m| match m {
                FromIntegrationMessage::EntityDiscovered { entity_id, .. } => {
                    Some(entity_id.clone())
                }
                _ => None,
            })
            .collect()
    }

    async fn setup(
        mock: Arc<MockGateway>,
    ) -> (
        Arc<Hub>,
        Result<LoadedEntry, SetupError>,
        mpsc::Receiver<FromIntegrationMessage>,
    ) {
        let hub = Arc::new(Hub::new());
        let (tx, rx) = mpsc::channel(512);
        let result = setup_entry(
            "entry1",
            mock,
            &config(),
            hub.clone(),
            &Semaphore::new(2),
            tx,
        )
        .await;
        (hub, result, rx)
    }

    /// Wait for the background tasks to catch up
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_setup_registers_gateway_and_entities() {
        let mock = Arc::new(MockGateway::new(GW_SN).with_devices(vec![light()]));
        mock.groups
            .lock()
            .unwrap()
            .push(Group::new(GW_SN, 1, 0, "Kitchen"));

        let (hub, result, mut rx) = setup(mock.clone()).await;
        let entry = result.unwrap();

        let gateway_device = hub.devices.get_device(DOMAIN, GW_SN).unwrap();
        assert_eq!(gateway_device.manufacturer.as_deref(), Some("Sunricher"));
        assert_eq!(gateway_device.model.as_deref(), Some("SR-GW-EDA"));
        assert_eq!(
            gateway_device.connections,
            vec![("mac".to_string(), "6a:24:21:21:11:0e".to_string())]
        );

        // light, energy, identify, 4 numbers, group, all lights, restart,
        // scan and stop
        let ids = discovered(&drain(&mut rx));
        assert_eq!(ids.len(), 12);
        assert_eq!(entry.entities.entity_ids().await.len(), 12);
        assert!(
            mock.sent().contains(&GatewayCommand::ReadStatus {
                dev_id: light().dev_id
            })
        );

        let light_device = hub.devices.get_device(DOMAIN, &light().dev_id).unwrap();
        assert_eq!(light_device.via_device_id, Some(gateway_device.id));
        assert_eq!(hub.entities.entries_for_device(&light_device.id).len(), 7);
    }

    #[tokio::test]
    async fn test_connection_failure_notifies_and_is_not_ready() {
        let mock = Arc::new(MockGateway::new(GW_SN));
        *mock.connect_error.lock().unwrap() =
            Some(GatewayError::Connection("refused".to_string()));

        let (hub, result, _rx) = setup(mock).await;

        assert!(matches!(result, Err(SetupError::Connection { .. })));
        let notifications = hub.notifications.all();
        assert_eq!(notifications.len(), 1);
        assert_eq!(
            notifications[0].title,
            format!("DALI Center ({}): Connection Failed", GW_SN)
        );
        assert_eq!(notifications[0].message, "connection failed: refused");
        assert!(
            notifications[0]
                .notification_id
                .starts_with(&format!("dali_center_{}_", GW_SN))
        );
    }

    #[tokio::test]
    async fn test_connection_timeout_notifies() {
        let mock = Arc::new(MockGateway::new(GW_SN));
        *mock.connect_error.lock().unwrap() = Some(GatewayError::Timeout);

        let (hub, result, _rx) = setup(mock).await;

        assert!(matches!(result, Err(SetupError::ConnectTimeout(_))));
        let notifications = hub.notifications.all();
        assert_eq!(
            notifications[0].title,
            format!("DALI Center ({}): Connection Timeout", GW_SN)
        );
        assert_eq!(notifications[0].message, CONNECT_TIMEOUT_MESSAGE);
    }

    #[tokio::test]
    async fn test_discovery_failure_disconnects() {
        let mock = Arc::new(MockGateway::new(GW_SN));
        *mock.discover_error.lock().unwrap() =
            Some(GatewayError::Discovery("bus busy".to_string()));

        let (hub, result, _rx) = setup(mock.clone()).await;

        assert!(matches!(result, Err(SetupError::Discovery { .. })));
        assert_eq!(mock.disconnect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            hub.notifications.all()[0].title,
            format!("DALI Center ({}): Discovery Failed", GW_SN)
        );
        assert!(hub.devices.get_device(DOMAIN, GW_SN).is_none());
    }

    #[test]
    fn test_same_error_reuses_notification() {
        let hub = Hub::new();
        notify_user_error(&*hub.notifications, GW_SN, "Connection Failed", "refused");
        notify_user_error(&*hub.notifications, GW_SN, "Connection Failed", "refused");
        notify_user_error(&*hub.notifications, GW_SN, "Connection Failed", "reset");
        assert_eq!(hub.notifications.all().len(), 2);
    }

    #[tokio::test]
    async fn test_push_events_update_entities() {
        let mock = Arc::new(MockGateway::new(GW_SN).with_devices(vec![light()]));
        let (_hub, result, mut rx) = setup(mock.clone()).await;
        let _entry = result.unwrap();
        drain(&mut rx);

        mock.emit(GatewayEvent::DeviceStatus {
            dev_id: light().dev_id,
            properties: vec![DeviceProperty {
                dpid: 20,
                key_no: None,
                value: serde_json::json!(true),
            }],
        });
        settle().await;

        let changed: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                FromIntegrationMessage::EntityStateChanged { entity_id, .. } => Some(entity_id),
                _ => None,
            })
            .collect();
        assert_eq!(changed, vec!["light.desk_light".to_string()]);
    }

    #[tokio::test]
    async fn test_scan_adds_and_removes_entities() {
        let desk = light();
        let hall = Device::new(GW_SN, "0201", 0, 2, "Hall");
        let mock = Arc::new(MockGateway::new(GW_SN).with_devices(vec![desk.clone()]));
        mock.push_scan(MockScan::Devices(vec![hall.clone()]));

        let (hub, result, mut rx) = setup(mock.clone()).await;
        let entry = result.unwrap();
        drain(&mut rx);

        let summary = entry.launcher.launch().unwrap().await.unwrap().unwrap();
        assert_eq!(summary.removed_entities.len(), 7);
        settle().await;

        let msgs = drain(&mut rx);
        assert_eq!(discovered(&msgs), vec!["sensor.hall_state".to_string()]);
        let removed = msgs
            .iter()
            .filter(|m| matches!(m, FromIntegrationMessage::EntityRemoved { .. }))
            .count();
        assert_eq!(removed, 7);
        assert!(hub.devices.get_device(DOMAIN, &desk.dev_id).is_none());
        let remaining = entry.entities.entity_ids().await;
        assert!(remaining.contains(&"sensor.hall_state".to_string()));
        assert!(!remaining.contains(&"light.desk_light".to_string()));
    }

    #[tokio::test]
    async fn test_unload_stops_running_scan_before_disconnect() {
        let mock = Arc::new(MockGateway::new(GW_SN).with_devices(vec![light()]));
        mock.push_scan(MockScan::UntilStopped);
        let (hub, result, mut rx) = setup(mock.clone()).await;
        let entry = result.unwrap();
        drain(&mut rx);
        let runtime = entry.runtime().clone();

        let scan = entry.launcher.launch().unwrap();
        while !mock.bus_scanning() {
            tokio::task::yield_now().await;
        }
        unload_entry(entry, &hub).await;

        assert!(matches!(
            scan.await.unwrap(),
            Err(ScanError::Gateway(GatewayError::Cancelled))
        ));
        assert_eq!(mock.stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.disconnect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.scan_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.devices.snapshot(), vec![light()]);
        assert!(hub.devices.get_device(DOMAIN, &light().dev_id).is_some());
    }

    #[tokio::test]
    async fn test_unload_reports_disconnect_failure() {
        let mock = Arc::new(MockGateway::new(GW_SN).with_devices(vec![light()]));
        let (hub, result, mut rx) = setup(mock.clone()).await;
        let entry = result.unwrap();
        drain(&mut rx);
        *mock.disconnect_error.lock().unwrap() = Some(GatewayError::NotConnected);

        unload_entry(entry, &hub).await;

        assert_eq!(
            hub.notifications.all()[0].title,
            format!("DALI Center ({}): Disconnection Failed", GW_SN)
        );
        let removed = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, FromIntegrationMessage::EntityRemoved { .. }))
            .count();
        assert_eq!(removed, 11);
    }
}
