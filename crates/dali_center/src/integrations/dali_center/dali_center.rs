use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::DOMAIN;
use super::config::Config;
use super::gateway::Gateway;
use super::gateway::build_gateway;
use super::scan::ScanLauncher;
use super::services::call_service;
use super::setup::LoadedEntry;
use super::setup::setup_entry;
use super::setup::unload_entry;
use crate::engine::FromIntegrationSender;
use crate::engine::Hub;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

/// Loaded entries keyed by entry id
type EntriesMap = Arc<Mutex<BTreeMap<String, LoadedEntry>>>;

/// DALI Center integration
///
/// Every configured gateway is one entry. Entries are set up in the
/// background and retried until their gateway is reachable.
pub struct DaliCenterIntegration {
    config: Config,
    hub: Arc<Hub>,
    setups: Arc<Semaphore>,
    entries: EntriesMap,
    setup_tasks: Vec<JoinHandle<()>>,
    service_tasks: Vec<JoinHandle<()>>,
}

impl DaliCenterIntegration {
    pub fn new(config: Config, hub: Arc<Hub>) -> Self {
        Self {
            setups: Arc::new(Semaphore::new(config.max_concurrent_setups.max(1))),
            config,
            hub,
            entries: Arc::new(Mutex::new(BTreeMap::new())),
            setup_tasks: Vec::new(),
            service_tasks: Vec::new(),
        }
    }

    /// Set up one entry in the background, retrying while it is not ready
    fn start_entry(&mut self, entry_id: String, gateway: Arc<dyn Gateway>, tx: FromIntegrationSender) {
        let config = self.config.clone();
        let hub = self.hub.clone();
        let setups = self.setups.clone();
        let entries = self.entries.clone();

        self.setup_tasks.push(tokio::spawn(async move {
            loop {
                match setup_entry(&entry_id, gateway.clone(), &config, hub.clone(), &setups, tx.clone())
                    .await
                {
                    Ok(loaded) => {
                        entries.lock().await.insert(entry_id, loaded);
                        return;
                    }
                    Err(e) => {
                        warn!(
                            "[{}] Gateway not ready, retrying in {}s: {}",
                            entry_id,
                            config.retry_interval().as_secs(),
                            e
                        );
                        tokio::time::sleep(config.retry_interval()).await;
                    }
                }
            }
        }));
    }

    async fn launchers(&self) -> BTreeMap<String, Arc<ScanLauncher>> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), entry.launcher.clone()))
            .collect()
    }
}

#[async_trait]
impl Integration for DaliCenterIntegration {
    fn name(&self) -> &str {
        DOMAIN
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        let configured: Vec<_> = self
            .config
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), build_gateway(entry)))
            .collect();
        for (entry_id, gateway) in configured {
            match gateway {
                Ok(gateway) => {
                    info!("[{}] Setting up gateway {}", entry_id, gateway.serial_number());
                    self.start_entry(entry_id, gateway, tx.clone());
                }
                Err(e) => error!("[{}] Cannot create gateway client: {}", entry_id, e),
            }
        }
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::EntityCommand { entity_id, command } => {
                let tables: Vec<_> = self
                    .entries
                    .lock()
                    .await
                    .values()
                    .map(|entry| entry.entities.clone())
                    .collect();
                for table in tables {
                    match table.command(&entity_id, &command).await {
                        Ok(true) => return Ok(()),
                        Ok(false) => {}
                        Err(e) => return Err(Box::new(e) as Box<dyn Error + Send>),
                    }
                }
                warn!("No DALI Center entity {}", entity_id);
            }
            ToIntegrationMessage::CallService { service, data } => {
                let launchers = self.launchers().await;
                let task = call_service(&service, &data, &self.hub, &launchers)
                    .await
                    .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;
                self.service_tasks.retain(|t| !t.is_finished());
                self.service_tasks.extend(task);
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("DALI Center integration shutting down");
        for task in self.setup_tasks.drain(..).chain(self.service_tasks.drain(..)) {
            task.abort();
        }

        let entries = std::mem::take(&mut *self.entries.lock().await);
        for (_, entry) in entries {
            unload_entry(entry, &self.hub).await;
        }
        Ok(())
    }
}
