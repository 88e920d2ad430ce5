//! Bus scan reconciliation.
//!
//! A scan asks the gateway for every device on the bus and aligns the
//! entry's device list and the device registry with the answer.
//! [`reconcile`] does the work and reports a typed result; [`ScanNotifier`]
//! turns results into user notifications; [`ScanLauncher`] runs scans as
//! background tasks, one at a time per entry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::DOMAIN;
use super::gateway::GatewayError;
use super::model::Device;
use super::runtime::GatewayRuntime;
use super::signal_add_entities;
use super::signal_remove_entities;
use super::signal_scan_state;
use crate::engine::Hub;
use crate::engine::dispatcher::Dispatcher;
use crate::engine::notification::NotificationSink;

const SCAN_STARTED_MESSAGE: &str =
    "Scanning DALI bus. Light control may be temporarily unresponsive.";

/// What a successful scan changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSummary {
    pub added: Vec<Device>,
    pub removed: Vec<Device>,
    pub unchanged: usize,
    /// Entities dropped from the registry along with removed devices
    pub removed_entities: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("bus scan timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("bus scan failed: {0}")]
    Gateway(#[source] GatewayError),
}

/// Notification id shared by every notification of one gateway's scans
pub fn scan_notification_id(gw_sn: &str) -> String {
    format!("{}_scan_{}", DOMAIN, gw_sn)
}

/// Sends `false` on the scan-state signal when dropped.
struct ScanStateGuard<'a> {
    dispatcher: &'a Dispatcher,
    signal: String,
}

impl Drop for ScanStateGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.send(&self.signal, false);
    }
}

/// Scan the bus and apply the difference to the entry's device list and
/// to the device registry.
///
/// The scan-state signal reads `true` for exactly the duration of the
/// gateway call. Nothing is mutated unless the scan succeeds.
pub async fn reconcile(
    runtime: &GatewayRuntime,
    hub: &Hub,
    timeout: Duration,
) -> Result<ScanSummary, ScanError> {
    let gw_sn = runtime.gw_sn();
    let signal = signal_scan_state(&runtime.entry_id);

    hub.dispatcher.send(&signal, true);
    let scan_result = {
        let _scanning = ScanStateGuard {
            dispatcher: &hub.dispatcher,
            signal,
        };
        let channels = runtime.gateway.channel_total();
        match tokio::time::timeout(timeout, runtime.gateway.scan_bus(&channels)).await {
            Ok(Ok(devices)) => devices,
            Ok(Err(GatewayError::Timeout)) | Err(_) => return Err(ScanError::Timeout(timeout)),
            Ok(Err(e)) => return Err(ScanError::Gateway(e)),
        }
    };

    let diff = runtime.devices.apply_scan_diff(&scan_result);

    if !diff.added.is_empty() {
        info!(
            "Gateway {}: {} new device(s) discovered",
            gw_sn,
            diff.added.len()
        );
        hub.dispatcher
            .send(&signal_add_entities(&runtime.entry_id), diff.added.clone());
    }

    let mut removed_entities = Vec::new();
    for dev in &diff.removed {
        let Some(entry) = hub.devices.get_device(DOMAIN, &dev.dev_id) else {
            continue;
        };
        if let Some(entity_ids) = hub.remove_device(&entry.id) {
            info!(
                "Gateway {}: Removed device {} ({})",
                gw_sn, dev.name, dev.dev_id
            );
            removed_entities.extend(entity_ids);
        }
    }

    Ok(ScanSummary {
        added: diff.added,
        removed: diff.removed,
        unchanged: diff.unchanged,
        removed_entities,
    })
}

/// Reports scan progress and outcomes as persistent notifications
#[derive(Clone)]
pub struct ScanNotifier {
    sink: Arc<dyn NotificationSink>,
}

impl ScanNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub fn started(&self, gw_sn: &str) {
        self.sink.create(
            &scan_notification_id(gw_sn),
            &format!("DALI Center ({}): Bus Scan", gw_sn),
            SCAN_STARTED_MESSAGE,
        );
    }

    pub fn finished(&self, gw_sn: &str, result: &Result<ScanSummary, ScanError>) {
        let notification_id = scan_notification_id(gw_sn);
        match result {
            Ok(summary) => self.sink.create(
                &notification_id,
                &format!("DALI Center ({}): Bus Scan Complete", gw_sn),
                &format!(
                    "Scan complete: {} added, {} removed, {} unchanged.",
                    summary.added.len(),
                    summary.removed.len(),
                    summary.unchanged
                ),
            ),
            Err(ScanError::Timeout(timeout)) => self.sink.create(
                &notification_id,
                &format!("DALI Center ({}): Bus Scan Failed", gw_sn),
                &format!(
                    "Bus scan timed out after {} seconds. No changes were made.",
                    timeout.as_secs()
                ),
            ),
            Err(ScanError::Gateway(_)) => self.sink.dismiss(&notification_id),
        }
    }

    /// A stopped scan leaves no progress notification behind
    pub fn stopped(&self, gw_sn: &str) {
        self.sink.dismiss(&scan_notification_id(gw_sn));
    }
}

/// Run one full scan with notifications. Never panics or propagates past
/// the returned result.
pub async fn run_bus_scan(
    runtime: &GatewayRuntime,
    hub: &Hub,
    notifier: &ScanNotifier,
    timeout: Duration,
) -> Result<ScanSummary, ScanError> {
    let gw_sn = runtime.gw_sn();
    notifier.started(gw_sn);

    let result = reconcile(runtime, hub, timeout).await;
    match &result {
        Ok(summary) => info!(
            "Bus scan finished for gateway {}: {} added, {} removed, {} unchanged",
            gw_sn,
            summary.added.len(),
            summary.removed.len(),
            summary.unchanged
        ),
        Err(ScanError::Timeout(_)) => warn!("Bus scan timed out for gateway {}", gw_sn),
        Err(e) => error!("Bus scan failed for gateway {}: {}", gw_sn, e),
    }

    notifier.finished(gw_sn, &result);
    result
}

/// Ask the gateway to abandon a scan in progress.
///
/// Returns `false` without touching the gateway when no scan is running.
pub async fn stop_scan(
    runtime: &GatewayRuntime,
    notifier: &ScanNotifier,
) -> Result<bool, GatewayError> {
    if !runtime.gateway.bus_scanning() {
        return Ok(false);
    }

    info!("Stopping bus scan for gateway {}", runtime.gw_sn());
    runtime.gateway.stop_scan().await?;
    notifier.stopped(runtime.gw_sn());
    Ok(true)
}

/// Starts scans for one entry in the background
pub struct ScanLauncher {
    runtime: Arc<GatewayRuntime>,
    hub: Arc<Hub>,
    notifier: ScanNotifier,
    timeout: Duration,
    running: Arc<Mutex<()>>,
}

impl ScanLauncher {
    pub fn new(runtime: Arc<GatewayRuntime>, hub: Arc<Hub>, timeout: Duration) -> Self {
        let notifier = ScanNotifier::new(hub.notifications.clone());
        Self {
            runtime,
            hub,
            notifier,
            timeout,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn runtime(&self) -> &Arc<GatewayRuntime> {
        &self.runtime
    }

    pub fn is_scanning(&self) -> bool {
        self.runtime.gateway.bus_scanning()
    }

    /// Spawn a scan. Returns `None` if this entry is already scanning.
    pub fn launch(&self) -> Option<JoinHandle<Result<ScanSummary, ScanError>>> {
        let Ok(permit) = self.running.clone().try_lock_owned() else {
            warn!(
                "[{}] Bus scan already running for gateway {}, ignoring request",
                self.runtime.entry_id,
                self.runtime.gw_sn()
            );
            return None;
        };

        info!("Bus scan requested for gateway {}", self.runtime.gw_sn());
        let runtime = self.runtime.clone();
        let hub = self.hub.clone();
        let notifier = self.notifier.clone();
        let timeout = self.timeout;

        Some(tokio::spawn(async move {
            let _permit = permit;
            let result = run_bus_scan(&runtime, &hub, &notifier, timeout).await;
            if let Ok(summary) = &result {
                if !summary.removed_entities.is_empty() {
                    hub.dispatcher.send(
                        &signal_remove_entities(&runtime.entry_id),
                        summary.removed_entities.clone(),
                    );
                }
            }
            result
        }))
    }

    pub async fn stop(&self) -> Result<bool, GatewayError> {
        stop_scan(&self.runtime, &self.notifier).await
    }

    /// Stop a running scan and wait for its task to finish, so nothing
    /// touches the entry's devices afterwards
    pub async fn shutdown(&self) {
        if let Err(e) = self.stop().await {
            warn!(
                "[{}] Failed to stop bus scan for gateway {}: {}",
                self.runtime.entry_id,
                self.runtime.gw_sn(),
                e
            );
        }
        let _idle = self.running.lock().await;
    }
}
