mod button;
mod config;
// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod dali_center;
mod entity;
mod event;
mod gateway;
mod light;
mod model;
mod number;
mod runtime;
mod scan;
mod scene;
mod sensor;
mod services;
mod setup;
#[cfg(feature = "backend_simulated")]
mod simulated;
mod switch;
pub mod trigger;

pub use config::Config as DaliCenterConfig;
pub use dali_center::DaliCenterIntegration;
use linkme::distributed_slice;

use crate::engine;

pub const DOMAIN: &str = "dali_center";
pub const MANUFACTURER: &str = "Sunricher";
pub const GATEWAY_MODEL: &str = "SR-GW-EDA";

/// Event type fired for every panel button action
pub const EVENT_TYPE: &str = "dali_center_event";

/// Scan-state signal for an entry; carries `bool`
pub fn signal_scan_state(entry_id: &str) -> String {
    format!("{}_scan_state_{}", DOMAIN, entry_id)
}

/// Newly scanned devices for an entry; carries `Vec<Device>`
pub fn signal_add_entities(entry_id: &str) -> String {
    format!("{}_add_entities_{}", DOMAIN, entry_id)
}

/// Entities dropped by a scan; carries `Vec<String>` of entity ids
pub fn signal_remove_entities(entry_id: &str) -> String {
    format!("{}_remove_entities_{}", DOMAIN, entry_id)
}

/// MAC address derived from the last 12 hex digits of a gateway serial
pub fn sn_to_mac(gw_sn: &str) -> String {
    let hex: String = gw_sn
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let padded = format!("{:0>12}", hex);
    let chars: Vec<char> = padded[padded.len() - 12..].chars().collect();
    chars
        .chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
}

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_dali_center(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let config = if let Some(c) = &ctx.config.dali_center {
        c
    } else {
        return Ok(None);
    };

    Ok(Some(Box::new(DaliCenterIntegration::new(
        config.clone(),
        ctx.hub.clone(),
    ))))
}
