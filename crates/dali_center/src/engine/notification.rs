//! Persistent user notifications.
//!
//! Notifications are keyed by id: creating an id that already exists
//! replaces it, and dismissing an unknown id does nothing.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;
use tracing::info;

/// Where integrations send user-facing messages
pub trait NotificationSink: Send + Sync {
    fn create(&self, notification_id: &str, title: &str, message: &str);

    fn dismiss(&self, notification_id: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub notification_id: String,
    pub title: String,
    pub message: String,
}

/// In-memory notification store shown by the API
#[derive(Debug, Default)]
pub struct PersistentNotifications {
    notifications: Mutex<BTreeMap<String, Notification>>,
}

impl PersistentNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, notification_id: &str) -> Option<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(notification_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

impl NotificationSink for PersistentNotifications {
    fn create(&self, notification_id: &str, title: &str, message: &str) {
        let notification = Notification {
            notification_id: notification_id.to_string(),
            title: title.to_string(),
            message: message.to_string(),
        };

        let previous = self
            .notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(notification_id.to_string(), notification);

        if previous.is_some() {
            debug!("Updated notification: {}", notification_id);
        } else {
            info!("Created notification: {}", notification_id);
        }
    }

    fn dismiss(&self, notification_id: &str) {
        let removed = self
            .notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(notification_id);

        match removed {
            Some(_) => info!("Dismissed notification: {}", notification_id),
            None => debug!("No notification to dismiss: {}", notification_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_replaces_same_id() {
        let store = PersistentNotifications::new();
        store.create("dali_center_scan_gw1", "Bus Scan", "Scanning");
        store.create("dali_center_scan_gw1", "Bus Scan Complete", "Done");

        let all = store.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Bus Scan Complete");
        assert_eq!(all[0].message, "Done");
    }

    #[test]
    fn test_dismiss_is_idempotent() {
        let store = PersistentNotifications::new();
        store.create("a", "t", "m");
        store.dismiss("a");
        store.dismiss("a");
        assert!(store.get("a").is_none());
        assert!(store.all().is_empty());
    }
}
