use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Everything the OS notification layer needs to show a tip notification and
/// route a tap back to the right tips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub notification_id: String,
    pub location_type: String,
    pub location_id: Option<String>,
    pub location_name: String,
    pub title: String,
    pub body: String,
}

impl NotificationPayload {
    /// Structured `data` fields attached to the notification.
    pub fn data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert("notificationId".to_string(), self.notification_id.clone());
        data.insert("locationType".to_string(), self.location_type.clone());
        data.insert("locationName".to_string(), self.location_name.clone());
        if let Some(location_id) = &self.location_id {
            data.insert("locationId".to_string(), location_id.clone());
        }
        data
    }
}

/// A message delivered by the push-messaging service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
