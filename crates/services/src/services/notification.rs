//! Tip notifications: formatting match results and handing them to the OS.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Utc;
use db::models::{
    location_match::LocationMatch,
    notification::{NotificationPayload, RemoteMessage},
    tip::Tip,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification backend error: {0}")]
    Backend(String),
    #[error("notification task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Android-style importance, 4 = high.
    pub importance: u8,
    pub vibrate: bool,
}

impl NotificationChannel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: "Location-based parenting tips".to_string(),
            importance: 4,
            vibrate: true,
        }
    }
}

/// The OS notification service.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Create `channel`; returns false when it already existed.
    async fn create_channel(&self, channel: &NotificationChannel) -> Result<bool, NotifyError>;

    async fn display(
        &self,
        channel_id: &str,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError>;
}

/// Turns location matches and push messages into displayed notifications.
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    channel: NotificationChannel,
    ensured: Mutex<HashSet<String>>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, channel: NotificationChannel) -> Self {
        Self {
            notifier,
            channel,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    /// Concatenate tips into one notification body, skipping blank ones.
    pub fn format_body(tips: &[Tip]) -> String {
        tips.iter()
            .filter(|tip| !tip.is_blank())
            .map(|tip| {
                let title = tip.title.trim();
                let description = tip.description.trim();
                match (title.is_empty(), description.is_empty()) {
                    (false, false) => format!("{title}: {description}"),
                    (false, true) => title.to_string(),
                    _ => description.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Payload for a match, or `None` when there is nothing to say.
    pub fn build_payload(location_match: &LocationMatch, tips: &[Tip]) -> Option<NotificationPayload> {
        let body = Self::format_body(tips);
        if body.trim().is_empty() {
            return None;
        }

        Some(NotificationPayload {
            notification_id: location_match
                .notification_id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(timestamp_id),
            location_type: location_match.location_type.clone(),
            location_id: location_match.location_id.clone(),
            location_name: location_match.location_name.clone(),
            title: format!("You're near {}", location_match.location_name),
            body,
        })
    }

    /// Show a notification for `location_match`. Returns the displayed payload,
    /// or `None` when the tips produced no text.
    pub async fn dispatch(
        &self,
        location_match: &LocationMatch,
        tips: &[Tip],
    ) -> Result<Option<NotificationPayload>, NotifyError> {
        let Some(payload) = Self::build_payload(location_match, tips) else {
            debug!(
                location_type = %location_match.location_type,
                tip_count = tips.len(),
                "No tip text for match, not notifying"
            );
            return Ok(None);
        };

        self.ensure_channel(&self.channel).await?;
        self.notifier.display(&self.channel.id, &payload).await?;

        info!(
            notification_id = %payload.notification_id,
            location_type = %payload.location_type,
            location_name = %payload.location_name,
            "Tip notification displayed"
        );
        Ok(Some(payload))
    }

    /// Re-display a message received from the push-messaging service as a
    /// local notification. The context type is the text before the first `:`
    /// of the body.
    pub async fn relay_remote_message(
        &self,
        message: RemoteMessage,
    ) -> Result<NotificationPayload, NotifyError> {
        let title = non_blank(message.title).unwrap_or_else(|| "New Notification".to_string());
        let body =
            non_blank(message.message).unwrap_or_else(|| "You have a new notification".to_string());
        let id = non_blank(message.id).unwrap_or_else(timestamp_id);
        let location_type = message_type(&body);

        let payload = NotificationPayload {
            notification_id: id.clone(),
            location_name: location_type.clone(),
            location_type,
            location_id: None,
            title,
            body,
        };

        let channel = NotificationChannel {
            description: "Notification for remote message".to_string(),
            ..NotificationChannel::new(id.clone(), "Remote Message")
        };
        self.show(&channel, &payload).await?;

        info!(
            notification_id = %payload.notification_id,
            location_type = %payload.location_type,
            "Remote message relayed"
        );
        Ok(payload)
    }

    /// Display `payload` on `channel`, creating the channel on first use.
    pub async fn show(
        &self,
        channel: &NotificationChannel,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        self.ensure_channel(channel).await?;
        self.notifier.display(&channel.id, payload).await
    }

    async fn ensure_channel(&self, channel: &NotificationChannel) -> Result<(), NotifyError> {
        if self.is_ensured(&channel.id) {
            return Ok(());
        }
        let created = self.notifier.create_channel(channel).await?;
        debug!(channel_id = %channel.id, created, "Notification channel ensured");
        if let Ok(mut ensured) = self.ensured.lock() {
            ensured.insert(channel.id.clone());
        }
        Ok(())
    }

    fn is_ensured(&self, channel_id: &str) -> bool {
        self.ensured
            .lock()
            .map(|ensured| ensured.contains(channel_id))
            .unwrap_or(false)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn timestamp_id() -> String {
    Utc::now().timestamp_millis().to_string()
}

fn message_type(body: &str) -> String {
    body.split_once(':')
        .map(|(prefix, _)| prefix.trim())
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or("notification")
        .to_string()
}

/// Desktop notifications through the platform notification server.
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn create_channel(&self, channel: &NotificationChannel) -> Result<bool, NotifyError> {
        // Desktop notification servers have no channel concept.
        debug!(channel_id = %channel.id, "Desktop notifier: channel is implicit");
        Ok(true)
    }

    async fn display(
        &self,
        channel_id: &str,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        let app_name = self.app_name.clone();
        let title = payload.title.clone();
        let body = payload.body.clone();
        debug!(channel_id, data = ?payload.data(), "Showing desktop notification");

        tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .appname(&app_name)
                .summary(&title)
                .body(&body)
                .show()
                .map(|_| ())
                .map_err(|e| NotifyError::Backend(e.to_string()))
        })
        .await?
    }
}

/// Notifier that only writes to the log; for headless hosts.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn create_channel(&self, channel: &NotificationChannel) -> Result<bool, NotifyError> {
        debug!(channel_id = %channel.id, name = %channel.name, "Log notifier: channel");
        Ok(true)
    }

    async fn display(
        &self,
        channel_id: &str,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        info!(
            channel_id,
            title = %payload.title,
            body = %payload.body,
            data = ?payload.data(),
            "Notification"
        );
        Ok(())
    }
}
