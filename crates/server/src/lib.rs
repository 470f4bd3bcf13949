pub mod error;
pub mod routes;

use std::sync::Arc;

use anyhow::Context;
use db::DBService;
use services::services::{
    children_info::ChildrenInfoService,
    config::{Config, NotifierKind},
    enact_api::{EnactApiClient, TipsBackend},
    location::LocationFeed,
    location_poller::LocationPoller,
    notification::{DesktopNotifier, LogNotifier, NotificationChannel, NotificationDispatcher, Notifier},
    push_registration::PushRegistrationService,
    reminders::ReminderService,
    session::SessionManager,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything the control routes share.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    client: EnactApiClient,
    feed: LocationFeed,
    dispatcher: Arc<NotificationDispatcher>,
    session: SessionManager,
    children: ChildrenInfoService,
    push: PushRegistrationService,
    reminders: Arc<ReminderService>,
    background: CancellationToken,
}

impl AppState {
    /// Wire the client, location feed, poller, dispatcher, session manager
    /// and reminder timer from `config`.
    pub async fn build(config: Config, db: DBService) -> anyhow::Result<Self> {
        let client = EnactApiClient::new(config.base_url()?, config.request_timeout())
            .context("failed to build backend client")?;
        let backend: Arc<dyn TipsBackend> = Arc::new(client.clone());

        let notifier: Arc<dyn Notifier> = match config.notifications.notifier {
            NotifierKind::Desktop => {
                Arc::new(DesktopNotifier::new(config.notifications.app_name.clone()))
            }
            NotifierKind::Log => Arc::new(LogNotifier),
        };
        let channel = NotificationChannel::new(
            config.notifications.channel_id.clone(),
            config.notifications.channel_name.clone(),
        );
        let dispatcher = Arc::new(NotificationDispatcher::new(notifier, channel));

        let feed = LocationFeed::new();
        let mut poller = LocationPoller::new(
            Arc::new(feed.clone()),
            backend.clone(),
            dispatcher.clone(),
            config.poller_config(),
        )
        .with_store(db.clone());
        if let Some(position) = poller
            .restore_last_position()
            .await
            .context("failed to restore last reported position")?
        {
            info!(
                latitude = position.latitude,
                longitude = position.longitude,
                "Restored last reported position"
            );
        }

        let session = SessionManager::new(backend, poller, Some(db.clone()));
        let children = ChildrenInfoService::new(client.clone(), Some(db.clone()));
        let push = PushRegistrationService::new(client.clone(), db.clone());

        let reminders = Arc::new(ReminderService::new(dispatcher.clone(), Some(db)));
        reminders
            .restore()
            .await
            .context("failed to restore reminder settings")?;
        let background = CancellationToken::new();
        reminders.clone().spawn(background.child_token());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                client,
                feed,
                dispatcher,
                session,
                children,
                push,
                reminders,
                background,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn client(&self) -> &EnactApiClient {
        &self.inner.client
    }

    pub fn feed(&self) -> &LocationFeed {
        &self.inner.feed
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.inner.dispatcher
    }

    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    pub fn children(&self) -> &ChildrenInfoService {
        &self.inner.children
    }

    pub fn push(&self) -> &PushRegistrationService {
        &self.inner.push
    }

    pub fn reminders(&self) -> &ReminderService {
        &self.inner.reminders
    }

    /// Stop the reminder timer and tear down the session.
    pub async fn shutdown(&self) {
        self.inner.background.cancel();
        self.inner.session.shutdown().await;
    }
}
