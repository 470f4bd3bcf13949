//! Daily and weekly reminders to open ENACT, scheduled on the local clock.

use std::{sync::Arc, time::Duration};

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use db::{
    DBService,
    models::{
        notification::NotificationPayload,
        reminder_settings::{ReminderSettings, SpecificReminder},
    },
};
use serde::Serialize;
use strum_macros::Display;
use thiserror::Error;
use tokio::{
    sync::{Notify, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::notification::{NotificationChannel, NotificationDispatcher};

const GENERAL_REMINDER_ID: u32 = 1000;
const SPECIFIC_REMINDER_BASE_ID: u32 = 2000;
const GENERAL_REMINDER_HOUR: u32 = 12;

/// Current local wall-clock time.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("invalid reminder: {0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReminderKind {
    GeneralReminder,
    SpecificReminder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledReminder {
    pub notification_id: String,
    pub kind: ReminderKind,
    pub due: NaiveDateTime,
    pub title: String,
    pub body: String,
}

impl ScheduledReminder {
    fn general(due: NaiveDateTime) -> Self {
        Self {
            notification_id: GENERAL_REMINDER_ID.to_string(),
            kind: ReminderKind::GeneralReminder,
            due,
            title: "ENACT App Reminder".to_string(),
            body: "Don't forget to open ENACT today!".to_string(),
        }
    }

    fn specific(index: usize, reminder: &SpecificReminder, due: NaiveDateTime) -> Self {
        Self {
            notification_id: (SPECIFIC_REMINDER_BASE_ID + index as u32).to_string(),
            kind: ReminderKind::SpecificReminder,
            due,
            title: "Scheduled ENACT Reminder".to_string(),
            body: format!(
                "It's time to open ENACT as scheduled for {}!",
                reminder.day.name()
            ),
        }
    }

    fn payload(&self) -> NotificationPayload {
        NotificationPayload {
            notification_id: self.notification_id.clone(),
            location_type: self.kind.to_string(),
            location_id: None,
            location_name: "ENACT".to_string(),
            title: self.title.clone(),
            body: self.body.clone(),
        }
    }
}

/// First `time` strictly after `after`.
pub fn next_daily(after: NaiveDateTime, time: NaiveTime) -> NaiveDateTime {
    let today = after.date().and_time(time);
    if today > after {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// First `weekday` at `time` strictly after `after`. A time already passed
/// today moves to the same day next week.
pub fn next_weekly(after: NaiveDateTime, weekday: Weekday, time: NaiveTime) -> NaiveDateTime {
    let current = after.weekday().num_days_from_sunday();
    let target = weekday.num_days_from_sunday();
    let days_until = (target + 7 - current) % 7;
    let candidate = (after.date() + TimeDelta::days(days_until as i64)).and_time(time);
    if candidate > after {
        candidate
    } else {
        candidate + TimeDelta::days(7)
    }
}

/// Every enabled reminder's next occurrence after `after`, soonest first.
pub fn upcoming(settings: &ReminderSettings, after: NaiveDateTime) -> Vec<ScheduledReminder> {
    let mut scheduled = Vec::new();

    if settings.general_enabled {
        if let Some(noon) = NaiveTime::from_hms_opt(GENERAL_REMINDER_HOUR, 0, 0) {
            scheduled.push(ScheduledReminder::general(next_daily(after, noon)));
        }
    }

    for (index, reminder) in settings.specific_reminders.iter().enumerate() {
        if !reminder.enabled {
            continue;
        }
        let Some(time) = NaiveTime::from_hms_opt(reminder.hour, reminder.minute, 0) else {
            continue;
        };
        let due = next_weekly(after, reminder.day.weekday(), time);
        scheduled.push(ScheduledReminder::specific(index, reminder, due));
    }

    scheduled.sort_by_key(|r| r.due);
    scheduled
}

pub struct ReminderService {
    dispatcher: Arc<NotificationDispatcher>,
    store: Option<DBService>,
    channel: NotificationChannel,
    settings: RwLock<ReminderSettings>,
    changed: Notify,
    clock: Clock,
}

impl ReminderService {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, store: Option<DBService>) -> Self {
        Self {
            dispatcher,
            store,
            channel: NotificationChannel {
                description: "Reminders to open ENACT".to_string(),
                ..NotificationChannel::new("app-reminders", "App reminders")
            },
            settings: RwLock::new(ReminderSettings::default()),
            changed: Notify::new(),
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Load saved settings into memory.
    pub async fn restore(&self) -> Result<ReminderSettings, sqlx::Error> {
        let Some(db) = &self.store else {
            return Ok(self.settings().await);
        };
        let saved = ReminderSettings::load(&db.pool).await?;
        *self.settings.write().await = saved.clone();
        self.changed.notify_one();
        Ok(saved)
    }

    pub async fn settings(&self) -> ReminderSettings {
        self.settings.read().await.clone()
    }

    /// Validate, persist and re-arm. Returns the new schedule.
    pub async fn update(
        &self,
        settings: ReminderSettings,
    ) -> Result<Vec<ScheduledReminder>, ReminderError> {
        if let Some(bad) = settings
            .specific_reminders
            .iter()
            .find(|r| !r.is_valid_time())
        {
            return Err(ReminderError::Invalid(format!(
                "{} {:02}:{:02} is not a time of day",
                bad.day.name(),
                bad.hour,
                bad.minute
            )));
        }

        if let Some(db) = &self.store {
            settings.save(&db.pool).await?;
        }
        let schedule = upcoming(&settings, (self.clock)());
        *self.settings.write().await = settings;
        self.changed.notify_one();

        info!(scheduled = schedule.len(), "Reminder settings updated");
        Ok(schedule)
    }

    pub async fn upcoming(&self) -> Vec<ScheduledReminder> {
        upcoming(&*self.settings.read().await, (self.clock)())
    }

    /// Run the reminder timer until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut after = (self.clock)();

        loop {
            let schedule = upcoming(&*self.settings.read().await, after);
            let due_at = schedule.first().map(|r| r.due);
            let wait =
                due_at.map(|due| (due - (self.clock)()).to_std().unwrap_or(Duration::ZERO));
            if let Some(due) = due_at {
                debug!(%due, "Next reminder armed");
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.changed.notified() => {
                    after = after.max((self.clock)());
                }
                _ = sleep_for(wait) => {
                    let Some(due) = due_at else { continue };
                    for reminder in schedule.iter().filter(|r| r.due == due) {
                        self.fire(reminder).await;
                    }
                    after = due.max((self.clock)());
                }
            }
        }

        debug!("Reminder timer exited");
    }

    async fn fire(&self, reminder: &ScheduledReminder) {
        match self.dispatcher.show(&self.channel, &reminder.payload()).await {
            Ok(()) => info!(
                notification_id = %reminder.notification_id,
                kind = %reminder.kind,
                "Reminder displayed"
            ),
            Err(e) => warn!(
                notification_id = %reminder.notification_id,
                error = %e,
                "Failed to display reminder"
            ),
        }
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}
