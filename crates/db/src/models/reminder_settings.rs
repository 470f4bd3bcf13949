use chrono::{Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    pub fn weekday(self) -> Weekday {
        match self {
            DayOfWeek::Sunday => Weekday::Sun,
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DayOfWeek::Sunday => "Sunday",
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
        }
    }
}

/// A weekly reminder at a local wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificReminder {
    pub id: String,
    pub day: DayOfWeek,
    pub hour: u32,
    pub minute: u32,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl SpecificReminder {
    pub fn is_valid_time(&self) -> bool {
        self.hour < 24 && self.minute < 60
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderSettings {
    /// Daily reminder at noon.
    #[serde(default)]
    pub general_enabled: bool,
    #[serde(default)]
    pub specific_reminders: Vec<SpecificReminder>,
}

#[derive(FromRow)]
struct ReminderSettingsRow {
    general_enabled: bool,
    specific_reminders: Json<Vec<SpecificReminder>>,
}

impl ReminderSettings {
    /// Stored settings, or the defaults (everything off) when none were saved.
    pub async fn load(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, ReminderSettingsRow>(
            "SELECT general_enabled, specific_reminders FROM reminder_settings WHERE id = 1",
        )
        .fetch_optional(pool)
        .await?;

        Ok(row
            .map(|row| ReminderSettings {
                general_enabled: row.general_enabled,
                specific_reminders: row.specific_reminders.0,
            })
            .unwrap_or_default())
    }

    pub async fn save(&self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO reminder_settings (id, general_enabled, specific_reminders, updated_at)
               VALUES (1, $1, $2, $3)
               ON CONFLICT(id) DO UPDATE SET
                   general_enabled = excluded.general_enabled,
                   specific_reminders = excluded.specific_reminders,
                   updated_at = excluded.updated_at"#,
        )
        .bind(self.general_enabled)
        .bind(Json(&self.specific_reminders))
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }
}
