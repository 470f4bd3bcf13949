use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Child {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

impl Child {
    /// Whole years between `date_of_birth` and `today`; zero for future dates,
    /// `None` when the date is missing or malformed.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth.as_deref()?;
        // Accept plain dates as well as full timestamps.
        let date_part = dob.get(..10).unwrap_or(dob);
        let birth = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;

        let mut age = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        Some(age.max(0) as u32)
    }

    pub fn with_age(mut self, today: NaiveDate) -> Self {
        self.age = self.age_on(today);
        self
    }

    pub fn is_profile_complete(&self) -> bool {
        let has_nickname = self
            .nickname
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty());
        let has_dob = self
            .date_of_birth
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty());
        has_nickname && has_dob
    }
}

/// Persisted copy of the last children list fetched from the backend.
#[derive(Debug, Clone, FromRow)]
pub struct CachedChildren {
    pub children: Json<Vec<Child>>,
    pub cached_at: DateTime<Utc>,
}

impl CachedChildren {
    pub async fn load(pool: &SqlitePool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CachedChildren>(
            "SELECT children, cached_at FROM children_cache WHERE id = 1",
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn store(pool: &SqlitePool, children: &[Child]) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO children_cache (id, children, cached_at)
               VALUES (1, $1, $2)
               ON CONFLICT(id) DO UPDATE SET
                   children = excluded.children,
                   cached_at = excluded.cached_at"#,
        )
        .bind(Json(children))
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn clear(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM children_cache")
            .execute(pool)
            .await?;
        Ok(())
    }
}
