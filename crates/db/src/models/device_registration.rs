use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A push-messaging device token already registered with the backend.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub device_token: String,
    pub response: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl DeviceRegistration {
    pub async fn find(pool: &SqlitePool, device_token: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DeviceRegistration>(
            r#"SELECT device_token, response, registered_at
               FROM device_registrations
               WHERE device_token = $1"#,
        )
        .bind(device_token)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        device_token: &str,
        response: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, DeviceRegistration>(
            r#"INSERT INTO device_registrations (device_token, response, registered_at)
               VALUES ($1, $2, $3)
               ON CONFLICT(device_token) DO UPDATE SET
                   response = excluded.response,
                   registered_at = excluded.registered_at
               RETURNING device_token, response, registered_at"#,
        )
        .bind(device_token)
        .bind(response)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn clear_all(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM device_registrations")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
