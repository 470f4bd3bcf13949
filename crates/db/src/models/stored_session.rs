use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};

/// The signed-in user's credentials, kept across restarts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub profile: Option<Json<serde_json::Value>>,
    pub updated_at: DateTime<Utc>,
}

impl StoredSession {
    pub async fn find(pool: &SqlitePool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, StoredSession>(
            "SELECT access_token, profile, updated_at FROM stored_session WHERE id = 1",
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn save(
        pool: &SqlitePool,
        access_token: &str,
        profile: Option<&serde_json::Value>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, StoredSession>(
            r#"INSERT INTO stored_session (id, access_token, profile, updated_at)
               VALUES (1, $1, $2, $3)
               ON CONFLICT(id) DO UPDATE SET
                   access_token = excluded.access_token,
                   profile = excluded.profile,
                   updated_at = excluded.updated_at
               RETURNING access_token, profile, updated_at"#,
        )
        .bind(access_token)
        .bind(profile.map(Json))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn clear(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM stored_session")
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn test_save_replaces_previous_session() {
        let db = DBService::new_in_memory().await.unwrap();
        assert!(StoredSession::find(&db.pool).await.unwrap().is_none());

        StoredSession::save(&db.pool, "first", None).await.unwrap();
        let profile = serde_json::json!({"name": "Sam"});
        StoredSession::save(&db.pool, "second", Some(&profile))
            .await
            .unwrap();

        let stored = StoredSession::find(&db.pool).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "second");
        assert_eq!(stored.profile.unwrap().0, profile);

        StoredSession::clear(&db.pool).await.unwrap();
        assert!(StoredSession::find(&db.pool).await.unwrap().is_none());
    }
}
