use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use utils::geo::Position;

/// Last position reported to the backend, used to diff the first fix after a restart.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LastKnownPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}

impl LastKnownPosition {
    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }

    pub async fn find(pool: &SqlitePool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LastKnownPosition>(
            "SELECT latitude, longitude, recorded_at FROM last_known_position WHERE id = 1",
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn upsert(pool: &SqlitePool, position: &Position) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, LastKnownPosition>(
            r#"INSERT INTO last_known_position (id, latitude, longitude, recorded_at)
               VALUES (1, $1, $2, $3)
               ON CONFLICT(id) DO UPDATE SET
                   latitude = excluded.latitude,
                   longitude = excluded.longitude,
                   recorded_at = excluded.recorded_at
               RETURNING latitude, longitude, recorded_at"#,
        )
        .bind(position.latitude)
        .bind(position.longitude)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn test_upsert_keeps_single_row() {
        let db = DBService::new_in_memory().await.unwrap();

        LastKnownPosition::upsert(&db.pool, &Position::new(1.0, 2.0))
            .await
            .unwrap();
        LastKnownPosition::upsert(&db.pool, &Position::new(3.0, 4.0))
            .await
            .unwrap();

        let last = LastKnownPosition::find(&db.pool).await.unwrap().unwrap();
        assert_eq!(last.position(), Position::new(3.0, 4.0));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM last_known_position")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
