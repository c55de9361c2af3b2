use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// Cross-entity audit feed (another Timeline Service source, §4.6):
/// project- and pipeline-level actions rather than task-scoped ones.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub summary: String,
    pub data: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub async fn find_by_entity(
        pool: &SqlitePool,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM activity_log WHERE entity_type = ? AND entity_id = ? ORDER BY created_at ASC",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM activity_log ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn record<'e, E>(
        executor: E,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        summary: &str,
        data: Option<&serde_json::Value>,
    ) -> Result<Uuid, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let id = Uuid::new_v4();
        let data_json = data.map(|d| d.to_string());
        sqlx::query(
            "INSERT INTO activity_log (id, action, entity_type, entity_id, summary, data, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(summary)
        .bind(data_json)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(id)
    }
}
