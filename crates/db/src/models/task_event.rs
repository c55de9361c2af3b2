use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventCategory {
    System,
    StatusChange,
    Agent,
    Git,
    Github,
}

impl std::fmt::Display for TaskEventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskEventCategory::System => "system",
            TaskEventCategory::StatusChange => "status_change",
            TaskEventCategory::Agent => "agent",
            TaskEventCategory::Git => "git",
            TaskEventCategory::Github => "github",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for TaskEventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskEventSeverity::Debug => "debug",
            TaskEventSeverity::Info => "info",
            TaskEventSeverity::Warning => "warning",
            TaskEventSeverity::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One source feed of the Timeline Service (§4.6): task-scoped, chronological
/// events emitted by the engine, agent service and git/SCM layers.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: Uuid,
    pub task_id: Uuid,
    pub category: String,
    pub severity: String,
    pub message: String,
    pub data: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskEvent {
    pub async fn find_by_task(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM task_events WHERE task_id = ? ORDER BY created_at ASC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    /// Keyset page: events for `task_id` created strictly after `cursor`
    /// (when given), oldest-first, capped at `limit`.
    pub async fn find_page(
        pool: &SqlitePool,
        task_id: Uuid,
        cursor: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        match cursor {
            Some(after) => {
                sqlx::query_as::<_, Self>(
                    "SELECT * FROM task_events WHERE task_id = ? AND created_at > ?
                     ORDER BY created_at ASC LIMIT ?",
                )
                .bind(task_id)
                .bind(after)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Self>(
                    "SELECT * FROM task_events WHERE task_id = ? ORDER BY created_at ASC LIMIT ?",
                )
                .bind(task_id)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
        }
    }

    pub async fn record<'e, E>(
        executor: E,
        task_id: Uuid,
        category: TaskEventCategory,
        severity: TaskEventSeverity,
        message: &str,
        data: Option<&serde_json::Value>,
    ) -> Result<Uuid, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let id = Uuid::new_v4();
        let data_json = data.map(|d| d.to_string());
        sqlx::query(
            "INSERT INTO task_events (id, task_id, category, severity, message, data, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(task_id)
        .bind(category.to_string())
        .bind(severity.to_string())
        .bind(message)
        .bind(data_json)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(id)
    }
}
