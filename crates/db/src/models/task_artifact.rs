use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskArtifactType {
    Branch,
    Pr,
    Commit,
    Diff,
    Document,
}

impl std::fmt::Display for TaskArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskArtifactType::Branch => "branch",
            TaskArtifactType::Pr => "pr",
            TaskArtifactType::Commit => "commit",
            TaskArtifactType::Diff => "diff",
            TaskArtifactType::Document => "document",
        };
        write!(f, "{s}")
    }
}

/// A durable artifact produced in the course of working a task: the branch
/// created for it, its PR, individual commits, diffs, or free-form documents
/// an agent attached. Another Timeline Service source (§4.6).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskArtifact {
    pub id: Uuid,
    pub task_id: Uuid,
    #[sqlx(rename = "type")]
    pub artifact_type: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

impl TaskArtifact {
    pub async fn find_by_task(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM task_artifacts WHERE task_id = ? ORDER BY created_at ASC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn record<'e, E>(
        executor: E,
        task_id: Uuid,
        artifact_type: TaskArtifactType,
        data: &serde_json::Value,
    ) -> Result<Uuid, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO task_artifacts (id, task_id, type, data, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(task_id)
        .bind(artifact_type.to_string())
        .bind(data.to_string())
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(id)
    }
}
