use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AgentRunError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Agent run not found")]
    NotFound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
    Interrupted,
}

impl std::fmt::Display for AgentRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentRunStatus::Running => "running",
            AgentRunStatus::Completed => "completed",
            AgentRunStatus::Failed => "failed",
            AgentRunStatus::TimedOut => "timed_out",
            AgentRunStatus::Cancelled => "cancelled",
            AgentRunStatus::Interrupted => "interrupted",
        };
        write!(f, "{s}")
    }
}

impl AgentRunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AgentRunStatus::Running)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: Uuid,
    pub task_id: Uuid,
    pub agent_type: String,
    pub mode: String,
    pub status: String,
    pub output: Option<String>,
    pub outcome: Option<String>,
    pub payload: Option<String>,
    pub exit_code: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cost_input_tokens: Option<i64>,
    pub cost_output_tokens: Option<i64>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAgentRun {
    pub task_id: Uuid,
    pub agent_type: String,
    pub mode: String,
    pub prompt: Option<String>,
}

impl AgentRun {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM agent_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_task(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM agent_runs WHERE task_id = ? ORDER BY started_at ASC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_latest_for_task(
        pool: &SqlitePool,
        task_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM agent_runs WHERE task_id = ? ORDER BY started_at DESC LIMIT 1",
        )
        .bind(task_id)
        .fetch_optional(pool)
        .await
    }

    /// Any run still `running` for the task. Backs the `no_running_agent` guard.
    pub async fn find_running_for_task(
        pool: &SqlitePool,
        task_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM agent_runs WHERE task_id = ? AND status = 'running'",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    /// Every run left `running` at process start, regardless of task. Used
    /// on service startup to reconcile runs orphaned by an unclean shutdown.
    pub async fn find_all_running(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM agent_runs WHERE status = 'running'")
            .fetch_all(pool)
            .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateAgentRun) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO agent_runs (id, task_id, agent_type, mode, status, started_at, prompt)
             VALUES (?, ?, ?, ?, 'running', ?, ?)",
        )
        .bind(id)
        .bind(data.task_id)
        .bind(&data.agent_type)
        .bind(&data.mode)
        .bind(now)
        .bind(&data.prompt)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn complete(
        pool: &SqlitePool,
        id: Uuid,
        status: AgentRunStatus,
        output: Option<&str>,
        outcome: Option<&str>,
        exit_code: Option<i64>,
        cost_input_tokens: Option<i64>,
        cost_output_tokens: Option<i64>,
    ) -> Result<Self, AgentRunError> {
        sqlx::query(
            "UPDATE agent_runs SET status = ?, output = ?, outcome = ?, exit_code = ?,
                completed_at = ?, cost_input_tokens = ?, cost_output_tokens = ?
             WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(output)
        .bind(outcome)
        .bind(exit_code)
        .bind(Utc::now())
        .bind(cost_input_tokens)
        .bind(cost_output_tokens)
        .bind(id)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(AgentRunError::NotFound)
    }

    /// Marks every run still `running` as `interrupted` (not `failed` — an
    /// orphaned run reflects an unclean shutdown, not a run the agent itself
    /// reported failing). Called once at service startup.
    pub async fn interrupt_all_running(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE agent_runs SET status = 'interrupted', completed_at = ? WHERE status = 'running'",
        )
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn interrupt_all_running_marks_interrupted_not_failed() {
        let db = crate::DBService::new_in_memory().await.unwrap();
        // minimal task/pipeline/project chain isn't required since agent_runs
        // only foreign-keys to tasks logically in prod; exercised fully in
        // the engine crate's integration tests.
        let task_id = Uuid::new_v4();
        sqlx::query("PRAGMA foreign_keys = OFF").execute(&db.pool).await.unwrap();
        let run = AgentRun::create(
            &db.pool,
            &CreateAgentRun { task_id, agent_type: "scripted".into(), mode: "run".into(), prompt: None },
        )
        .await
        .unwrap();

        AgentRun::interrupt_all_running(&db.pool).await.unwrap();
        let reloaded = AgentRun::find_by_id(&db.pool, run.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, "interrupted");
    }
}
