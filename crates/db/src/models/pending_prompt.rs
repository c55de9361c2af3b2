use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PendingPromptError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Pending prompt not found")]
    NotFound,
    #[error("Prompt is not pending (already {0})")]
    NotPending(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PendingPromptStatus {
    Pending,
    Answered,
    Expired,
}

impl std::fmt::Display for PendingPromptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PendingPromptStatus::Pending => "pending",
            PendingPromptStatus::Answered => "answered",
            PendingPromptStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// A question an agent raised mid-run that blocks it until a human answers
/// (§4.2's prompt/response cycle, created by the `create_prompt` builtin hook).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PendingPrompt {
    pub id: Uuid,
    pub task_id: Uuid,
    pub agent_run_id: Uuid,
    pub prompt_type: String,
    pub payload: String,
    pub response: Option<String>,
    pub status: String,
    pub resume_outcome: Option<String>,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePendingPrompt {
    pub task_id: Uuid,
    pub agent_run_id: Uuid,
    pub prompt_type: String,
    pub payload: serde_json::Value,
    pub resume_outcome: Option<String>,
}

impl PendingPrompt {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM pending_prompts WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_task(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM pending_prompts WHERE task_id = ? ORDER BY created_at ASC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_pending_for_task(
        pool: &SqlitePool,
        task_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM pending_prompts WHERE task_id = ? AND status = 'pending' ORDER BY created_at ASC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_all_pending(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM pending_prompts WHERE status = 'pending'")
            .fetch_all(pool)
            .await
    }

    /// `resumeOutcome`, if the hook that raised the prompt declared one, is
    /// carried from creation (§4.5) — the responder's answer just triggers
    /// the auto-transition already pinned to the prompt, it never chooses it.
    pub async fn create(
        pool: &SqlitePool,
        data: &CreatePendingPrompt,
    ) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO pending_prompts (id, task_id, agent_run_id, prompt_type, payload, status, resume_outcome, created_at)
             VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(id)
        .bind(data.task_id)
        .bind(data.agent_run_id)
        .bind(&data.prompt_type)
        .bind(data.payload.to_string())
        .bind(&data.resume_outcome)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Records the human's answer. Fails if the prompt was already answered
    /// or has expired. `resume_outcome` is untouched — it was fixed at
    /// creation time.
    pub async fn respond(
        pool: &SqlitePool,
        id: Uuid,
        response: &serde_json::Value,
    ) -> Result<Self, PendingPromptError> {
        let existing = Self::find_by_id(pool, id).await?.ok_or(PendingPromptError::NotFound)?;
        if existing.status != "pending" {
            return Err(PendingPromptError::NotPending(existing.status));
        }

        sqlx::query(
            "UPDATE pending_prompts SET response = ?, status = 'answered', answered_at = ?
             WHERE id = ?",
        )
        .bind(response.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(PendingPromptError::NotFound)
    }

    pub async fn expire(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pending_prompts SET status = 'expired' WHERE id = ? AND status = 'pending'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn respond_rejects_already_answered_prompt() {
        let db = crate::DBService::new_in_memory().await.unwrap();
        sqlx::query("PRAGMA foreign_keys = OFF").execute(&db.pool).await.unwrap();

        let prompt = PendingPrompt::create(
            &db.pool,
            &CreatePendingPrompt {
                task_id: Uuid::new_v4(),
                agent_run_id: Uuid::new_v4(),
                prompt_type: "confirm_merge".into(),
                payload: serde_json::json!({"question": "merge now?"}),
                resume_outcome: Some("confirmed".into()),
            },
        )
        .await
        .unwrap();

        PendingPrompt::respond(&db.pool, prompt.id, &serde_json::json!({"answer": "yes"}))
            .await
            .unwrap();

        let second = PendingPrompt::respond(&db.pool, prompt.id, &serde_json::json!({"answer": "no"})).await;
        assert!(matches!(second, Err(PendingPromptError::NotPending(_))));
    }
}
