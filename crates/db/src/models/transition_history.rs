use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use uuid::Uuid;

/// Per-guard pass/fail record, captured so a blocked transition attempt is
/// diagnosable after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardResult {
    pub guard: String,
    pub passed: bool,
    pub reason: Option<String>,
}

/// Append-only audit trail of every status transition a task has undergone.
/// Rows are never updated or deleted once written.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransitionHistory {
    pub id: Uuid,
    pub task_id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub trigger: String,
    pub actor: Option<String>,
    #[sqlx(json)]
    pub guard_results: Json<Vec<GuardResult>>,
    pub created_at: DateTime<Utc>,
}

impl TransitionHistory {
    pub async fn find_by_task(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM transition_history WHERE task_id = ? ORDER BY created_at ASC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    /// Inserted as part of the same transaction as the task's status update
    /// and its task_events row (§5's atomic-commit invariant), so this takes
    /// a generic executor rather than a pool.
    pub async fn record<'e, E>(
        executor: E,
        task_id: Uuid,
        from_status: &str,
        to_status: &str,
        trigger: &str,
        actor: Option<&str>,
        guard_results: &[GuardResult],
    ) -> Result<Uuid, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let id = Uuid::new_v4();
        let guard_results_json = serde_json::to_string(guard_results).unwrap_or_else(|_| "[]".into());
        sqlx::query(
            "INSERT INTO transition_history
                (id, task_id, from_status, to_status, trigger, actor, guard_results, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(task_id)
        .bind(from_status)
        .bind(to_status)
        .bind(trigger)
        .bind(actor)
        .bind(guard_results_json)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(id)
    }

    /// Counts the run of most-recent rows that are self-transitions
    /// (`from_status == to_status == status`), stopping at the first row
    /// that isn't. Used by the `max_retries` guard to count consecutive
    /// retry attempts on the current status, not lifetime agent-run count.
    pub async fn count_consecutive_self_transitions(pool: &SqlitePool, task_id: Uuid, status: &str) -> Result<i64, sqlx::Error> {
        let rows = sqlx::query_as::<_, Self>(
            "SELECT * FROM transition_history WHERE task_id = ? ORDER BY created_at DESC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await?;

        let mut count = 0;
        for row in &rows {
            if row.from_status == status && row.to_status == status {
                count += 1;
            } else {
                break;
            }
        }
        Ok(count)
    }
}
