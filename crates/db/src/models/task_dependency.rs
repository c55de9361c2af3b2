use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TaskDependencyError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("a task cannot depend on itself")]
    SelfDependency,
}

/// A hard blocking dependency: `task_id` cannot start until
/// `depends_on_task_id` reaches its pipeline's final status.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: Uuid,
    pub depends_on_task_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskDependency {
    pub task_id: Uuid,
    pub depends_on_task_id: Uuid,
}

impl TaskDependency {
    /// What this task is waiting on.
    pub async fn find_by_task(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM task_dependencies WHERE task_id = ?")
            .bind(task_id)
            .fetch_all(pool)
            .await
    }

    /// Who is blocked waiting on this task.
    pub async fn find_by_prerequisite(
        pool: &SqlitePool,
        depends_on_task_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM task_dependencies WHERE depends_on_task_id = ?")
            .bind(depends_on_task_id)
            .fetch_all(pool)
            .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateTaskDependency,
    ) -> Result<Self, TaskDependencyError> {
        if data.task_id == data.depends_on_task_id {
            return Err(TaskDependencyError::SelfDependency);
        }
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO task_dependencies (task_id, depends_on_task_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(data.task_id)
        .bind(data.depends_on_task_id)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(Self { task_id: data.task_id, depends_on_task_id: data.depends_on_task_id, created_at: now })
    }

    pub async fn delete(
        pool: &SqlitePool,
        task_id: Uuid,
        depends_on_task_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM task_dependencies WHERE task_id = ? AND depends_on_task_id = ?",
        )
        .bind(task_id)
        .bind(depends_on_task_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Whether every prerequisite of `task_id` has reached a final status of
    /// its own pipeline. Used by the `dependencies_resolved` builtin guard.
    pub async fn all_resolved(pool: &SqlitePool, task_id: Uuid) -> Result<bool, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM task_dependencies td
               JOIN tasks t ON t.id = td.depends_on_task_id
               JOIN pipelines p ON p.id = t.pipeline_id
               WHERE td.task_id = ?
                 AND NOT EXISTS (
                     SELECT 1 FROM json_each(p.statuses) s
                     WHERE json_extract(s.value, '$.name') = t.status
                       AND json_extract(s.value, '$.isFinal') = 1
                 )"#,
        )
        .bind(task_id)
        .fetch_one(pool)
        .await?;

        Ok(row.0 == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_self_dependency() {
        let db = crate::DBService::new_in_memory().await.unwrap();
        let id = Uuid::new_v4();
        let err = TaskDependency::create(
            &db.pool,
            &CreateTaskDependency { task_id: id, depends_on_task_id: id },
        )
        .await;
        assert!(matches!(err, Err(TaskDependencyError::SelfDependency)));
    }
}
