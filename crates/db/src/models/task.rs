use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use thiserror::Error;
use uuid::Uuid;

use crate::serde_helpers::deserialize_optional_nullable;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Task not found")]
    NotFound,
    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskPhase {
    pub name: String,
    pub status: String,
    pub agent_run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub pipeline_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: TaskPriority,
    #[sqlx(json)]
    pub tags: Json<Vec<String>>,
    pub parent_task_id: Option<Uuid>,
    pub assignee: Option<String>,
    pub pr_link: Option<String>,
    pub branch_name: Option<String>,
    #[sqlx(json)]
    pub phases: Json<Vec<TaskPhase>>,
    #[sqlx(json)]
    pub metadata: Json<serde_json::Map<String, serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub project_id: Uuid,
    pub pipeline_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub tags: Vec<String>,
    pub parent_task_id: Option<Uuid>,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub description: Option<Option<String>>,
    pub priority: Option<TaskPriority>,
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub assignee: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub pr_link: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub branch_name: Option<Option<String>>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Task {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_project(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM tasks WHERE project_id = ? ORDER BY created_at DESC")
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_status(pool: &SqlitePool, project_id: Uuid, status: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM tasks WHERE project_id = ? AND status = ? ORDER BY created_at DESC",
        )
        .bind(project_id)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    pub async fn find_children(pool: &SqlitePool, parent_task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM tasks WHERE parent_task_id = ? ORDER BY created_at ASC")
            .bind(parent_task_id)
            .fetch_all(pool)
            .await
    }

    /// Inserts a task in the pipeline's initial status, per §3's rule that
    /// new tasks start in the first status declared by their pipeline.
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateTask,
        initial_status: &str,
    ) -> Result<Self, TaskError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let tags_json =
            serde_json::to_string(&data.tags).map_err(|e| TaskError::Validation(e.to_string()))?;

        sqlx::query(
            "INSERT INTO tasks (id, project_id, pipeline_id, title, description, status, priority,
                tags, parent_task_id, assignee, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(data.project_id)
        .bind(data.pipeline_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(initial_status)
        .bind(serde_json::to_string(&data.priority).unwrap())
        .bind(tags_json)
        .bind(data.parent_task_id)
        .bind(&data.assignee)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(TaskError::NotFound)
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, payload: &UpdateTask) -> Result<Self, TaskError> {
        let existing = Self::find_by_id(pool, id).await?.ok_or(TaskError::NotFound)?;

        let title = payload.title.clone().unwrap_or(existing.title);
        let description = payload
            .description
            .clone()
            .unwrap_or(existing.description);
        let priority = payload.priority.unwrap_or(existing.priority);
        let tags = payload.tags.clone().unwrap_or(existing.tags.0);
        let assignee = payload.assignee.clone().unwrap_or(existing.assignee);
        let pr_link = payload.pr_link.clone().unwrap_or(existing.pr_link);
        let branch_name = payload.branch_name.clone().unwrap_or(existing.branch_name);
        let metadata = payload.metadata.clone().unwrap_or(existing.metadata.0);
        let now = Utc::now();

        sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, priority = ?, tags = ?, assignee = ?,
                pr_link = ?, branch_name = ?, metadata = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&title)
        .bind(&description)
        .bind(serde_json::to_string(&priority).unwrap())
        .bind(serde_json::to_string(&tags).map_err(|e| TaskError::Validation(e.to_string()))?)
        .bind(&assignee)
        .bind(&pr_link)
        .bind(&branch_name)
        .bind(serde_json::to_string(&metadata).map_err(|e| TaskError::Validation(e.to_string()))?)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(TaskError::NotFound)
    }

    /// Applies a status transition already validated by the pipeline engine.
    /// Callers run this inside the same transaction as the transition_history
    /// and task_events inserts so the commit is atomic (§5).
    pub async fn set_status<'e, E>(executor: E, id: Uuid, status: &str) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn set_branch_and_pr<'e, E>(
        executor: E,
        id: Uuid,
        branch_name: Option<&str>,
        pr_link: Option<&str>,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query("UPDATE tasks SET branch_name = ?, pr_link = ?, updated_at = ? WHERE id = ?")
            .bind(branch_name)
            .bind(pr_link)
            .bind(Utc::now())
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Appends an `active` phase entry to the task's `phases` column (§4.2
    /// step 5). `phases` is a JSON array with no SQL-native append, so this
    /// is a read-modify-write rather than an in-place `UPDATE ... SET`.
    pub async fn start_phase(
        pool: &SqlitePool,
        id: Uuid,
        name: &str,
        agent_run_id: Uuid,
    ) -> Result<Self, TaskError> {
        let existing = Self::find_by_id(pool, id).await?.ok_or(TaskError::NotFound)?;
        let mut phases = existing.phases.0;
        phases.push(TaskPhase {
            name: name.to_string(),
            status: "active".to_string(),
            agent_run_id: Some(agent_run_id),
            started_at: Some(Utc::now()),
            completed_at: None,
        });
        let phases_json =
            serde_json::to_string(&phases).map_err(|e| TaskError::Validation(e.to_string()))?;
        sqlx::query("UPDATE tasks SET phases = ?, updated_at = ? WHERE id = ?")
            .bind(phases_json)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Self::find_by_id(pool, id).await?.ok_or(TaskError::NotFound)
    }

    /// Marks the most recent `active` phase for `agent_run_id` `completed` or
    /// `failed` (§4.2 post-completion step 2).
    pub async fn complete_phase(
        pool: &SqlitePool,
        id: Uuid,
        agent_run_id: Uuid,
        status: &str,
    ) -> Result<Self, TaskError> {
        let existing = Self::find_by_id(pool, id).await?.ok_or(TaskError::NotFound)?;
        let mut phases = existing.phases.0;
        if let Some(phase) = phases
            .iter_mut()
            .rev()
            .find(|p| p.agent_run_id == Some(agent_run_id) && p.status == "active")
        {
            phase.status = status.to_string();
            phase.completed_at = Some(Utc::now());
        }
        let phases_json =
            serde_json::to_string(&phases).map_err(|e| TaskError::Validation(e.to_string()))?;
        sqlx::query("UPDATE tasks SET phases = ?, updated_at = ? WHERE id = ?")
            .bind(phases_json)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Self::find_by_id(pool, id).await?.ok_or(TaskError::NotFound)
    }

    /// Resets a task back to its pipeline's initial status, clearing branch
    /// and PR linkage but preserving history rows (transition_history,
    /// agent_runs remain as an audit trail).
    pub async fn reset(pool: &SqlitePool, id: Uuid, initial_status: &str) -> Result<Self, TaskError> {
        sqlx::query(
            "UPDATE tasks SET status = ?, branch_name = NULL, pr_link = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(initial_status)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(TaskError::NotFound)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pipeline::{CreatePipeline, Pipeline, PipelineStatus, PipelineTransition, TransitionTrigger};
    use crate::models::project::{CreateProject, Project, ProjectConfig};

    async fn seed(db: &crate::DBService) -> (Project, Pipeline) {
        let project = Project::create(
            &db.pool,
            &CreateProject { name: "demo".into(), path: "/tmp/demo".into(), description: None, config: ProjectConfig::default() },
        )
        .await
        .unwrap();
        let pipeline = Pipeline::create(
            &db.pool,
            &CreatePipeline {
                name: "Simple".into(),
                task_type: "simple".into(),
                statuses: vec![
                    PipelineStatus { name: "open".into(), label: "Open".into(), color: None, is_final: false },
                    PipelineStatus { name: "done".into(), label: "Done".into(), color: None, is_final: true },
                ],
                transitions: vec![PipelineTransition {
                    from: "open".into(), to: "done".into(), trigger: TransitionTrigger::Manual,
                    agent_outcome: None, label: None, guards: vec![], hooks: vec![],
                }],
            },
        )
        .await
        .unwrap();
        (project, pipeline)
    }

    #[tokio::test]
    async fn create_task_in_initial_status() {
        let db = crate::DBService::new_in_memory().await.unwrap();
        let (project, pipeline) = seed(&db).await;
        let task = Task::create(
            &db.pool,
            &CreateTask {
                project_id: project.id,
                pipeline_id: pipeline.id,
                title: "Do the thing".into(),
                description: None,
                priority: TaskPriority::Medium,
                tags: vec![],
                parent_task_id: None,
                assignee: None,
            },
            pipeline.initial_status().unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(task.status, "open");
    }

    #[tokio::test]
    async fn update_clears_explicit_null_assignee() {
        let db = crate::DBService::new_in_memory().await.unwrap();
        let (project, pipeline) = seed(&db).await;
        let task = Task::create(
            &db.pool,
            &CreateTask {
                project_id: project.id,
                pipeline_id: pipeline.id,
                title: "t".into(),
                description: None,
                priority: TaskPriority::Medium,
                tags: vec![],
                parent_task_id: None,
                assignee: Some("alice".into()),
            },
            "open",
        )
        .await
        .unwrap();

        let payload: UpdateTask = serde_json::from_value(serde_json::json!({ "assignee": null })).unwrap();
        let updated = Task::update(&db.pool, task.id, &payload).await.unwrap();
        assert_eq!(updated.assignee, None);
    }
}
