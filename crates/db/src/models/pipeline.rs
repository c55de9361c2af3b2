use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Pipeline not found")]
    NotFound,
    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineStatus {
    pub name: String,
    pub label: String,
    pub color: Option<String>,
    #[serde(default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    Manual,
    Agent,
    Automatic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HookPolicy {
    BestEffort,
    Required,
    FireAndForget,
}

impl Default for HookPolicy {
    fn default() -> Self {
        HookPolicy::BestEffort
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardRef {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookRef {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub policy: HookPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineTransition {
    pub from: String,
    pub to: String,
    pub trigger: TransitionTrigger,
    pub agent_outcome: Option<String>,
    pub label: Option<String>,
    #[serde(default)]
    pub guards: Vec<GuardRef>,
    #[serde(default)]
    pub hooks: Vec<HookRef>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub task_type: String,
    #[sqlx(json)]
    pub statuses: Json<Vec<PipelineStatus>>,
    #[sqlx(json)]
    pub transitions: Json<Vec<PipelineTransition>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    pub task_type: String,
    pub statuses: Vec<PipelineStatus>,
    pub transitions: Vec<PipelineTransition>,
}

impl Pipeline {
    /// The status new tasks start in: the first declared status, per §3.
    pub fn initial_status(&self) -> Option<&str> {
        self.statuses.0.first().map(|s| s.name.as_str())
    }

    pub fn status(&self, name: &str) -> Option<&PipelineStatus> {
        self.statuses.0.iter().find(|s| s.name == name)
    }

    pub fn first_final_status(&self) -> Option<&str> {
        self.statuses.0.iter().find(|s| s.is_final).map(|s| s.name.as_str())
    }

    /// Validate the shape invariant from §3: every `from`/`to` must
    /// reference a defined status, and every `to` reached by an `agent`
    /// trigger must declare an `agentOutcome`.
    pub fn validate(statuses: &[PipelineStatus], transitions: &[PipelineTransition]) -> Result<(), PipelineError> {
        let known: std::collections::HashSet<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
        for t in transitions {
            if !known.contains(t.from.as_str()) {
                return Err(PipelineError::Validation(format!(
                    "transition references undefined status '{}'",
                    t.from
                )));
            }
            if !known.contains(t.to.as_str()) {
                return Err(PipelineError::Validation(format!(
                    "transition references undefined status '{}'",
                    t.to
                )));
            }
            if matches!(t.trigger, TransitionTrigger::Agent) && t.agent_outcome.is_none() {
                return Err(PipelineError::Validation(format!(
                    "agent-triggered transition {} -> {} must declare agentOutcome",
                    t.from, t.to
                )));
            }
        }
        Ok(())
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM pipelines ORDER BY created_at ASC")
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM pipelines WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_task_type(
        pool: &SqlitePool,
        task_type: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM pipelines WHERE task_type = ?")
            .bind(task_type)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreatePipeline) -> Result<Self, PipelineError> {
        Self::validate(&data.statuses, &data.transitions)?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let statuses_json = serde_json::to_string(&data.statuses)
            .map_err(|e| PipelineError::Validation(e.to_string()))?;
        let transitions_json = serde_json::to_string(&data.transitions)
            .map_err(|e| PipelineError::Validation(e.to_string()))?;

        sqlx::query(
            "INSERT INTO pipelines (id, name, task_type, statuses, transitions, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.task_type)
        .bind(statuses_json)
        .bind(transitions_json)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(PipelineError::NotFound)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pipelines WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_pipeline() -> CreatePipeline {
        CreatePipeline {
            name: "Simple".into(),
            task_type: "simple".into(),
            statuses: vec![
                PipelineStatus { name: "open".into(), label: "Open".into(), color: None, is_final: false },
                PipelineStatus { name: "in_progress".into(), label: "In Progress".into(), color: None, is_final: false },
                PipelineStatus { name: "done".into(), label: "Done".into(), color: None, is_final: true },
            ],
            transitions: vec![
                PipelineTransition { from: "open".into(), to: "in_progress".into(), trigger: TransitionTrigger::Manual, agent_outcome: None, label: None, guards: vec![], hooks: vec![] },
                PipelineTransition { from: "in_progress".into(), to: "done".into(), trigger: TransitionTrigger::Manual, agent_outcome: None, label: None, guards: vec![], hooks: vec![] },
            ],
        }
    }

    #[tokio::test]
    async fn create_and_fetch_pipeline() {
        let db = crate::DBService::new_in_memory().await.unwrap();
        let pipeline = Pipeline::create(&db.pool, &simple_pipeline()).await.unwrap();
        assert_eq!(pipeline.initial_status(), Some("open"));
        assert_eq!(pipeline.first_final_status(), Some("done"));
    }

    #[test]
    fn rejects_agent_transition_without_outcome() {
        let mut data = simple_pipeline();
        data.transitions[0].trigger = TransitionTrigger::Agent;
        let err = Pipeline::validate(&data.statuses, &data.transitions);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_transition_to_unknown_status() {
        let mut data = simple_pipeline();
        data.transitions[0].to = "nowhere".into();
        let err = Pipeline::validate(&data.statuses, &data.transitions);
        assert!(err.is_err());
    }
}
