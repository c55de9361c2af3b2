use async_trait::async_trait;
use db::models::{agent_run::AgentRun, pending_prompt::{CreatePendingPrompt, PendingPrompt}, task::Task};
use engine::{error::EngineError, ports::PromptSink};
use sqlx::SqlitePool;
use uuid::Uuid;

const PORT: &str = "prompt_sink";

/// Implements [`engine::ports::PromptSink`] atop `db::models::pending_prompt`
/// (§4.2's prompt/response cycle, raised by the `create_prompt` builtin hook
/// when an agent outcome is schema-bearing and needs human input before the
/// run can resume).
pub struct DbPromptSink {
    pool: SqlitePool,
}

impl DbPromptSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromptSink for DbPromptSink {
    async fn create_prompt(
        &self,
        task: &Task,
        prompt_type: &str,
        payload: serde_json::Value,
        resume_outcome: Option<String>,
    ) -> Result<Uuid, EngineError> {
        let agent_run = AgentRun::find_latest_for_task(&self.pool, task.id)
            .await
            .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?
            .ok_or_else(|| EngineError::PortFailed { port: PORT, source: "no agent run to attach prompt to".into() })?;

        let prompt = PendingPrompt::create(
            &self.pool,
            &CreatePendingPrompt {
                task_id: task.id,
                agent_run_id: agent_run.id,
                prompt_type: prompt_type.to_string(),
                payload,
                resume_outcome,
            },
        )
        .await
        .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?;

        Ok(prompt.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use db::models::{
        agent_run::CreateAgentRun,
        pending_prompt::PendingPrompt,
        pipeline::Pipeline,
        project::{CreateProject, Project, ProjectConfig},
        task::{CreateTask, Task, TaskPriority},
    };
    use engine::{PipelineEngine, TransitionRequest};

    use super::*;

    /// Scenario 4 (needs-info round trip): an agent's `needs_info` outcome
    /// creates a pending prompt and parks the task in `needs_info`;
    /// responding to it resumes the task via the transition whose
    /// `agentOutcome = 'info_provided'`.
    #[tokio::test]
    async fn needs_info_round_trip_resumes_via_info_provided() {
        let db_service = db::DBService::new_in_memory().await.unwrap();
        let pipeline = Pipeline::create(&db_service.pool, &engine::seeds::agent()).await.unwrap();
        let project = Project::create(
            &db_service.pool,
            &CreateProject { name: "demo".into(), path: "/tmp/demo-needs-info".into(), description: None, config: ProjectConfig::default() },
        )
        .await
        .unwrap();
        let task = Task::create(
            &db_service.pool,
            &CreateTask {
                project_id: project.id,
                pipeline_id: pipeline.id,
                title: "t".into(),
                description: None,
                priority: TaskPriority::Medium,
                tags: vec![],
                parent_task_id: None,
                assignee: None,
            },
            "planning",
        )
        .await
        .unwrap();

        AgentRun::create(
            &db_service.pool,
            &CreateAgentRun { task_id: task.id, agent_type: "claude_code".into(), mode: "planning".into(), prompt: None },
        )
        .await
        .unwrap();

        let engine = PipelineEngine::new(db_service.pool.clone());
        engine.register_builtin_guards().await;
        let sink = Arc::new(DbPromptSink::new(db_service.pool.clone()));
        engine.register_hook("create_prompt", Arc::new(engine::builtins::hooks::CreatePromptHook { sink })).await;

        let result = engine.execute_transition(task.id, TransitionRequest::Agent { outcome: "needs_info".into() }).await.unwrap();
        assert_eq!(result.task.status, "needs_info");

        let prompts = PendingPrompt::find_by_task(&db_service.pool, task.id).await.unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].status, "pending");
        assert_eq!(prompts[0].resume_outcome.as_deref(), Some("info_provided"));

        PendingPrompt::respond(&db_service.pool, prompts[0].id, &serde_json::json!({ "answer": "JWT" })).await.unwrap();
        engine.execute_transition(task.id, TransitionRequest::Agent { outcome: "info_provided".into() }).await.unwrap();

        let answered = PendingPrompt::find_by_task(&db_service.pool, task.id).await.unwrap();
        assert_eq!(answered[0].status, "answered");
        let reloaded = Task::find_by_id(&db_service.pool, task.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, "planning");
    }
}
