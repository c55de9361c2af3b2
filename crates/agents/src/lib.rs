pub mod agent;
pub mod claude_code;
pub mod error;
pub mod pr_reviewer;
pub mod scripted;
pub mod service;

pub use agent::{AgentExecution, AgentResult, CodingAgent, OutputFormat};
pub use claude_code::ClaudeCodeAgent;
pub use error::AgentError;
pub use pr_reviewer::PrReviewerAgent;
pub use service::AgentService;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use db::models::{
        pipeline::Pipeline,
        project::{CreateProject, Project, ProjectConfig},
        task::{CreateTask, Task, TaskPriority},
    };
    use engine::{seeds, PipelineEngine};

    use super::*;
    use crate::scripted::ScriptedAgent;

    #[tokio::test]
    async fn scripted_agent_run_drives_engine_transition() {
        let db_service = db::DBService::new_in_memory().await.unwrap();
        let pipeline = Pipeline::create(&db_service.pool, &seeds::feature()).await.unwrap();
        let project = Project::create(
            &db_service.pool,
            &CreateProject { name: "demo".into(), path: "/tmp/demo".into(), description: None, config: ProjectConfig::default() },
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
            "in_progress",
        )
        .await
        .unwrap();

        let engine = Arc::new(PipelineEngine::new(db_service.pool.clone()));
        engine.register_builtin_guards().await;

        let mut service = AgentService::new(db_service.pool.clone(), engine.clone());
        service.register_agent(Arc::new(ScriptedAgent::failing()));

        let run_id = service
            .execute(task.id, "scripted", "run", std::path::PathBuf::from("/tmp"))
            .await
            .unwrap();

        // Give the spawned completion task a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let run = db::models::agent_run::AgentRun::find_by_id(&db_service.pool, run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, "failed");
    }
}
