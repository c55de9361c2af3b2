use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use db::models::{project::Project, task::Task};
use engine::{error::EngineError, ports::AgentLauncher};
use gitops::WorktreeManager;
use sqlx::SqlitePool;
use uuid::Uuid;

const PORT: &str = "agent_launcher";

/// Implements [`engine::ports::AgentLauncher`] atop [`agents::AgentService`],
/// resolving (or creating) the task's worktree first — §4.2 step 2 ("ensure
/// a worktree for the task") folded into the launch path rather than left to
/// the caller.
pub struct WorkflowAgentLauncher {
    pool: SqlitePool,
    agent_service: Arc<agents::AgentService>,
}

impl WorkflowAgentLauncher {
    pub fn new(pool: SqlitePool, agent_service: Arc<agents::AgentService>) -> Self {
        Self { pool, agent_service }
    }

    async fn worktree_dir(&self, task: &Task) -> Result<PathBuf, EngineError> {
        let project = Project::find_by_id(&self.pool, task.project_id)
            .await
            .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?
            .ok_or(EngineError::TaskNotFound(task.id))?;

        let repo_dir = PathBuf::from(&project.path);
        let worktrees_root = repo_dir.join(project.config.0.worktrees_path_or_default());
        let manager = WorktreeManager::new(repo_dir, worktrees_root);

        if let Ok(info) = manager.get(task.id) {
            return Ok(info.path);
        }

        let branch = task
            .branch_name
            .clone()
            .unwrap_or_else(|| format!("task/{}", task.id));
        let base = project.config.0.default_branch_or("main");
        let info = manager
            .create(task.id, &branch, &base)
            .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?;
        Ok(info.path)
    }
}

#[async_trait]
impl AgentLauncher for WorkflowAgentLauncher {
    async fn start(&self, task: &Task, agent_type: &str, mode: &str) -> Result<Uuid, EngineError> {
        let working_dir = self.worktree_dir(task).await?;
        self.agent_service
            .execute(task.id, agent_type, mode, working_dir)
            .await
            .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })
    }
}
