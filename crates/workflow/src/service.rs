use std::{collections::HashMap, sync::Arc};

use db::models::{
    agent_run::AgentRun,
    pending_prompt::PendingPrompt,
    pipeline::Pipeline,
    project::Project,
    task::{CreateTask, Task, UpdateTask},
    task_artifact::TaskArtifact,
    task_event::{TaskEventCategory, TaskEventSeverity},
};
use engine::{PipelineEngine, TransitionRequest};
use gitops::{GitHubScm, WorktreeManager};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::WorkflowError;

#[derive(Debug, Clone, Serialize, Default)]
pub struct DashboardStats {
    pub total_tasks: i64,
    pub tasks_by_status: HashMap<String, i64>,
    pub running_agents: i64,
    pub pending_prompts: i64,
}

/// The single entry point for all external callers (§4.3): thin orchestration
/// that delegates CRUD to stores, transitions to the engine, agent lifecycle
/// to the agent service, and records `activity_log` entries for every
/// user-visible action.
pub struct WorkflowService {
    pool: SqlitePool,
    engine: Arc<PipelineEngine>,
    agents: Arc<agents::AgentService>,
    scm: Arc<GitHubScm>,
}

impl WorkflowService {
    pub fn new(
        pool: SqlitePool,
        engine: Arc<PipelineEngine>,
        agents: Arc<agents::AgentService>,
        scm: Arc<GitHubScm>,
    ) -> Self {
        Self { pool, engine, agents, scm }
    }

    async fn worktree_manager(&self, project: &Project) -> WorktreeManager {
        let repo_dir = std::path::PathBuf::from(&project.path);
        let worktrees_root = repo_dir.join(project.config.0.worktrees_path_or_default());
        WorktreeManager::new(repo_dir, worktrees_root)
    }

    pub async fn create_task(&self, data: CreateTask) -> Result<Task, WorkflowError> {
        let pipeline = Pipeline::find_by_id(&self.pool, data.pipeline_id)
            .await?
            .ok_or(WorkflowError::TaskNotFound(data.pipeline_id))?;
        let initial_status = pipeline.initial_status().unwrap_or("open").to_string();
        let task = Task::create(&self.pool, &data, &initial_status).await.map_err(sqlx_from_task_error)?;

        db::models::activity_log::ActivityLogEntry::record(
            &self.pool,
            "create",
            "task",
            task.id,
            &format!("created task '{}'", task.title),
            None,
        )
        .await?;
        Ok(task)
    }

    pub async fn update_task(&self, task_id: Uuid, data: UpdateTask) -> Result<Task, WorkflowError> {
        let task = Task::update(&self.pool, task_id, &data).await.map_err(sqlx_from_task_error)?;
        db::models::activity_log::ActivityLogEntry::record(
            &self.pool,
            "update",
            "task",
            task.id,
            &format!("updated task '{}'", task.title),
            None,
        )
        .await?;
        Ok(task)
    }

    /// Best-effort worktree cleanup: unlock if locked, delete; failures are
    /// swallowed since they are not fatal to the DB-level delete (§4.3).
    async fn cleanup_worktree_best_effort(&self, task: &Task) {
        let Ok(Some(project)) = Project::find_by_id(&self.pool, task.project_id).await else { return };
        let manager = self.worktree_manager(&project).await;
        let _ = manager.unlock(task.id);
        let _ = manager.delete(task.id, true);
    }

    pub async fn delete_task(&self, task_id: Uuid) -> Result<(), WorkflowError> {
        let task = Task::find_by_id(&self.pool, task_id).await?.ok_or(WorkflowError::TaskNotFound(task_id))?;
        self.cleanup_worktree_best_effort(&task).await;
        Task::delete(&self.pool, task_id).await?;
        db::models::activity_log::ActivityLogEntry::record(
            &self.pool,
            "delete",
            "task",
            task_id,
            &format!("deleted task '{}'", task.title),
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn reset_task(&self, task_id: Uuid) -> Result<Task, WorkflowError> {
        let task = Task::find_by_id(&self.pool, task_id).await?.ok_or(WorkflowError::TaskNotFound(task_id))?;
        self.cleanup_worktree_best_effort(&task).await;
        let pipeline = Pipeline::find_by_id(&self.pool, task.pipeline_id)
            .await?
            .ok_or(WorkflowError::TaskNotFound(task.pipeline_id))?;
        let initial_status = pipeline.initial_status().unwrap_or("open");
        let task = Task::reset(&self.pool, task_id, initial_status).await.map_err(sqlx_from_task_error)?;

        db::models::activity_log::ActivityLogEntry::record(
            &self.pool,
            "reset",
            "task",
            task_id,
            &format!("reset task '{}' to '{}'", task.title, initial_status),
            None,
        )
        .await?;
        Ok(task)
    }

    pub async fn transition_task(
        &self,
        task_id: Uuid,
        to_status: String,
        actor: Option<String>,
    ) -> Result<Task, WorkflowError> {
        let executed = self
            .engine
            .execute_transition(task_id, TransitionRequest::Manual { to: to_status, actor: actor.clone() })
            .await?;

        db::models::activity_log::ActivityLogEntry::record(
            &self.pool,
            "transition",
            "task",
            task_id,
            &format!("transitioned to '{}'", executed.task.status),
            actor.map(|a| serde_json::json!({ "actor": a })).as_ref(),
        )
        .await?;
        Ok(executed.task)
    }

    pub async fn start_agent(&self, task_id: Uuid, agent_type: &str, mode: &str) -> Result<Uuid, WorkflowError> {
        let task = Task::find_by_id(&self.pool, task_id).await?.ok_or(WorkflowError::TaskNotFound(task_id))?;
        let project = Project::find_by_id(&self.pool, task.project_id).await?.ok_or(WorkflowError::ProjectNotFound(task.project_id))?;
        let manager = self.worktree_manager(&project).await;

        let working_dir = match manager.get(task_id) {
            Ok(info) => info.path,
            Err(_) => {
                let branch = task.branch_name.clone().unwrap_or_else(|| format!("task/{task_id}"));
                let base = project.config.0.default_branch_or("main");
                manager.create(task_id, &branch, &base)?.path
            }
        };

        let run_id = self.agents.execute(task_id, agent_type, mode, working_dir).await?;
        db::models::activity_log::ActivityLogEntry::record(
            &self.pool,
            "agent_start",
            "task",
            task_id,
            &format!("started {agent_type} agent ({mode})"),
            None,
        )
        .await?;
        Ok(run_id)
    }

    pub async fn stop_agent(&self, run_id: Uuid) -> Result<(), WorkflowError> {
        self.agents.stop(run_id).await?;
        Ok(())
    }

    /// Marks the prompt answered, logs an activity and a task event, and —
    /// if the prompt carries a `resumeOutcome` — dispatches the matching
    /// agent-triggered transition, mirroring §4.2's auto-transition logic.
    pub async fn respond_to_prompt(&self, prompt_id: Uuid, response: serde_json::Value) -> Result<PendingPrompt, WorkflowError> {
        let prompt = PendingPrompt::respond(&self.pool, prompt_id, &response)
            .await
            .map_err(|err| match err {
                db::models::pending_prompt::PendingPromptError::Database(e) => WorkflowError::Database(e),
                db::models::pending_prompt::PendingPromptError::NotFound => WorkflowError::PromptNotFound(prompt_id),
                other => WorkflowError::Database(sqlx::Error::Protocol(other.to_string())),
            })?;

        db::models::activity_log::ActivityLogEntry::record(
            &self.pool,
            "prompt_response",
            "task",
            prompt.task_id,
            "responded to prompt",
            Some(&response),
        )
        .await?;
        db::models::task_event::TaskEvent::record(
            &self.pool,
            prompt.task_id,
            TaskEventCategory::Agent,
            TaskEventSeverity::Info,
            "prompt answered",
            None,
        )
        .await?;

        if !prompt.resume_outcome.as_deref().unwrap_or_default().is_empty() {
            let outcome = prompt.resume_outcome.clone().unwrap();
            let _ = self.engine.execute_transition(prompt.task_id, TransitionRequest::Agent { outcome }).await;
        }
        Ok(prompt)
    }

    pub async fn get_dashboard_stats(&self) -> Result<DashboardStats, WorkflowError> {
        let projects = Project::find_all(&self.pool).await?;
        let mut tasks_by_status = HashMap::new();
        let mut total_tasks = 0i64;
        for project in &projects {
            for task in Task::find_by_project(&self.pool, project.id).await? {
                total_tasks += 1;
                *tasks_by_status.entry(task.status).or_insert(0) += 1;
            }
        }
        let running_agents = AgentRun::find_all_running(&self.pool).await?.len() as i64;
        let pending_prompts = PendingPrompt::find_all_pending(&self.pool).await?.len() as i64;
        Ok(DashboardStats { total_tasks, tasks_by_status, running_agents, pending_prompts })
    }

    /// Looks up the most recent `pr` artifact, removes the worktree first so
    /// `--delete-branch` can clean the local branch, merges via the SCM
    /// platform, optionally pulls the default branch, and attempts to
    /// auto-transition the task to the pipeline's first final status (§4.3).
    pub async fn merge_pr(&self, task_id: Uuid) -> Result<Task, WorkflowError> {
        let task = Task::find_by_id(&self.pool, task_id).await?.ok_or(WorkflowError::TaskNotFound(task_id))?;
        let artifacts = TaskArtifact::find_by_task(&self.pool, task_id).await?;
        artifacts
            .iter()
            .rev()
            .find(|a| a.artifact_type == "pr")
            .ok_or_else(|| WorkflowError::NoArtifact("pr".into()))?;

        let project = Project::find_by_id(&self.pool, task.project_id).await?.ok_or(WorkflowError::ProjectNotFound(task.project_id))?;
        let manager = self.worktree_manager(&project).await;
        let _ = manager.delete(task_id, true);

        self.scm.merge_pr(&task).await?;

        if project.config.0.pull_main_after_merge.unwrap_or(false) {
            let default_branch = project.config.0.default_branch_or("main");
            let _ = gitops::GitOps::new().pull(std::path::Path::new(&project.path), "origin", &default_branch);
        }

        let pipeline = Pipeline::find_by_id(&self.pool, task.pipeline_id).await?.ok_or(WorkflowError::TaskNotFound(task.pipeline_id))?;
        if let Some(final_status) = pipeline.first_final_status() {
            if let Ok(executed) = self
                .engine
                .execute_transition(task_id, TransitionRequest::Manual { to: final_status.to_string(), actor: Some("merge_pr".into()) })
                .await
            {
                db::models::activity_log::ActivityLogEntry::record(
                    &self.pool,
                    "merge",
                    "task",
                    task_id,
                    &format!("merged PR, task moved to '{final_status}'"),
                    None,
                )
                .await?;
                return Ok(executed.task);
            }
        }
        Task::find_by_id(&self.pool, task_id).await?.ok_or(WorkflowError::TaskNotFound(task_id))
    }
}

fn sqlx_from_task_error(err: db::models::task::TaskError) -> WorkflowError {
    match err {
        db::models::task::TaskError::Database(e) => WorkflowError::Database(e),
        db::models::task::TaskError::NotFound => WorkflowError::Database(sqlx::Error::RowNotFound),
        db::models::task::TaskError::Validation(msg) => WorkflowError::Database(sqlx::Error::Protocol(msg)),
    }
}
