use std::{collections::HashMap, sync::Arc};

use db::models::{
    agent_run::{AgentRun, AgentRunStatus, CreateAgentRun},
    task::Task,
    task_event::{TaskEventCategory, TaskEventSeverity},
};
use engine::{PipelineEngine, TransitionRequest};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    agent::{AgentExecution, CodingAgent},
    error::AgentError,
};

/// Orchestrates coding-agent runs (§4.2): starts a run against whichever
/// [`CodingAgent`] implementation matches the task's requested agent type,
/// enforces a timeout, and on completion drives the engine's agent-outcome
/// transition so the task's status reflects what the agent reported.
pub struct AgentService {
    pool: SqlitePool,
    engine: Arc<PipelineEngine>,
    agents: HashMap<String, Arc<dyn CodingAgent>>,
    running: RwLock<HashMap<Uuid, tokio::task::AbortHandle>>,
}

impl AgentService {
    pub fn new(pool: SqlitePool, engine: Arc<PipelineEngine>) -> Self {
        Self { pool, engine, agents: HashMap::new(), running: RwLock::new(HashMap::new()) }
    }

    pub fn register_agent(&mut self, agent: Arc<dyn CodingAgent>) {
        self.agents.insert(agent.agent_type().to_string(), agent);
    }

    fn resolve(&self, agent_type: &str) -> Result<Arc<dyn CodingAgent>, AgentError> {
        self.agents
            .get(agent_type)
            .cloned()
            .ok_or_else(|| AgentError::UnknownAgentType(agent_type.to_string()))
    }

    /// Starts a run for `task_id` under `agent_type`/`mode`, working out of
    /// `working_dir` (the task's prepared worktree). Returns the new agent
    /// run's id immediately; completion is handled asynchronously in a
    /// spawned task, matching the teacher's fire-and-poll execution model.
    pub async fn execute(
        &self,
        task_id: Uuid,
        agent_type: &str,
        mode: &str,
        working_dir: std::path::PathBuf,
    ) -> Result<Uuid, AgentError> {
        let agent = self.resolve(agent_type)?;
        if !agent.is_available() {
            return Err(AgentError::Unavailable(agent_type.to_string()));
        }

        let task = Task::find_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| AgentError::Database(sqlx::Error::RowNotFound))?;

        let run = AgentRun::create(
            &self.pool,
            &CreateAgentRun { task_id, agent_type: agent_type.to_string(), mode: mode.to_string(), prompt: None },
        )
        .await?;

        let prompt = agent.build_prompt(&task, &run);
        sqlx::query("UPDATE agent_runs SET prompt = ? WHERE id = ?")
            .bind(&prompt)
            .bind(run.id)
            .execute(&self.pool)
            .await?;

        Task::start_phase(&self.pool, task_id, mode, run.id).await?;

        let timeout = agent.timeout();
        let pool = self.pool.clone();
        let engine = self.engine.clone();
        let run_id = run.id;

        let handle = tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, agent.execute(&prompt, &working_dir)).await;

            let (status, result) = match outcome {
                Err(_) => (AgentRunStatus::TimedOut, None),
                Ok(Err(_)) => (AgentRunStatus::Failed, None),
                Ok(Ok(AgentExecution::Immediate(result))) => (AgentRunStatus::Completed, Some(result)),
                Ok(Ok(AgentExecution::Process(mut child))) => {
                    let mut stdout = String::new();
                    if let Some(mut out) = child.stdout.take() {
                        use tokio::io::AsyncReadExt;
                        let _ = out.read_to_string(&mut stdout).await;
                    }
                    match child.wait().await {
                        Ok(status) if status.success() => {
                            let result = agent.build_result(&stdout, status.code());
                            (AgentRunStatus::Completed, Some(result))
                        }
                        Ok(status) => {
                            let result = agent.build_result(&stdout, status.code());
                            (AgentRunStatus::Failed, Some(result))
                        }
                        Err(_) => (AgentRunStatus::Failed, None),
                    }
                }
            };

            let _ = AgentRun::complete(
                &pool,
                run_id,
                status,
                result.as_ref().map(|r| r.payload.to_string()).as_deref(),
                result.as_ref().map(|r| r.outcome.as_str()),
                None,
                result.as_ref().and_then(|r| r.input_tokens),
                result.as_ref().and_then(|r| r.output_tokens),
            )
            .await;

            let phase_status = if matches!(status, AgentRunStatus::Completed) { "completed" } else { "failed" };
            let _ = Task::complete_phase(&pool, task_id, run_id, phase_status).await;

            let _ = db::models::task_event::TaskEvent::record(
                &pool,
                task_id,
                TaskEventCategory::Agent,
                if matches!(status, AgentRunStatus::Completed) { TaskEventSeverity::Info } else { TaskEventSeverity::Warning },
                &format!("agent run {run_id} finished as {status}"),
                None,
            )
            .await;

            if let Some(result) = result {
                if matches!(status, AgentRunStatus::Completed | AgentRunStatus::Failed) {
                    let _ = engine
                        .execute_transition(task_id, TransitionRequest::Agent { outcome: result.outcome })
                        .await;
                }
            }
        });

        self.running.write().await.insert(run.id, handle.abort_handle());

        Ok(run.id)
    }

    /// Aborts a still-running agent task and marks the run `cancelled`.
    pub async fn stop(&self, run_id: Uuid) -> Result<(), AgentError> {
        if let Some(handle) = self.running.write().await.remove(&run_id) {
            handle.abort();
        }
        AgentRun::complete(&self.pool, run_id, AgentRunStatus::Cancelled, None, None, None, None, None).await?;
        Ok(())
    }

    /// Marks every run this process left `running` as `interrupted`. Call
    /// once at service startup to reconcile state after an unclean shutdown
    /// — distinct from `stop`, which is a deliberate user cancellation.
    pub async fn recover_orphaned_runs(&self) -> Result<u64, AgentError> {
        Ok(AgentRun::interrupt_all_running(&self.pool).await?)
    }
}
