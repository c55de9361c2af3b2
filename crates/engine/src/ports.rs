use async_trait::async_trait;
use db::models::task::Task;
use uuid::Uuid;

use crate::error::EngineError;

/// Starts an agent run for a task. Implemented by the `agents` crate's
/// `AgentService` and injected into the engine's builtin hooks at
/// construction time — the engine cannot depend on `agents` directly since
/// `agents` itself calls back into the engine to report completion
/// (the cyclic-ownership pattern the container resolves via constructor
/// injection rather than a shared mutable singleton).
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn start(&self, task: &Task, agent_type: &str, mode: &str) -> Result<Uuid, EngineError>;
}

/// Git/SCM side effects a hook can trigger. Implemented by `gitops`.
#[async_trait]
pub trait ScmOps: Send + Sync {
    async fn push_and_create_pr(&self, task: &Task) -> Result<String, EngineError>;
    async fn merge_pr(&self, task: &Task) -> Result<(), EngineError>;
}

/// Out-of-band notification sink (implemented by `workflow`, which owns
/// whatever transport — stderr, webhook, etc. — the deployment configures).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, task: &Task, message: &str) -> Result<(), EngineError>;
}

/// Raises a pending prompt for human input, blocking the task's agent run
/// until answered. Implemented by `workflow` atop `db::models::pending_prompt`.
#[async_trait]
pub trait PromptSink: Send + Sync {
    async fn create_prompt(
        &self,
        task: &Task,
        prompt_type: &str,
        payload: serde_json::Value,
        resume_outcome: Option<String>,
    ) -> Result<Uuid, EngineError>;
}
