use std::{path::Path, time::Duration};

use async_trait::async_trait;
use db::models::{agent_run::AgentRun, task::Task};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// How an agent's raw output is shaped — plain text from a CLI tool, or
/// newline-delimited JSON events the agent emits as it works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    PlainText,
    JsonLines,
}

/// The normalized result of one completed run: the outcome name (matched
/// against a pipeline's `agentOutcome` transitions), any structured payload
/// it produced, and token cost if the agent reports one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentResult {
    pub outcome: String,
    pub payload: serde_json::Value,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
}

/// A running or already-finished agent invocation. Real executors spawn a
/// subprocess and poll it; the `scripted` test double already knows its
/// answer and completes immediately — both are driven the same way by
/// [`crate::service::AgentService`].
pub enum AgentExecution {
    Process(Box<tokio::process::Child>),
    Immediate(AgentResult),
}

/// A pluggable coding agent implementation (§4.2). Each concrete agent type
/// (e.g. a specific CLI tool) implements this once; `AgentService` is
/// generic over it via dynamic dispatch so new agent types require no
/// changes to the orchestration logic.
#[async_trait]
pub trait CodingAgent: Send + Sync {
    fn agent_type(&self) -> &'static str;

    fn output_format(&self) -> OutputFormat;

    /// Assembles the prompt for this run. `run` carries whatever prior
    /// context (previous outcome, human response to a prompt) a follow-up
    /// invocation needs.
    fn build_prompt(&self, task: &Task, run: &AgentRun) -> String;

    /// Starts the agent. `working_dir` is the git worktree prepared for the
    /// task by the Worktree Manager.
    async fn execute(&self, prompt: &str, working_dir: &Path) -> Result<AgentExecution, AgentError>;

    /// Best-effort interruption of a still-running execution.
    async fn stop(&self, execution: &mut AgentExecution) -> Result<(), AgentError>;

    /// Parses raw captured output (stdout, or the last JSON-lines event)
    /// into a normalized result once the process has exited.
    fn build_result(&self, raw_output: &str, exit_code: Option<i32>) -> AgentResult;

    /// Whether the underlying tool is installed and callable right now.
    fn is_available(&self) -> bool;

    /// Maximum wall-clock time a single run may take before the service
    /// force-stops it and records a `timed_out` status.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30 * 60)
    }
}
