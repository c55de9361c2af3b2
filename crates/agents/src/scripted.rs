use std::{path::Path, time::Duration};

use async_trait::async_trait;
use db::models::{agent_run::AgentRun, task::Task};

use crate::{
    agent::{AgentExecution, AgentResult, CodingAgent, OutputFormat},
    error::AgentError,
};

/// A test double that returns a predetermined [`AgentResult`] without
/// spawning anything, for exercising the pipeline/agent wiring without a
/// real coding-agent binary installed.
pub struct ScriptedAgent {
    pub result: AgentResult,
    pub delay: Duration,
    pub available: bool,
}

impl ScriptedAgent {
    pub fn succeeding() -> Self {
        Self {
            result: AgentResult { outcome: "success".into(), payload: serde_json::json!({}), input_tokens: Some(10), output_tokens: Some(20) },
            delay: Duration::ZERO,
            available: true,
        }
    }

    pub fn failing() -> Self {
        Self {
            result: AgentResult { outcome: "failure".into(), payload: serde_json::json!({"error": "scripted failure"}), input_tokens: Some(5), output_tokens: Some(5) },
            delay: Duration::ZERO,
            available: true,
        }
    }
}

#[async_trait]
impl CodingAgent for ScriptedAgent {
    fn agent_type(&self) -> &'static str {
        "scripted"
    }

    fn output_format(&self) -> OutputFormat {
        OutputFormat::JsonLines
    }

    fn build_prompt(&self, task: &Task, _run: &AgentRun) -> String {
        task.title.clone()
    }

    async fn execute(&self, _prompt: &str, _working_dir: &Path) -> Result<AgentExecution, AgentError> {
        if !self.available {
            return Err(AgentError::Unavailable("scripted".into()));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(AgentExecution::Immediate(self.result.clone()))
    }

    async fn stop(&self, _execution: &mut AgentExecution) -> Result<(), AgentError> {
        Ok(())
    }

    fn build_result(&self, _raw_output: &str, _exit_code: Option<i32>) -> AgentResult {
        self.result.clone()
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}
