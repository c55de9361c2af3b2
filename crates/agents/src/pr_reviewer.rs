use std::{path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use db::models::{agent_run::AgentRun, task::Task};

use crate::{
    agent::{AgentExecution, AgentResult, CodingAgent, OutputFormat},
    error::AgentError,
};

/// Reviews the task's open PR instead of writing code: same spawn/parse
/// shape as [`crate::claude_code::ClaudeCodeAgent`], different prompt and a
/// narrower outcome vocabulary (`approved` / `changes_requested`).
pub struct PrReviewerAgent {
    pub binary: String,
    pub timeout: Duration,
}

impl Default for PrReviewerAgent {
    fn default() -> Self {
        Self { binary: "claude".into(), timeout: Duration::from_secs(15 * 60) }
    }
}

#[async_trait]
impl CodingAgent for PrReviewerAgent {
    fn agent_type(&self) -> &'static str {
        "pr-reviewer"
    }

    fn output_format(&self) -> OutputFormat {
        OutputFormat::JsonLines
    }

    fn build_prompt(&self, task: &Task, _run: &AgentRun) -> String {
        format!(
            "## Review request\n\nReview the open pull request for task \"{}\". \
             Report `approved` if the change is ready to merge, or \
             `changes_requested` with specific feedback otherwise.\n\nPR: {}",
            task.title,
            task.pr_link.as_deref().unwrap_or("(not yet linked)"),
        )
    }

    async fn execute(&self, prompt: &str, working_dir: &Path) -> Result<AgentExecution, AgentError> {
        let mut command = tokio::process::Command::new(&self.binary);
        command
            .arg("--print")
            .arg("--output-format")
            .arg("stream-json")
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = command.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            stdin.write_all(prompt.as_bytes()).await?;
        }
        Ok(AgentExecution::Process(Box::new(child)))
    }

    async fn stop(&self, execution: &mut AgentExecution) -> Result<(), AgentError> {
        if let AgentExecution::Process(child) = execution {
            child.start_kill()?;
        }
        Ok(())
    }

    fn build_result(&self, raw_output: &str, exit_code: Option<i32>) -> AgentResult {
        let last_event = raw_output
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<serde_json::Value>(line.trim()).ok());

        let outcome = last_event
            .as_ref()
            .and_then(|e| e.get("outcome"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| if exit_code == Some(0) { "approved".into() } else { "changes_requested".into() });

        AgentResult {
            outcome,
            payload: last_event.unwrap_or_else(|| serde_json::json!({ "raw": raw_output })),
            input_tokens: None,
            output_tokens: None,
        }
    }

    fn is_available(&self) -> bool {
        which(&self.binary)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn which(binary: &str) -> bool {
    let path = match std::env::var_os("PATH") {
        Some(p) => p,
        None => return false,
    };
    std::env::split_paths(&path).any(|dir| dir.join(binary).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_result_defaults_to_changes_requested_on_nonzero_exit() {
        let agent = PrReviewerAgent::default();
        let result = agent.build_result("", Some(1));
        assert_eq!(result.outcome, "changes_requested");
    }
}
