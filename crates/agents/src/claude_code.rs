use std::{path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use db::models::{agent_run::AgentRun, task::Task};

use crate::{
    agent::{AgentExecution, AgentResult, CodingAgent, OutputFormat},
    error::AgentError,
};

/// Spawns a configurable CLI coding-agent binary (`claude` by default),
/// piping the assembled prompt on stdin and reading newline-delimited JSON
/// events from stdout, in the spirit of the original system's
/// `coding_agent_initial` request/executor split — generalized to a single
/// "spawn a process with the prompt, parse the last JSON line" shape rather
/// than a whole per-agent executor type hierarchy.
pub struct ClaudeCodeAgent {
    pub binary: String,
    pub model: Option<String>,
    pub timeout: Duration,
}

impl ClaudeCodeAgent {
    pub fn new(binary: impl Into<String>, model: Option<String>, timeout: Duration) -> Self {
        Self { binary: binary.into(), model, timeout }
    }
}

impl Default for ClaudeCodeAgent {
    fn default() -> Self {
        Self { binary: "claude".into(), model: None, timeout: Duration::from_secs(30 * 60) }
    }
}

#[async_trait]
impl CodingAgent for ClaudeCodeAgent {
    fn agent_type(&self) -> &'static str {
        "claude-code"
    }

    fn output_format(&self) -> OutputFormat {
        OutputFormat::JsonLines
    }

    fn build_prompt(&self, task: &Task, _run: &AgentRun) -> String {
        let mut prompt = String::new();
        prompt.push_str("## Task\n\n");
        prompt.push_str(&task.title);
        if let Some(description) = &task.description {
            prompt.push_str("\n\n");
            prompt.push_str(description);
        }
        prompt
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
        if let Some(model) = &self.model {
            command.arg("--model").arg(model);
        }

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

    /// The last well-formed JSON line is treated as the agent's final
    /// result, mirroring `stream-json`'s convention of a terminal summary
    /// event; earlier lines are progress/tool-use events this layer ignores.
    fn build_result(&self, raw_output: &str, exit_code: Option<i32>) -> AgentResult {
        let last_event = raw_output
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<serde_json::Value>(line.trim()).ok());

        match last_event {
            Some(event) => {
                let outcome = event
                    .get("outcome")
                    .and_then(|v| v.as_str())
                    .unwrap_or(if exit_code == Some(0) { "success" } else { "failure" })
                    .to_string();
                AgentResult {
                    outcome,
                    payload: event,
                    input_tokens: None,
                    output_tokens: None,
                }
            }
            None => AgentResult {
                outcome: if exit_code == Some(0) { "success".into() } else { "failure".into() },
                payload: serde_json::json!({ "raw": raw_output }),
                input_tokens: None,
                output_tokens: None,
            },
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
    fn build_result_falls_back_to_exit_code_when_output_is_not_json() {
        let agent = ClaudeCodeAgent::default();
        let result = agent.build_result("not json at all", Some(0));
        assert_eq!(result.outcome, "success");
    }

    #[test]
    fn build_result_reads_outcome_from_last_json_line() {
        let agent = ClaudeCodeAgent::default();
        let output = "{\"type\":\"progress\"}\n{\"outcome\":\"needs_info\",\"questions\":[\"Which auth?\"]}";
        let result = agent.build_result(output, Some(0));
        assert_eq!(result.outcome, "needs_info");
    }
}
