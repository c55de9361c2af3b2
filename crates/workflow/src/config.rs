//! Layered JSON configuration (§6): built-in defaults, overridden by the
//! global `~/.orchestrator/config.json` (or `$ORCHESTRATOR_CONFIG_DIR`),
//! overridden by `<projectPath>/.orchestrator/config.json`. Grounded in the
//! resolution-chain idiom of `tftio-gator`'s `gator-cli::config` module, with
//! JSON substituted for TOML per the spec's literal `config.json` filename.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecksConfig {
    pub build: Option<String>,
    pub lint: Option<String>,
    pub test: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    pub branch_prefix: Option<String>,
    pub pr_draft: Option<bool>,
    pub pr_template: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

/// Recognized config keys (§6). Unknown keys are preserved via `extra` so a
/// read-modify-write cycle never drops forward-compatible additions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub default_pipeline: Option<String>,
    pub agent_timeout: Option<u64>,
    pub max_concurrent_agents: Option<u32>,
    pub default_branch: Option<String>,
    pub worktrees_path: Option<String>,
    pub default_agent_type: Option<String>,
    #[serde(default)]
    pub agents: std::collections::HashMap<String, AgentConfig>,
    #[serde(default)]
    pub auto_run: std::collections::HashMap<String, bool>,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub git: GitConfig,
    pub pull_main_after_merge: Option<bool>,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(flatten)]
    pub extra: Map<String, serde_json::Value>,
}

impl AppConfig {
    fn merge(mut self, override_layer: AppConfig) -> Self {
        macro_rules! overlay {
            ($field:ident) => {
                if override_layer.$field.is_some() {
                    self.$field = override_layer.$field;
                }
            };
        }
        overlay!(default_pipeline);
        overlay!(agent_timeout);
        overlay!(max_concurrent_agents);
        overlay!(default_branch);
        overlay!(worktrees_path);
        overlay!(default_agent_type);
        overlay!(pull_main_after_merge);

        self.agents.extend(override_layer.agents);
        self.auto_run.extend(override_layer.auto_run);
        if override_layer.checks.build.is_some() { self.checks.build = override_layer.checks.build; }
        if override_layer.checks.lint.is_some() { self.checks.lint = override_layer.checks.lint; }
        if override_layer.checks.test.is_some() { self.checks.test = override_layer.checks.test; }
        if override_layer.git.branch_prefix.is_some() { self.git.branch_prefix = override_layer.git.branch_prefix; }
        if override_layer.git.pr_draft.is_some() { self.git.pr_draft = override_layer.git.pr_draft; }
        if override_layer.git.pr_template.is_some() { self.git.pr_template = override_layer.git.pr_template; }
        if override_layer.telegram.bot_token.is_some() { self.telegram.bot_token = override_layer.telegram.bot_token; }
        if override_layer.telegram.chat_id.is_some() { self.telegram.chat_id = override_layer.telegram.chat_id; }
        self.extra.extend(override_layer.extra);
        self
    }

    pub fn worktrees_path_or_default(&self) -> &str {
        self.worktrees_path.as_deref().unwrap_or(".agent-worktrees")
    }

    pub fn default_agent_type_or(&self, default: &str) -> String {
        self.default_agent_type.clone().unwrap_or_else(|| default.to_string())
    }
}

/// `$ORCHESTRATOR_CONFIG_DIR`, else `~/.orchestrator`.
pub fn global_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ORCHESTRATOR_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".orchestrator")
}

fn read_layer(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(err) => Err(err.into()),
    }
}

/// Loads the three-layer config chain for `project_path`: built-in defaults
/// ← global `config.json` ← `<project_path>/.orchestrator/config.json`.
pub fn load_config(project_path: &Path) -> Result<AppConfig, ConfigError> {
    let global = read_layer(&global_config_dir().join("config.json"))?;
    let project = read_layer(&project_path.join(".orchestrator").join("config.json"))?;
    Ok(AppConfig::default().merge(global).merge(project))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_layer_overrides_global_layer() {
        let tmp = tempfile::TempDir::new().unwrap();
        let global_dir = tmp.path().join("global");
        let project_dir = tmp.path().join("project");
        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::create_dir_all(project_dir.join(".orchestrator")).unwrap();

        std::fs::write(
            global_dir.join("config.json"),
            r#"{"defaultAgentType": "claude", "agentTimeout": 600}"#,
        )
        .unwrap();
        std::fs::write(
            project_dir.join(".orchestrator").join("config.json"),
            r#"{"defaultAgentType": "codex"}"#,
        )
        .unwrap();

        unsafe { std::env::set_var("ORCHESTRATOR_CONFIG_DIR", &global_dir) };
        let config = load_config(&project_dir).unwrap();
        unsafe { std::env::remove_var("ORCHESTRATOR_CONFIG_DIR") };

        assert_eq!(config.default_agent_type.as_deref(), Some("codex"));
        assert_eq!(config.agent_timeout, Some(600));
    }

    #[test]
    fn missing_layers_fall_back_to_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        unsafe { std::env::set_var("ORCHESTRATOR_CONFIG_DIR", tmp.path().join("nonexistent")) };
        let config = load_config(&tmp.path().join("project-nonexistent")).unwrap();
        unsafe { std::env::remove_var("ORCHESTRATOR_CONFIG_DIR") };
        assert_eq!(config.worktrees_path_or_default(), ".agent-worktrees");
    }
}
