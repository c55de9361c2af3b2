use std::{sync::Arc, time::Duration};

use agents::{AgentService, ClaudeCodeAgent, PrReviewerAgent};
use db::DBService;
use engine::PipelineEngine;
use gitops::GitHubScm;

use crate::{
    agent_launcher::WorkflowAgentLauncher, config::AppConfig, notify::TracingNotifier,
    prompts::DbPromptSink, service::WorkflowService,
};

/// Everything a CLI/service entry point needs, wired together the way
/// §9's `createAppServices(db)` names it: the engine owns guard/hook
/// registries, the agent service owns run lifecycle, and the workflow
/// service is a thin facade over both plus the SCM port.
pub struct AppServices {
    pub engine: Arc<PipelineEngine>,
    pub agents: Arc<AgentService>,
    pub scm: Arc<GitHubScm>,
    pub workflow: Arc<WorkflowService>,
}

/// Resolves the cyclic dependency between `engine` (which dispatches
/// hooks through ports) and `agents`/`gitops`/`workflow` (which implement
/// those ports and call back into the engine) via constructor injection:
/// the engine is built first, `agents` is built holding a clone of it, and
/// only then are the engine's builtin hooks registered with adapters that
/// close back over both.
pub async fn create_app_services(db: DBService, config: &AppConfig) -> AppServices {
    let engine = Arc::new(PipelineEngine::new(db.pool.clone()));
    engine.register_builtin_guards().await;

    let mut agent_service = AgentService::new(db.pool.clone(), engine.clone());
    agent_service.register_agent(Arc::new(ClaudeCodeAgent::new(
        "claude",
        config.agents.get("claude-code").and_then(|c| c.model.clone()),
        Duration::from_secs(config.agents.get("claude-code").and_then(|c| c.timeout).unwrap_or(30 * 60)),
    )));
    agent_service.register_agent(Arc::new(PrReviewerAgent {
        binary: "claude".into(),
        timeout: Duration::from_secs(config.agents.get("pr-reviewer").and_then(|c| c.timeout).unwrap_or(15 * 60)),
    }));
    let agent_service = Arc::new(agent_service);

    let scm = Arc::new(GitHubScm::new(db.pool.clone()));
    let launcher = Arc::new(WorkflowAgentLauncher::new(db.pool.clone(), agent_service.clone()));
    let notifier = Arc::new(TracingNotifier);
    let prompt_sink = Arc::new(DbPromptSink::new(db.pool.clone()));

    engine
        .register_builtin_hooks(launcher, scm.clone(), notifier, prompt_sink)
        .await;

    let workflow = Arc::new(WorkflowService::new(db.pool.clone(), engine.clone(), agent_service.clone(), scm.clone()));

    AppServices { engine, agents: agent_service, scm, workflow }
}
