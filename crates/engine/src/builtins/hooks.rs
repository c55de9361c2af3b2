use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::EngineError,
    hook::{Hook, HookContext},
    ports::{AgentLauncher, Notifier, PromptSink, ScmOps},
};

pub struct StartAgent {
    pub launcher: Arc<dyn AgentLauncher>,
}

#[async_trait]
impl Hook for StartAgent {
    async fn run(&self, ctx: &HookContext<'_>, params: &serde_json::Value) -> Result<(), EngineError> {
        let agent_type = params
            .get("agentType")
            .and_then(|v| v.as_str())
            .unwrap_or("default");
        let mode = params.get("mode").and_then(|v| v.as_str()).unwrap_or("run");
        self.launcher.start(ctx.task, agent_type, mode).await?;
        Ok(())
    }
}

pub struct PushAndCreatePr {
    pub scm: Arc<dyn ScmOps>,
}

#[async_trait]
impl Hook for PushAndCreatePr {
    async fn run(&self, ctx: &HookContext<'_>, _params: &serde_json::Value) -> Result<(), EngineError> {
        self.scm.push_and_create_pr(ctx.task).await?;
        Ok(())
    }
}

pub struct MergePr {
    pub scm: Arc<dyn ScmOps>,
}

#[async_trait]
impl Hook for MergePr {
    async fn run(&self, ctx: &HookContext<'_>, _params: &serde_json::Value) -> Result<(), EngineError> {
        self.scm.merge_pr(ctx.task).await?;
        Ok(())
    }
}

pub struct NotifyHook {
    pub notifier: Arc<dyn Notifier>,
}

#[async_trait]
impl Hook for NotifyHook {
    async fn run(&self, ctx: &HookContext<'_>, params: &serde_json::Value) -> Result<(), EngineError> {
        let message = params
            .get("message")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{} moved {} -> {}", ctx.task.title, ctx.from_status, ctx.to_status));
        self.notifier.notify(ctx.task, &message).await
    }
}

pub struct CreatePromptHook {
    pub sink: Arc<dyn PromptSink>,
}

#[async_trait]
impl Hook for CreatePromptHook {
    async fn run(&self, ctx: &HookContext<'_>, params: &serde_json::Value) -> Result<(), EngineError> {
        let prompt_type = params
            .get("promptType")
            .and_then(|v| v.as_str())
            .unwrap_or("generic");
        let resume_outcome = params
            .get("resumeOutcome")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        self.sink.create_prompt(ctx.task, prompt_type, params.clone(), resume_outcome).await?;
        Ok(())
    }
}
