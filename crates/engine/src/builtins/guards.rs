use async_trait::async_trait;
use db::models::{agent_run::AgentRun, task_dependency::TaskDependency, transition_history::TransitionHistory};

use crate::{
    error::EngineError,
    guard::{Guard, GuardContext, GuardOutcome},
};

/// Passes once the task has a linked pull request.
pub struct HasPr;

#[async_trait]
impl Guard for HasPr {
    async fn check(&self, ctx: &GuardContext<'_>, _params: &serde_json::Value) -> Result<GuardOutcome, EngineError> {
        if ctx.task.pr_link.is_some() {
            Ok(GuardOutcome::pass())
        } else {
            Ok(GuardOutcome::fail("task has no linked pull request"))
        }
    }
}

/// Passes once every task this task depends on has reached a final status.
pub struct DependenciesResolved;

#[async_trait]
impl Guard for DependenciesResolved {
    async fn check(&self, ctx: &GuardContext<'_>, _params: &serde_json::Value) -> Result<GuardOutcome, EngineError> {
        let resolved = TaskDependency::all_resolved(ctx.pool, ctx.task.id).await?;
        if resolved {
            Ok(GuardOutcome::pass())
        } else {
            Ok(GuardOutcome::fail("one or more dependencies have not reached a final status"))
        }
    }
}

/// Passes as long as no agent run is currently `running` for the task.
pub struct NoRunningAgent;

#[async_trait]
impl Guard for NoRunningAgent {
    async fn check(&self, ctx: &GuardContext<'_>, _params: &serde_json::Value) -> Result<GuardOutcome, EngineError> {
        let running = AgentRun::find_running_for_task(ctx.pool, ctx.task.id).await?;
        if running.is_empty() {
            Ok(GuardOutcome::pass())
        } else {
            Ok(GuardOutcome::fail("an agent run is already in progress"))
        }
    }
}

/// Passes as long as the task hasn't already spent `max` total attempts on
/// its current status. `max` counts the original attempt plus retries: with
/// `max=3`, two self-transitions (two retries) are allowed and the third is
/// blocked, since allowing it would start a fourth attempt. `max` is read
/// from `params.max` (defaults to 3).
pub struct MaxRetries;

#[async_trait]
impl Guard for MaxRetries {
    async fn check(&self, ctx: &GuardContext<'_>, params: &serde_json::Value) -> Result<GuardOutcome, EngineError> {
        let max = params.get("max").and_then(|v| v.as_i64()).unwrap_or(3);
        let count = TransitionHistory::count_consecutive_self_transitions(ctx.pool, ctx.task.id, &ctx.task.status).await?;
        if count + 1 < max {
            Ok(GuardOutcome::pass())
        } else {
            Ok(GuardOutcome::fail(format!("task has reached its retry limit of {max}")))
        }
    }
}
