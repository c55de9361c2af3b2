use async_trait::async_trait;
use db::models::{pipeline::Pipeline, task::Task};
use sqlx::SqlitePool;

use crate::error::EngineError;

pub struct GuardContext<'a> {
    pub pool: &'a SqlitePool,
    pub task: &'a Task,
    pub pipeline: &'a Pipeline,
}

#[derive(Debug, Clone)]
pub struct GuardOutcome {
    pub passed: bool,
    pub reason: Option<String>,
}

impl GuardOutcome {
    pub fn pass() -> Self {
        Self { passed: true, reason: None }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self { passed: false, reason: Some(reason.into()) }
    }
}

/// A named precondition a transition can require before it's allowed to
/// commit. Implementations read task/pipeline state (and may query the DB)
/// but never mutate it — mutation belongs to hooks.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn check(
        &self,
        ctx: &GuardContext<'_>,
        params: &serde_json::Value,
    ) -> Result<GuardOutcome, EngineError>;
}
