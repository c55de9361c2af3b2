use async_trait::async_trait;
use db::models::{pipeline::Pipeline, task::Task};
use sqlx::SqlitePool;

use crate::error::EngineError;

pub struct HookContext<'a> {
    pub pool: &'a SqlitePool,
    pub task: &'a Task,
    pub pipeline: &'a Pipeline,
    pub from_status: &'a str,
    pub to_status: &'a str,
}

/// A named side effect run after a transition has committed. Hooks never
/// block the commit itself (that's a guard's job) — their failure is handled
/// per the transition's declared [`db::models::pipeline::HookPolicy`].
#[async_trait]
pub trait Hook: Send + Sync {
    async fn run(&self, ctx: &HookContext<'_>, params: &serde_json::Value) -> Result<(), EngineError>;
}
