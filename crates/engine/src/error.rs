use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("task {0} not found")]
    TaskNotFound(Uuid),
    #[error("pipeline {0} not found")]
    PipelineNotFound(Uuid),
    #[error("no transition from status '{from}' satisfies trigger '{trigger}'")]
    NoMatchingTransition { from: String, trigger: String },
    #[error("transition from '{from}' to '{to}' blocked by guard '{guard}': {reason}")]
    GuardFailed { from: String, to: String, guard: String, reason: String },
    #[error("unknown guard '{0}'")]
    UnknownGuard(String),
    #[error("{port} port failed: {source}")]
    PortFailed { port: &'static str, source: String },
}
