use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Engine(#[from] engine::EngineError),
    #[error(transparent)]
    Task(#[from] db::models::task::TaskError),
    #[error("agent run {0} not found")]
    RunNotFound(Uuid),
    #[error("agent type '{0}' is not registered")]
    UnknownAgentType(String),
    #[error("agent '{0}' is not available on this host")]
    Unavailable(String),
    #[error("agent run {0} timed out after {1:?}")]
    TimedOut(Uuid, std::time::Duration),
    #[error("failed to spawn agent process: {0}")]
    Spawn(#[from] std::io::Error),
}
