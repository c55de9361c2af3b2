use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Engine(#[from] engine::EngineError),
    #[error(transparent)]
    Agent(#[from] agents::AgentError),
    #[error(transparent)]
    Worktree(#[from] gitops::WorktreeError),
    #[error("task {0} not found")]
    TaskNotFound(Uuid),
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),
    #[error("no artifact of type '{0}' recorded for task")]
    NoArtifact(String),
    #[error("pending prompt {0} not found")]
    PromptNotFound(Uuid),
}

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to parse config at {path}: {source}")]
    Parse { path: String, source: serde_json::Error },
}
