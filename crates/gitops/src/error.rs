use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitOpsError {
    #[error("`git` executable not found or not runnable")]
    GitNotAvailable,
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ScmError {
    #[error("`gh` executable not found or not runnable")]
    NotAvailable,
    #[error("GitHub CLI command failed: {0}")]
    CommandFailed(String),
    #[error("GitHub CLI authentication failed: {0}")]
    AuthFailed(String),
    #[error("GitHub CLI returned unexpected output: {0}")]
    UnexpectedOutput(String),
}

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error(transparent)]
    Git(#[from] GitOpsError),
    #[error("worktree for branch '{0}' not found")]
    NotFound(String),
    #[error("worktree for branch '{0}' is locked")]
    Locked(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
