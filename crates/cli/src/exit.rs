//! Exit-code mapping per the CLI surface's literal contract: `0` success,
//! `2` invalid args, `3` not found, `4` guard/validation blocked, `5` DB
//! error. `clap` itself already exits `2` on a malformed invocation before
//! any of this runs.

use std::process::ExitCode;

pub enum CliOutcome {
    Success,
    NotFound(String),
    Blocked(String),
    DatabaseError(String),
    InvalidArgs(String),
}

impl CliOutcome {
    pub fn into_exit_code(self) -> ExitCode {
        match self {
            CliOutcome::Success => ExitCode::from(0),
            CliOutcome::InvalidArgs(msg) => {
                eprintln!("error: {msg}");
                ExitCode::from(2)
            }
            CliOutcome::NotFound(msg) => {
                eprintln!("error: {msg}");
                ExitCode::from(3)
            }
            CliOutcome::Blocked(msg) => {
                eprintln!("error: {msg}");
                ExitCode::from(4)
            }
            CliOutcome::DatabaseError(msg) => {
                eprintln!("error: {msg}");
                ExitCode::from(5)
            }
        }
    }
}

pub fn from_workflow_error(err: workflow::WorkflowError) -> CliOutcome {
    use workflow::WorkflowError;
    match err {
        WorkflowError::TaskNotFound(id) => CliOutcome::NotFound(format!("task {id} not found")),
        WorkflowError::ProjectNotFound(id) => CliOutcome::NotFound(format!("project {id} not found")),
        WorkflowError::PromptNotFound(id) => CliOutcome::NotFound(format!("pending prompt {id} not found")),
        WorkflowError::NoArtifact(ty) => CliOutcome::InvalidArgs(format!("no artifact of type '{ty}' recorded for task")),
        WorkflowError::Engine(e) => from_engine_error(e),
        WorkflowError::Agent(e) => CliOutcome::DatabaseError(e.to_string()),
        WorkflowError::Worktree(e) => CliOutcome::DatabaseError(e.to_string()),
        WorkflowError::Database(e) => CliOutcome::DatabaseError(e.to_string()),
    }
}

pub fn from_engine_error(err: engine::EngineError) -> CliOutcome {
    use engine::EngineError;
    match err {
        EngineError::TaskNotFound(id) => CliOutcome::NotFound(format!("task {id} not found")),
        EngineError::PipelineNotFound(id) => CliOutcome::NotFound(format!("pipeline {id} not found")),
        EngineError::NoMatchingTransition { from, trigger } => {
            CliOutcome::Blocked(format!("no transition from '{from}' satisfies trigger '{trigger}'"))
        }
        EngineError::GuardFailed { from, to, guard, reason } => {
            CliOutcome::Blocked(format!("transition {from} -> {to} blocked by guard '{guard}': {reason}"))
        }
        EngineError::UnknownGuard(name) => CliOutcome::Blocked(format!("unknown guard '{name}'")),
        EngineError::PortFailed { port, source } => CliOutcome::DatabaseError(format!("{port} port failed: {source}")),
        EngineError::Database(e) => CliOutcome::DatabaseError(e.to_string()),
    }
}
