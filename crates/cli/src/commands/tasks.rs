use clap::Subcommand;
use db::models::task::{CreateTask, Task, TaskPriority, UpdateTask};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::exit::{self, CliOutcome};
use workflow::AppServices;

fn parse_priority(raw: &str) -> Result<TaskPriority, CliOutcome> {
    match raw {
        "low" => Ok(TaskPriority::Low),
        "medium" => Ok(TaskPriority::Medium),
        "high" => Ok(TaskPriority::High),
        "urgent" => Ok(TaskPriority::Urgent),
        other => Err(CliOutcome::InvalidArgs(format!(
            "invalid priority '{other}' (expected low, medium, high or urgent)"
        ))),
    }
}

#[derive(Subcommand)]
pub enum TasksCommand {
    /// List tasks in a project, optionally filtered by status
    List {
        #[arg(long)]
        project_id: Uuid,
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a single task
    Get { id: Uuid },
    /// Create a task under a project's pipeline
    Create {
        #[arg(long)]
        project_id: Uuid,
        #[arg(long)]
        pipeline_id: Uuid,
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        parent_task_id: Option<Uuid>,
        #[arg(long)]
        assignee: Option<String>,
    },
    /// Update a task's fields
    Update {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        clear_assignee: bool,
    },
    /// Delete a task
    Delete { id: Uuid },
    /// Manually transition a task to a declared status
    Transition {
        id: Uuid,
        to: String,
        #[arg(long)]
        actor: Option<String>,
    },
    /// List transitions available from the task's current status
    Transitions { id: Uuid },
    /// Merged, chronological timeline across every source table for a task
    History {
        id: Uuid,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

pub async fn run(command: TasksCommand, services: &AppServices, pool: &SqlitePool) -> CliOutcome {
    match command {
        TasksCommand::List { project_id, status } => {
            let result = match status {
                Some(status) => Task::find_by_status(pool, project_id, &status).await,
                None => Task::find_by_project(pool, project_id).await,
            };
            match result {
                Ok(tasks) => {
                    crate::print_json(&tasks);
                    CliOutcome::Success
                }
                Err(e) => CliOutcome::DatabaseError(e.to_string()),
            }
        }
        TasksCommand::Get { id } => match Task::find_by_id(pool, id).await {
            Ok(Some(task)) => {
                crate::print_json(&task);
                CliOutcome::Success
            }
            Ok(None) => CliOutcome::NotFound(format!("task {id} not found")),
            Err(e) => CliOutcome::DatabaseError(e.to_string()),
        },
        TasksCommand::Create { project_id, pipeline_id, title, description, priority, tags, parent_task_id, assignee } => {
            let priority = match parse_priority(&priority) {
                Ok(p) => p,
                Err(outcome) => return outcome,
            };
            match services
                .workflow
                .create_task(CreateTask { project_id, pipeline_id, title, description, priority, tags, parent_task_id, assignee })
                .await
            {
                Ok(task) => {
                    crate::print_json(&task);
                    CliOutcome::Success
                }
                Err(e) => exit::from_workflow_error(e),
            }
        }
        TasksCommand::Update { id, title, description, priority, tags, assignee, clear_assignee } => {
            let priority = match priority.map(|p| parse_priority(&p)).transpose() {
                Ok(p) => p,
                Err(outcome) => return outcome,
            };
            let assignee = if clear_assignee { Some(None) } else { assignee.map(Some) };
            let payload = UpdateTask {
                title,
                description: description.map(Some),
                priority,
                tags,
                assignee,
                pr_link: None,
                branch_name: None,
                metadata: None,
            };
            match services.workflow.update_task(id, payload).await {
                Ok(task) => {
                    crate::print_json(&task);
                    CliOutcome::Success
                }
                Err(e) => exit::from_workflow_error(e),
            }
        }
        TasksCommand::Delete { id } => match services.workflow.delete_task(id).await {
            Ok(()) => CliOutcome::Success,
            Err(e) => exit::from_workflow_error(e),
        },
        TasksCommand::Transition { id, to, actor } => match services.workflow.transition_task(id, to, actor).await {
            Ok(task) => {
                crate::print_json(&task);
                CliOutcome::Success
            }
            Err(e) => exit::from_workflow_error(e),
        },
        TasksCommand::Transitions { id } => match services.engine.get_valid_transitions(id).await {
            Ok(candidates) => {
                crate::print_json(&candidates);
                CliOutcome::Success
            }
            Err(e) => exit::from_engine_error(e),
        },
        TasksCommand::History { id, limit } => match workflow::timeline::timeline_for_task(pool, id, None, limit).await {
            Ok(entries) => {
                crate::print_json(&entries);
                CliOutcome::Success
            }
            Err(workflow::TimelineError::Database(e)) => CliOutcome::DatabaseError(e.to_string()),
        },
    }
}
