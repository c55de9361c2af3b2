use clap::Subcommand;
use db::models::pending_prompt::PendingPrompt;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::exit::{self, CliOutcome};
use workflow::AppServices;

#[derive(Subcommand)]
pub enum PromptsCommand {
    /// List prompts for a task (or every pending prompt if no task is given)
    List {
        #[arg(long)]
        task_id: Option<Uuid>,
    },
    /// Show a single prompt
    Get { id: Uuid },
    /// Answer a pending prompt with a JSON response payload
    Respond {
        id: Uuid,
        /// Response payload as a JSON literal, e.g. '{"answer":"yes"}'
        response: String,
    },
}

pub async fn run(command: PromptsCommand, services: &AppServices, pool: &SqlitePool) -> CliOutcome {
    match command {
        PromptsCommand::List { task_id } => {
            let result = match task_id {
                Some(task_id) => PendingPrompt::find_by_task(pool, task_id).await,
                None => PendingPrompt::find_all_pending(pool).await,
            };
            match result {
                Ok(prompts) => {
                    crate::print_json(&prompts);
                    CliOutcome::Success
                }
                Err(e) => CliOutcome::DatabaseError(e.to_string()),
            }
        }
        PromptsCommand::Get { id } => match PendingPrompt::find_by_id(pool, id).await {
            Ok(Some(prompt)) => {
                crate::print_json(&prompt);
                CliOutcome::Success
            }
            Ok(None) => CliOutcome::NotFound(format!("pending prompt {id} not found")),
            Err(e) => CliOutcome::DatabaseError(e.to_string()),
        },
        PromptsCommand::Respond { id, response } => {
            let response = match serde_json::from_str::<serde_json::Value>(&response) {
                Ok(v) => v,
                Err(e) => return CliOutcome::InvalidArgs(format!("response must be valid JSON: {e}")),
            };
            match services.workflow.respond_to_prompt(id, response).await {
                Ok(prompt) => {
                    crate::print_json(&prompt);
                    CliOutcome::Success
                }
                Err(e) => exit::from_workflow_error(e),
            }
        }
    }
}
