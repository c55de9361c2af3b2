use std::time::Duration;

use clap::Subcommand;
use db::models::agent_run::AgentRun;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::exit::{self, CliOutcome};
use workflow::AppServices;

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Start a coding agent run against a task
    Start {
        task_id: Uuid,
        agent_type: String,
        #[arg(long, default_value = "run")]
        mode: String,
    },
    /// Cancel a running agent run
    Stop { run_id: Uuid },
    /// List every run recorded for a task
    Runs { task_id: Uuid },
    /// Show a single agent run
    Get { run_id: Uuid },
    /// Poll a run until it reaches a terminal status
    Watch {
        run_id: Uuid,
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
    },
    /// Show token usage recorded for a run
    Cost { run_id: Uuid },
}

pub async fn run(command: AgentCommand, services: &AppServices, pool: &SqlitePool) -> CliOutcome {
    match command {
        AgentCommand::Start { task_id, agent_type, mode } => {
            match services.workflow.start_agent(task_id, &agent_type, &mode).await {
                Ok(run_id) => {
                    crate::print_json(&serde_json::json!({ "run_id": run_id }));
                    CliOutcome::Success
                }
                Err(e) => exit::from_workflow_error(e),
            }
        }
        AgentCommand::Stop { run_id } => match services.workflow.stop_agent(run_id).await {
            Ok(()) => CliOutcome::Success,
            Err(e) => exit::from_workflow_error(e),
        },
        AgentCommand::Runs { task_id } => match AgentRun::find_by_task(pool, task_id).await {
            Ok(runs) => {
                crate::print_json(&runs);
                CliOutcome::Success
            }
            Err(e) => CliOutcome::DatabaseError(e.to_string()),
        },
        AgentCommand::Get { run_id } => match fetch_run(pool, run_id).await {
            Ok(run) => {
                crate::print_json(&run);
                CliOutcome::Success
            }
            Err(outcome) => outcome,
        },
        AgentCommand::Watch { run_id, interval_secs } => watch(pool, run_id, interval_secs).await,
        AgentCommand::Cost { run_id } => match fetch_run(pool, run_id).await {
            Ok(run) => {
                crate::print_json(&serde_json::json!({
                    "run_id": run.id,
                    "input_tokens": run.cost_input_tokens,
                    "output_tokens": run.cost_output_tokens,
                }));
                CliOutcome::Success
            }
            Err(outcome) => outcome,
        },
    }
}

async fn fetch_run(pool: &SqlitePool, run_id: Uuid) -> Result<AgentRun, CliOutcome> {
    AgentRun::find_by_id(pool, run_id)
        .await
        .map_err(|e| CliOutcome::DatabaseError(e.to_string()))?
        .ok_or_else(|| CliOutcome::NotFound(format!("agent run {run_id} not found")))
}

/// Polls the run's status at `interval_secs` until it leaves `running`,
/// printing each observed status change. There is no push channel between
/// the agent service's completion task and the CLI process, so polling the
/// row is the same mechanism the teacher's frontend uses against its API.
async fn watch(pool: &SqlitePool, run_id: Uuid, interval_secs: u64) -> CliOutcome {
    let mut last_status = String::new();
    loop {
        let run = match fetch_run(pool, run_id).await {
            Ok(run) => run,
            Err(outcome) => return outcome,
        };
        if run.status != last_status {
            eprintln!("run {run_id}: {}", run.status);
            last_status = run.status.clone();
        }
        if run.status != "running" {
            crate::print_json(&run);
            return CliOutcome::Success;
        }
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
    }
}
