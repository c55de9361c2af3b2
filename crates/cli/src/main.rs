mod commands;
mod exit;

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use db::DBService;

use commands::{agent, events, pipelines, projects, prompts, status, tasks};
use exit::CliOutcome;

#[derive(Parser)]
#[command(name = "orchestrator", about = "AI coding agent task orchestrator")]
struct Cli {
    /// Project directory the `.orchestrator/config.json` layer and worktrees
    /// are resolved against. Defaults to the current directory.
    #[arg(long, global = true)]
    project_path: Option<PathBuf>,

    /// Path to the embedded database file. Defaults to
    /// `$ORCHESTRATOR_CONFIG_DIR/orchestrator.sqlite3` (`~/.orchestrator` if unset).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project management
    Projects {
        #[command(subcommand)]
        command: projects::ProjectsCommand,
    },
    /// Task management
    Tasks {
        #[command(subcommand)]
        command: tasks::TasksCommand,
    },
    /// Coding agent runs
    Agent {
        #[command(subcommand)]
        command: agent::AgentCommand,
    },
    /// Pending prompts raised by agents
    Prompts {
        #[command(subcommand)]
        command: prompts::PromptsCommand,
    },
    /// Task event log
    Events {
        #[command(subcommand)]
        command: events::EventsCommand,
    },
    /// Pipeline definitions
    Pipelines {
        #[command(subcommand)]
        command: pipelines::PipelinesCommand,
    },
    /// Dashboard-style summary across all projects
    Status,
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("error: failed to serialize output: {e}"),
    }
}

fn resolve_db_path(cli_db: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = cli_db {
        return path.clone();
    }
    if let Ok(path) = std::env::var("ORCHESTRATOR_DB_PATH") {
        return PathBuf::from(path);
    }
    workflow::config::global_config_dir().join(db::DEFAULT_DB_FILENAME)
}

/// Inserts the four builtin pipelines (§6) if the database has none yet —
/// the same first-run bootstrap the teacher's container performs on boot.
async fn seed_pipelines_if_empty(pool: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    if db::models::pipeline::Pipeline::find_all(pool).await?.is_empty() {
        for seed in engine::seeds::all() {
            let _ = db::models::pipeline::Pipeline::create(pool, &seed).await;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let project_path = cli.project_path.clone().unwrap_or_else(|| PathBuf::from("."));

    let db_path = resolve_db_path(cli.db.as_ref());
    if let Some(parent) = db_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let db = match DBService::new(&db_path).await {
        Ok(db) => db,
        Err(e) => return CliOutcome::DatabaseError(e.to_string()).into_exit_code(),
    };
    if let Err(e) = seed_pipelines_if_empty(&db.pool).await {
        return CliOutcome::DatabaseError(e.to_string()).into_exit_code();
    }

    let config = match workflow::config::load_config(&project_path) {
        Ok(c) => c,
        Err(e) => return CliOutcome::InvalidArgs(e.to_string()).into_exit_code(),
    };

    let services = workflow::create_app_services(db.clone(), &config).await;

    let outcome = match cli.command {
        Commands::Projects { command } => projects::run(command, &db.pool).await,
        Commands::Tasks { command } => tasks::run(command, &services, &db.pool).await,
        Commands::Agent { command } => agent::run(command, &services, &db.pool).await,
        Commands::Prompts { command } => prompts::run(command, &services, &db.pool).await,
        Commands::Events { command } => events::run(command, &db.pool).await,
        Commands::Pipelines { command } => pipelines::run(command, &db.pool).await,
        Commands::Status => status::run(&services).await,
    };

    outcome.into_exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clap_parses_nested_task_transition() {
        let cli = Cli::try_parse_from(["orchestrator", "tasks", "transition", "00000000-0000-0000-0000-000000000001", "in_review", "--actor", "alice"]).unwrap();
        match cli.command {
            Commands::Tasks { command: tasks::TasksCommand::Transition { to, actor, .. } } => {
                assert_eq!(to, "in_review");
                assert_eq!(actor.as_deref(), Some("alice"));
            }
            _ => panic!("expected a tasks transition command"),
        }
    }

    #[test]
    fn db_path_precedence_prefers_explicit_flag_over_env() {
        let explicit = PathBuf::from("/tmp/explicit.sqlite3");
        assert_eq!(resolve_db_path(Some(&explicit)), explicit);
    }
}
