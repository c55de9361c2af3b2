use std::path::PathBuf;

use clap::Subcommand;
use db::models::pipeline::{CreatePipeline, Pipeline, PipelineError};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::exit::CliOutcome;

#[derive(Subcommand)]
pub enum PipelinesCommand {
    /// List every pipeline definition
    List,
    /// Show a single pipeline
    Get { id: Uuid },
    /// Render the status graph as `from -> to (trigger)` lines
    Graph { id: Uuid },
    /// Write a pipeline as portable JSON (name, task_type, statuses, transitions)
    Export {
        id: Uuid,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Create a pipeline from a portable JSON file (same shape `export` writes)
    Import { file: PathBuf },
}

pub async fn run(command: PipelinesCommand, pool: &SqlitePool) -> CliOutcome {
    match command {
        PipelinesCommand::List => match Pipeline::find_all(pool).await {
            Ok(pipelines) => {
                crate::print_json(&pipelines);
                CliOutcome::Success
            }
            Err(e) => CliOutcome::DatabaseError(e.to_string()),
        },
        PipelinesCommand::Get { id } => match fetch(pool, id).await {
            Ok(pipeline) => {
                crate::print_json(&pipeline);
                CliOutcome::Success
            }
            Err(outcome) => outcome,
        },
        PipelinesCommand::Graph { id } => match fetch(pool, id).await {
            Ok(pipeline) => {
                for transition in &pipeline.transitions.0 {
                    let label = transition.label.as_deref().unwrap_or("");
                    println!(
                        "{} -> {} [{:?}{}] {}",
                        transition.from,
                        transition.to,
                        transition.trigger,
                        transition.agent_outcome.as_deref().map(|o| format!("={o}")).unwrap_or_default(),
                        label,
                    );
                }
                CliOutcome::Success
            }
            Err(outcome) => outcome,
        },
        PipelinesCommand::Export { id, output } => match fetch(pool, id).await {
            Ok(pipeline) => {
                // Same field names as `CreatePipeline` so `import` round-trips.
                let portable = serde_json::json!({
                    "name": pipeline.name,
                    "task_type": pipeline.task_type,
                    "statuses": pipeline.statuses.0,
                    "transitions": pipeline.transitions.0,
                });
                let text = serde_json::to_string_pretty(&portable).unwrap();
                match output {
                    Some(path) => match std::fs::write(&path, text) {
                        Ok(()) => CliOutcome::Success,
                        Err(e) => CliOutcome::DatabaseError(e.to_string()),
                    },
                    None => {
                        println!("{text}");
                        CliOutcome::Success
                    }
                }
            }
            Err(outcome) => outcome,
        },
        PipelinesCommand::Import { file } => {
            let contents = match std::fs::read_to_string(&file) {
                Ok(c) => c,
                Err(e) => return CliOutcome::InvalidArgs(format!("failed to read {}: {e}", file.display())),
            };
            let data: CreatePipeline = match serde_json::from_str(&contents) {
                Ok(d) => d,
                Err(e) => return CliOutcome::InvalidArgs(format!("invalid pipeline JSON: {e}")),
            };
            match Pipeline::create(pool, &data).await {
                Ok(pipeline) => {
                    crate::print_json(&pipeline);
                    CliOutcome::Success
                }
                Err(PipelineError::Validation(msg)) => CliOutcome::InvalidArgs(msg),
                Err(PipelineError::NotFound) => CliOutcome::DatabaseError("pipeline vanished after insert".into()),
                Err(PipelineError::Database(e)) => CliOutcome::DatabaseError(e.to_string()),
            }
        }
    }
}

async fn fetch(pool: &SqlitePool, id: Uuid) -> Result<Pipeline, CliOutcome> {
    Pipeline::find_by_id(pool, id)
        .await
        .map_err(|e| CliOutcome::DatabaseError(e.to_string()))?
        .ok_or_else(|| CliOutcome::NotFound(format!("pipeline {id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn export_then_import_round_trips_through_a_file() {
        let db = db::DBService::new_in_memory().await.unwrap();
        let seeded = Pipeline::create(&db.pool, &engine::seeds::simple()).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pipeline.json");

        let export = run(PipelinesCommand::Export { id: seeded.id, output: Some(out.clone()) }, &db.pool).await;
        assert!(matches!(export, CliOutcome::Success));

        let import = run(PipelinesCommand::Import { file: out }, &db.pool).await;
        assert!(matches!(import, CliOutcome::Success));

        let all = Pipeline::find_all(&db.pool).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].task_type, all[1].task_type);
    }

    #[tokio::test]
    async fn import_rejects_invalid_json() {
        let db = db::DBService::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "not json").unwrap();

        let outcome = run(PipelinesCommand::Import { file: bad }, &db.pool).await;
        assert!(matches!(outcome, CliOutcome::InvalidArgs(_)));
    }
}
