use clap::Subcommand;
use db::models::project::{CreateProject, Project, ProjectConfig, ProjectError, UpdateProject};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::exit::CliOutcome;

#[derive(Subcommand)]
pub enum ProjectsCommand {
    /// List all projects
    List,
    /// Show a single project
    Get { id: Uuid },
    /// Register a new project
    Create {
        name: String,
        path: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Update a project's name or description
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove a project and its tasks
    Delete { id: Uuid },
}

pub async fn run(command: ProjectsCommand, pool: &SqlitePool) -> CliOutcome {
    match command {
        ProjectsCommand::List => match Project::find_all(pool).await {
            Ok(projects) => {
                crate::print_json(&projects);
                CliOutcome::Success
            }
            Err(e) => CliOutcome::DatabaseError(e.to_string()),
        },
        ProjectsCommand::Get { id } => match Project::find_by_id(pool, id).await {
            Ok(Some(project)) => {
                crate::print_json(&project);
                CliOutcome::Success
            }
            Ok(None) => CliOutcome::NotFound(format!("project {id} not found")),
            Err(e) => CliOutcome::DatabaseError(e.to_string()),
        },
        ProjectsCommand::Create { name, path, description } => {
            match Project::create(pool, &CreateProject { name, path, description, config: ProjectConfig::default() }).await {
                Ok(project) => {
                    crate::print_json(&project);
                    CliOutcome::Success
                }
                Err(ProjectError::Validation(msg)) => CliOutcome::InvalidArgs(msg),
                Err(ProjectError::NotFound) => CliOutcome::DatabaseError("project vanished after insert".into()),
                Err(ProjectError::Database(e)) => CliOutcome::DatabaseError(e.to_string()),
            }
        }
        ProjectsCommand::Update { id, name, description } => {
            match Project::update(pool, id, &UpdateProject { name, description, config: None }).await {
                Ok(project) => {
                    crate::print_json(&project);
                    CliOutcome::Success
                }
                Err(ProjectError::NotFound) => CliOutcome::NotFound(format!("project {id} not found")),
                Err(ProjectError::Validation(msg)) => CliOutcome::InvalidArgs(msg),
                Err(ProjectError::Database(e)) => CliOutcome::DatabaseError(e.to_string()),
            }
        }
        ProjectsCommand::Delete { id } => match Project::delete(pool, id).await {
            Ok(0) => CliOutcome::NotFound(format!("project {id} not found")),
            Ok(_) => CliOutcome::Success,
            Err(e) => CliOutcome::DatabaseError(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome_is_success(outcome: &CliOutcome) -> bool {
        matches!(outcome, CliOutcome::Success)
    }

    #[tokio::test]
    async fn create_get_update_delete_round_trip() {
        let db = db::DBService::new_in_memory().await.unwrap();

        let create = run(
            ProjectsCommand::Create { name: "demo".into(), path: "/tmp/demo".into(), description: None },
            &db.pool,
        )
        .await;
        assert!(outcome_is_success(&create));

        let project = Project::find_all(&db.pool).await.unwrap().pop().unwrap();

        let get = run(ProjectsCommand::Get { id: project.id }, &db.pool).await;
        assert!(outcome_is_success(&get));

        let update = run(
            ProjectsCommand::Update { id: project.id, name: None, description: Some("updated".into()) },
            &db.pool,
        )
        .await;
        assert!(outcome_is_success(&update));

        let delete = run(ProjectsCommand::Delete { id: project.id }, &db.pool).await;
        assert!(outcome_is_success(&delete));

        let missing = run(ProjectsCommand::Get { id: project.id }, &db.pool).await;
        assert!(matches!(missing, CliOutcome::NotFound(_)));
    }

    #[tokio::test]
    async fn get_unknown_project_is_not_found() {
        let db = db::DBService::new_in_memory().await.unwrap();
        let outcome = run(ProjectsCommand::Get { id: Uuid::new_v4() }, &db.pool).await;
        assert!(matches!(outcome, CliOutcome::NotFound(_)));
    }
}
