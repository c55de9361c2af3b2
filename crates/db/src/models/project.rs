use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Project not found")]
    NotFound,
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Recognized keys under `projects.config`. Unrecognized keys are preserved
/// by round-tripping through `serde_json::Value` rather than being dropped,
/// so forward-compatible config additions survive a read-modify-write cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub default_branch: Option<String>,
    pub worktrees_path: Option<String>,
    pub default_agent_type: Option<String>,
    pub pull_main_after_merge: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProjectConfig {
    pub fn worktrees_path_or_default(&self) -> &str {
        self.worktrees_path.as_deref().unwrap_or(".agent-worktrees")
    }

    pub fn default_branch_or(&self, default: &str) -> String {
        self.default_branch.clone().unwrap_or_else(|| default.to_string())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    #[sqlx(json)]
    pub config: Json<ProjectConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    #[serde(default)]
    pub config: ProjectConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<ProjectConfig>,
}

impl Project {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM projects ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_path(pool: &SqlitePool, path: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM projects WHERE path = ?")
            .bind(path)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateProject) -> Result<Self, ProjectError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let config_json = serde_json::to_string(&data.config)
            .map_err(|e| ProjectError::Validation(e.to_string()))?;
        sqlx::query(
            "INSERT INTO projects (id, name, path, description, config, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.path)
        .bind(&data.description)
        .bind(config_json)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(ProjectError::NotFound)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        payload: &UpdateProject,
    ) -> Result<Self, ProjectError> {
        let existing = Self::find_by_id(pool, id).await?.ok_or(ProjectError::NotFound)?;

        let name = payload.name.clone().unwrap_or(existing.name);
        let description = payload.description.clone().or(existing.description);
        let config = payload.config.clone().unwrap_or(existing.config.0);
        let config_json =
            serde_json::to_string(&config).map_err(|e| ProjectError::Validation(e.to_string()))?;
        let now = Utc::now();

        sqlx::query(
            "UPDATE projects SET name = ?, description = ?, config = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&name)
        .bind(&description)
        .bind(config_json)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(ProjectError::NotFound)
    }

    /// Deletes the project. Cascades to tasks (and transitively their
    /// dependents) via `ON DELETE CASCADE` foreign keys established in the
    /// schema migration.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_project() {
        let db = crate::DBService::new_in_memory().await.unwrap();
        let project = Project::create(
            &db.pool,
            &CreateProject {
                name: "demo".into(),
                path: "/tmp/demo".into(),
                description: None,
                config: ProjectConfig::default(),
            },
        )
        .await
        .unwrap();

        let found = Project::find_by_id(&db.pool, project.id).await.unwrap();
        assert_eq!(found.unwrap().name, "demo");
    }

    #[tokio::test]
    async fn path_is_unique() {
        let db = crate::DBService::new_in_memory().await.unwrap();
        let data = CreateProject {
            name: "demo".into(),
            path: "/tmp/demo".into(),
            description: None,
            config: ProjectConfig::default(),
        };
        Project::create(&db.pool, &data).await.unwrap();
        let second = Project::create(&db.pool, &data).await;
        assert!(second.is_err());
    }
}
