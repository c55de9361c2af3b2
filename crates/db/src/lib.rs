use std::{env, path::Path, sync::Arc};

use sqlx::{
    Error, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions},
};

pub mod models;
pub mod serde_helpers;

/// Default filename of the orchestrator's embedded database. Callers resolve
/// this against a project or config directory before passing a full path to
/// [`DBService::new`].
pub const DEFAULT_DB_FILENAME: &str = "orchestrator.sqlite3";

#[derive(Clone)]
pub struct DBService {
    pub pool: SqlitePool,
}

impl DBService {
    /// Open (creating if necessary) the embedded database at `path` and run
    /// migrations. Honors `DATABASE_URL` when set (primarily for tests),
    /// otherwise connects to the given file path with WAL journaling and
    /// foreign keys enabled.
    pub async fn new(path: &Path) -> Result<DBService, Error> {
        let pool = Self::create_pool(path, None).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(DBService { pool })
    }

    /// In-memory database, used by tests. Each call gets an isolated DB.
    pub async fn new_in_memory() -> Result<DBService, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .after_connect(|conn, _meta| Box::pin(apply_pragmas(conn)))
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(DBService { pool })
    }

    pub async fn new_with_after_connect<F>(
        path: &Path,
        after_connect: F,
    ) -> Result<DBService, Error>
    where
        F: for<'a> Fn(
                &'a mut SqliteConnection,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = Result<(), Error>> + Send + 'a>,
            > + Send
            + Sync
            + 'static,
    {
        let pool = Self::create_pool(path, Some(Arc::new(after_connect))).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(DBService { pool })
    }

    async fn create_pool<F>(
        path: &Path,
        after_connect: Option<Arc<F>>,
    ) -> Result<SqlitePool, Error>
    where
        F: for<'a> Fn(
                &'a mut SqliteConnection,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = Result<(), Error>> + Send + 'a>,
            > + Send
            + Sync
            + 'static,
    {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}?mode=rwc", path.to_string_lossy()));

        let connect_options: SqliteConnectOptions = database_url.parse()?;

        let pool = if let Some(hook) = after_connect {
            SqlitePoolOptions::new()
                .after_connect(move |conn, _meta| {
                    let hook = hook.clone();
                    Box::pin(async move {
                        apply_pragmas(conn).await?;
                        hook(conn).await?;
                        Ok(())
                    })
                })
                .connect_with(connect_options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .after_connect(|conn, _meta| Box::pin(apply_pragmas(conn)))
                .connect_with(connect_options)
                .await?
        };

        Ok(pool)
    }
}

/// WAL journaling and foreign-key enforcement are not SQLite's defaults; the
/// data-model invariants in this crate (cascading deletes, concurrent
/// readers alongside a single writer) depend on both being set on every
/// pooled connection.
async fn apply_pragmas(conn: &mut SqliteConnection) -> Result<(), Error> {
    sqlx::query("PRAGMA journal_mode = WAL;")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&mut *conn)
        .await?;
    Ok(())
}
