use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
};

use async_trait::async_trait;
use db::models::{
    project::Project,
    task::Task,
    task_artifact::{TaskArtifact, TaskArtifactType},
    task_event::{TaskEvent, TaskEventCategory, TaskEventSeverity},
};
use engine::{error::EngineError, ports::ScmOps};
use sqlx::SqlitePool;

use crate::{error::ScmError, git_ops::GitOps, shell::resolve_executable_path_blocking};

const PORT: &str = "scm";

/// Thin wrapper around the GitHub CLI (`gh`), mirroring the ergonomics of
/// [`crate::git_ops::GitOps`]: every call shells out rather than linking a
/// REST client, and relies on `gh` inferring the owner/repo from the
/// worktree's git remote rather than threading repo coordinates through
/// every call site.
#[derive(Debug, Clone, Default)]
struct GhCli;

impl GhCli {
    fn ensure_available(&self) -> Result<(), ScmError> {
        resolve_executable_path_blocking("gh").ok_or(ScmError::NotAvailable)?;
        Ok(())
    }

    fn run<I, S>(&self, repo_dir: &Path, args: I) -> Result<String, ScmError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.ensure_available()?;
        let gh = resolve_executable_path_blocking("gh").ok_or(ScmError::NotAvailable)?;
        let output = Command::new(gh)
            .current_dir(repo_dir)
            .args(args)
            .output()
            .map_err(|err| ScmError::CommandFailed(err.to_string()))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        // gh uses exit code 4 for auth failures; older versions only surface
        // it as text, so fall back to matching common phrasing.
        if output.status.code() == Some(4) {
            return Err(ScmError::AuthFailed(stderr));
        }
        let lower = stderr.to_ascii_lowercase();
        if lower.contains("authentication failed")
            || lower.contains("must authenticate")
            || lower.contains("gh auth login")
        {
            return Err(ScmError::AuthFailed(stderr));
        }
        Err(ScmError::CommandFailed(stderr))
    }

    fn create_pr(&self, repo_dir: &Path, head: &str, base: &str, title: &str, body: &str) -> Result<String, ScmError> {
        let raw = self.run(
            repo_dir,
            ["pr", "create", "--head", head, "--base", base, "--title", title, "--body", body],
        )?;
        raw.lines()
            .rev()
            .flat_map(|line| line.split_whitespace())
            .find(|token| token.starts_with("http") && token.contains("/pull/"))
            .map(|url| url.trim_end_matches(['.', ',', ';']).to_string())
            .ok_or_else(|| ScmError::UnexpectedOutput(format!("gh pr create did not return a URL; raw output: {raw}")))
    }

    /// The worktree is removed by the caller before this runs (§4.7), so
    /// `--delete-branch` is safe to pass unconditionally — there is no
    /// checkout left pinning the branch.
    fn merge_pr(&self, repo_dir: &Path, head: &str) -> Result<(), ScmError> {
        self.run(repo_dir, ["pr", "merge", head, "--merge", "--delete-branch"]).map(|_| ())
    }
}

/// Implements [`engine::ports::ScmOps`] on top of the GitHub CLI. Looks up
/// the owning project's working directory per call since the port trait
/// only carries the `Task`, not a resolved filesystem path.
pub struct GitHubScm {
    pool: SqlitePool,
    gh: GhCli,
}

impl GitHubScm {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, gh: GhCli::default() }
    }

    async fn project(&self, task: &Task) -> Result<Project, EngineError> {
        Project::find_by_id(&self.pool, task.project_id)
            .await
            .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?
            .ok_or(EngineError::TaskNotFound(task.id))
    }

    async fn project_path(&self, task: &Task) -> Result<String, EngineError> {
        self.project(task).await.map(|p| p.path)
    }

    /// Records a `task_events` row without ever failing the caller on the
    /// logging write itself — a logging failure here would otherwise mask
    /// whatever git/gh outcome the caller is trying to report.
    async fn log(&self, task_id: uuid::Uuid, category: TaskEventCategory, severity: TaskEventSeverity, message: &str) {
        if let Err(err) = TaskEvent::record(&self.pool, task_id, category, severity, message, None).await {
            tracing::warn!(task_id = %task_id, error = %err, "failed to record task event");
        }
    }
}

#[async_trait]
impl ScmOps for GitHubScm {
    /// Rebases the task's branch onto the project's default branch, pushes
    /// it, and opens a PR (§4.7). Every git/gh failure along the way is
    /// logged to `task_events` and ends the call with `Ok` rather than an
    /// `Err` — by the time this hook runs, the status transition has already
    /// committed, and a push/PR failure must not be mistaken for a reason to
    /// undo it. The only errors this returns are programming errors (no
    /// `branch_name` on the task, project/task missing, or a DB write
    /// failing) that mean the call never got underway.
    async fn push_and_create_pr(&self, task: &Task) -> Result<String, EngineError> {
        let project = self.project(task).await?;
        let branch = task
            .branch_name
            .clone()
            .ok_or_else(|| EngineError::PortFailed { port: PORT, source: "task has no branch_name".into() })?;
        let default_branch = project.config.0.default_branch_or("main");
        let repo_dir = PathBuf::from(&project.path);
        let remote_ref = format!("origin/{default_branch}");
        let git = GitOps::new();
        let existing_pr_link = task.pr_link.clone().unwrap_or_default();

        let fetch_result = {
            let git = git.clone();
            let repo_dir = repo_dir.clone();
            tokio::task::spawn_blocking(move || git.fetch(&repo_dir, "origin"))
                .await
                .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?
        };
        if let Err(err) = fetch_result {
            self.log(task.id, TaskEventCategory::Git, TaskEventSeverity::Error, &format!("git fetch origin failed: {err}")).await;
            return Ok(existing_pr_link);
        }

        let rebase_result = {
            let git = git.clone();
            let repo_dir = repo_dir.clone();
            let remote_ref = remote_ref.clone();
            tokio::task::spawn_blocking(move || git.rebase(&repo_dir, &remote_ref))
                .await
                .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?
        };
        if let Err(err) = rebase_result {
            self.log(task.id, TaskEventCategory::Git, TaskEventSeverity::Error, &format!("git rebase onto {remote_ref} failed: {err}")).await;
            return Ok(existing_pr_link);
        }

        let diff_result = {
            let git = git.clone();
            let repo_dir = repo_dir.clone();
            let remote_ref = remote_ref.clone();
            tokio::task::spawn_blocking(move || git.diff(&repo_dir, &remote_ref))
                .await
                .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?
        };
        let diff = match diff_result {
            Ok(diff) => diff,
            Err(err) => {
                self.log(task.id, TaskEventCategory::Git, TaskEventSeverity::Error, &format!("git diff against {remote_ref} failed: {err}")).await;
                return Ok(existing_pr_link);
            }
        };

        if diff.trim().is_empty() {
            self.log(task.id, TaskEventCategory::Git, TaskEventSeverity::Info, "no changes against the default branch; skipping push and PR").await;
            return Ok(existing_pr_link);
        }

        TaskArtifact::record(&self.pool, task.id, TaskArtifactType::Diff, &serde_json::json!({ "diff": diff })).await?;

        let push_result = {
            let git = git.clone();
            let repo_dir = repo_dir.clone();
            let branch = branch.clone();
            tokio::task::spawn_blocking(move || git.push_force(&repo_dir, "origin", &branch))
                .await
                .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?
        };
        if let Err(err) = push_result {
            self.log(task.id, TaskEventCategory::Git, TaskEventSeverity::Error, &format!("git push of branch '{branch}' failed: {err}")).await;
            return Ok(existing_pr_link);
        }
        self.log(task.id, TaskEventCategory::Git, TaskEventSeverity::Info, &format!("pushed branch '{branch}' to origin")).await;

        let gh = self.gh.clone();
        let title = task.title.clone();
        let body = task.description.clone().unwrap_or_default();
        let branch_for_pr = branch.clone();
        let base_for_pr = default_branch.clone();
        let repo_dir_owned = repo_dir.clone();
        let pr_result = tokio::task::spawn_blocking(move || gh.create_pr(&repo_dir_owned, &branch_for_pr, &base_for_pr, &title, &body))
            .await
            .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?;

        let url = match pr_result {
            Ok(url) => url,
            Err(err) => {
                self.log(task.id, TaskEventCategory::Github, TaskEventSeverity::Error, &format!("gh pr create failed: {err}")).await;
                return Ok(existing_pr_link);
            }
        };

        TaskArtifact::record(&self.pool, task.id, TaskArtifactType::Pr, &serde_json::json!({ "url": url })).await?;
        Task::set_branch_and_pr(&self.pool, task.id, Some(&branch), Some(&url)).await?;
        self.log(task.id, TaskEventCategory::Github, TaskEventSeverity::Info, &format!("opened pull request {url}")).await;

        Ok(url)
    }

    async fn merge_pr(&self, task: &Task) -> Result<(), EngineError> {
        let project_path = self.project_path(task).await?;
        let pr_link = task
            .pr_link
            .clone()
            .ok_or_else(|| EngineError::PortFailed { port: PORT, source: "task has no pr_link".into() })?;
        let repo_dir = Path::new(&project_path).to_path_buf();
        let gh = self.gh.clone();
        tokio::task::spawn_blocking(move || gh.merge_pr(&repo_dir, &pr_link))
            .await
            .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })?
            .map_err(|err| EngineError::PortFailed { port: PORT, source: err.to_string() })
    }
}
