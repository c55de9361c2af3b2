use std::{ffi::OsStr, path::Path, process::Command};

use crate::{error::GitOpsError, shell::resolve_executable_path_blocking};

/// Thin wrapper around the `git` CLI (§4.5). Every operation runs `git`
/// inside `repo_dir` via a subprocess rather than linking libgit2, matching
/// the teacher's preference for shelling out to the platform tools it
/// already depends on elsewhere (the GitHub CLI wrapper does the same).
#[derive(Debug, Clone, Default)]
pub struct GitOps;

impl GitOps {
    pub fn new() -> Self {
        Self
    }

    fn run<I, S>(&self, repo_dir: &Path, args: I) -> Result<String, GitOpsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let git = resolve_executable_path_blocking("git").ok_or(GitOpsError::GitNotAvailable)?;
        let output = Command::new(git).arg("-C").arg(repo_dir).args(args).output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(GitOpsError::CommandFailed(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }

    pub fn fetch(&self, repo_dir: &Path, remote: &str) -> Result<(), GitOpsError> {
        self.run(repo_dir, ["fetch", remote]).map(|_| ())
    }

    pub fn create_branch(&self, repo_dir: &Path, name: &str, from: &str) -> Result<(), GitOpsError> {
        self.run(repo_dir, ["branch", name, from]).map(|_| ())
    }

    pub fn checkout(&self, repo_dir: &Path, branch: &str) -> Result<(), GitOpsError> {
        self.run(repo_dir, ["checkout", branch]).map(|_| ())
    }

    pub fn push(&self, repo_dir: &Path, remote: &str, branch: &str) -> Result<(), GitOpsError> {
        self.run(repo_dir, ["push", "-u", remote, branch]).map(|_| ())
    }

    /// Used by `push_and_create_pr`, whose branch has just been rebased onto
    /// the default branch and so may need to overwrite a stale remote tip.
    pub fn push_force(&self, repo_dir: &Path, remote: &str, branch: &str) -> Result<(), GitOpsError> {
        self.run(repo_dir, ["push", "--force", "-u", remote, branch]).map(|_| ())
    }

    pub fn pull(&self, repo_dir: &Path, remote: &str, branch: &str) -> Result<(), GitOpsError> {
        self.run(repo_dir, ["pull", remote, branch]).map(|_| ())
    }

    pub fn diff(&self, repo_dir: &Path, base: &str) -> Result<String, GitOpsError> {
        self.run(repo_dir, ["diff", base])
    }

    pub fn commit(&self, repo_dir: &Path, message: &str) -> Result<(), GitOpsError> {
        self.run(repo_dir, ["commit", "--allow-empty", "-m", message]).map(|_| ())
    }

    pub fn log(&self, repo_dir: &Path, base: &str, max_count: u32) -> Result<String, GitOpsError> {
        self.run(repo_dir, ["log", &format!("-{max_count}"), "--oneline", &format!("{base}..HEAD")])
    }

    pub fn rebase(&self, repo_dir: &Path, onto: &str) -> Result<(), GitOpsError> {
        self.run(repo_dir, ["rebase", onto]).map(|_| ())
    }

    pub fn current_branch(&self, repo_dir: &Path) -> Result<String, GitOpsError> {
        self.run(repo_dir, ["rev-parse", "--abbrev-ref", "HEAD"]).map(|s| s.trim().to_string())
    }

    pub fn clean(&self, repo_dir: &Path) -> Result<(), GitOpsError> {
        self.run(repo_dir, ["clean", "-fd"]).map(|_| ())
    }

    pub fn add_worktree(&self, repo_dir: &Path, worktree_path: &Path, branch: &str) -> Result<(), GitOpsError> {
        self.run(repo_dir, [OsStr::new("worktree"), OsStr::new("add"), worktree_path.as_os_str(), OsStr::new(branch)])
            .map(|_| ())
    }

    /// `git worktree add -b <branch> <path> <from_ref>` — fails if `branch`
    /// already exists, in which case the caller falls back to
    /// [`Self::add_worktree`] against the existing branch.
    pub fn add_worktree_new_branch(
        &self,
        repo_dir: &Path,
        worktree_path: &Path,
        branch: &str,
        from_ref: &str,
    ) -> Result<(), GitOpsError> {
        self.run(
            repo_dir,
            [OsStr::new("worktree"), OsStr::new("add"), OsStr::new("-b"), OsStr::new(branch), worktree_path.as_os_str(), OsStr::new(from_ref)],
        )
        .map(|_| ())
    }

    pub fn prune_worktrees(&self, repo_dir: &Path) -> Result<(), GitOpsError> {
        self.run(repo_dir, ["worktree", "prune"]).map(|_| ())
    }

    pub fn remove_worktree(&self, repo_dir: &Path, worktree_path: &Path, force: bool) -> Result<(), GitOpsError> {
        let mut args = vec![OsStr::new("worktree"), OsStr::new("remove")];
        if force {
            args.push(OsStr::new("--force"));
        }
        args.push(worktree_path.as_os_str());
        self.run(repo_dir, args).map(|_| ())
    }

    pub fn lock_worktree(&self, repo_dir: &Path, worktree_path: &Path) -> Result<(), GitOpsError> {
        self.run(repo_dir, [OsStr::new("worktree"), OsStr::new("lock"), worktree_path.as_os_str()]).map(|_| ())
    }

    pub fn unlock_worktree(&self, repo_dir: &Path, worktree_path: &Path) -> Result<(), GitOpsError> {
        self.run(repo_dir, [OsStr::new("worktree"), OsStr::new("unlock"), worktree_path.as_os_str()]).map(|_| ())
    }

    /// Raw `git worktree list --porcelain` output; [`crate::worktree::WorktreeManager`]
    /// parses this into structured entries rather than persisting worktrees
    /// to the database (§4.4 — worktrees are reconstructed, not stored).
    pub fn list_worktrees_porcelain(&self, repo_dir: &Path) -> Result<String, GitOpsError> {
        self.run(repo_dir, ["worktree", "list", "--porcelain"])
    }
}
