use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{error::WorktreeError, git_ops::GitOps};

#[derive(Debug, Clone, PartialEq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub head: String,
    pub locked: bool,
}

/// Parses `git worktree list --porcelain` output into [`WorktreeInfo`]
/// entries. Records are blank-line separated; each has a `worktree <path>`
/// line followed by `HEAD <sha>`, an optional `branch <ref>`, and an
/// optional bare `locked` line.
fn parse_porcelain(raw: &str) -> Vec<WorktreeInfo> {
    let mut entries = Vec::new();
    let mut path = None;
    let mut head = None;
    let mut branch = None;
    let mut locked = false;

    let flush = |path: &mut Option<PathBuf>, head: &mut Option<String>, branch: &mut Option<String>, locked: &mut bool, entries: &mut Vec<WorktreeInfo>| {
        if let (Some(p), Some(h)) = (path.take(), head.take()) {
            entries.push(WorktreeInfo { path: p, branch: branch.take(), head: h, locked: *locked });
        }
        *locked = false;
    };

    for line in raw.lines() {
        if line.is_empty() {
            flush(&mut path, &mut head, &mut branch, &mut locked, &mut entries);
            continue;
        }
        if let Some(rest) = line.strip_prefix("worktree ") {
            path = Some(PathBuf::from(rest));
        } else if let Some(rest) = line.strip_prefix("HEAD ") {
            head = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("branch ") {
            branch = Some(rest.trim_start_matches("refs/heads/").to_string());
        } else if line == "locked" || line.starts_with("locked ") {
            locked = true;
        }
    }
    flush(&mut path, &mut head, &mut branch, &mut locked, &mut entries);
    entries
}

/// Manages one isolated git worktree per task (§4.4). Deliberately holds no
/// persistent state of its own: the set of live worktrees is always
/// reconstructed from `git worktree list --porcelain`, so it can never drift
/// from what git itself believes exists. Worktrees live under
/// `<repo_dir>/<worktrees_path>/<taskId>`, keyed by the task id rather than
/// the branch name, matching the path convention.
pub struct WorktreeManager {
    git: GitOps,
    repo_dir: PathBuf,
    worktrees_root: PathBuf,
}

impl WorktreeManager {
    pub fn new(repo_dir: PathBuf, worktrees_root: PathBuf) -> Self {
        Self { git: GitOps::new(), repo_dir, worktrees_root }
    }

    pub fn list(&self) -> Result<Vec<WorktreeInfo>, WorktreeError> {
        let raw = self.git.list_worktrees_porcelain(&self.repo_dir)?;
        Ok(parse_porcelain(&raw)
            .into_iter()
            .filter(|w| w.path.starts_with(&self.worktrees_root))
            .collect())
    }

    fn path_for(&self, task_id: Uuid) -> PathBuf {
        self.worktrees_root.join(task_id.to_string())
    }

    pub fn get(&self, task_id: Uuid) -> Result<WorktreeInfo, WorktreeError> {
        let path = self.path_for(task_id);
        self.list()?
            .into_iter()
            .find(|w| w.path == path)
            .ok_or_else(|| WorktreeError::NotFound(task_id.to_string()))
    }

    /// Creates a worktree for `task_id` on `branch`, branching off `from_ref`.
    /// Tries `git worktree add -b <branch> <path> <from_ref>` first; if the
    /// branch already exists, falls back to `git worktree add <path> <branch>`.
    pub fn create(&self, task_id: Uuid, branch: &str, from_ref: &str) -> Result<WorktreeInfo, WorktreeError> {
        self.ensure_worktrees_gitignored()?;
        let path = self.path_for(task_id);
        if self.git.add_worktree_new_branch(&self.repo_dir, &path, branch, from_ref).is_err() {
            self.git.add_worktree(&self.repo_dir, &path, branch)?;
        }
        self.get(task_id)
    }

    /// Appends the worktrees root to `<repo_dir>/.gitignore` if it isn't
    /// already covered (§4.4), so running agents don't leave every task's
    /// worktree showing up as untracked content in the main checkout.
    /// Creates the file if it doesn't exist yet.
    fn ensure_worktrees_gitignored(&self) -> Result<(), WorktreeError> {
        let entry = self
            .worktrees_root
            .strip_prefix(&self.repo_dir)
            .unwrap_or(&self.worktrees_root)
            .to_string_lossy()
            .into_owned();

        let gitignore_path = self.repo_dir.join(".gitignore");
        let existing = std::fs::read_to_string(&gitignore_path).unwrap_or_default();
        if existing.lines().any(|line| line.trim() == entry || line.trim() == format!("/{entry}")) {
            return Ok(());
        }

        let mut contents = existing;
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(&entry);
        contents.push('\n');
        std::fs::write(&gitignore_path, contents)?;
        Ok(())
    }

    pub fn lock(&self, task_id: Uuid) -> Result<(), WorktreeError> {
        let info = self.get(task_id)?;
        if info.locked {
            return Ok(());
        }
        // "already locked" is not an error condition worth surfacing.
        self.git.lock_worktree(&self.repo_dir, &info.path).or(Ok(()))
    }

    pub fn unlock(&self, task_id: Uuid) -> Result<(), WorktreeError> {
        let info = self.get(task_id)?;
        if !info.locked {
            return Ok(());
        }
        self.git.unlock_worktree(&self.repo_dir, &info.path).or(Ok(()))
    }

    pub fn delete(&self, task_id: Uuid, force: bool) -> Result<(), WorktreeError> {
        let info = self.get(task_id)?;
        if info.locked && !force {
            return Err(WorktreeError::Locked(task_id.to_string()));
        }
        self.git.remove_worktree(&self.repo_dir, &info.path, force)?;
        Ok(())
    }

    /// Prunes dangling worktree metadata and removes every unlocked
    /// worktree under [`Self::worktrees_root`], returning how many were
    /// removed.
    pub fn cleanup(&self) -> Result<usize, WorktreeError> {
        self.git.prune_worktrees(&self.repo_dir).ok();
        let entries = self.list()?;
        let mut removed = 0;
        for entry in entries.iter().filter(|w| !w.locked) {
            if self.git.remove_worktree(&self.repo_dir, &entry.path, false).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn worktree_path(&self, task_id: Uuid) -> PathBuf {
        self.path_for(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_locked_worktree_entry() {
        let raw = "worktree /repo\nHEAD abc123\nbranch refs/heads/main\n\nworktree /repo/.agent-worktrees/feature-x\nHEAD def456\nbranch refs/heads/feature-x\nlocked\n";
        let entries = parse_porcelain(raw);
        assert_eq!(entries.len(), 2);
        assert!(entries[1].locked);
        assert_eq!(entries[1].branch.as_deref(), Some("feature-x"));
        assert_eq!(entries[1].path, Path::new("/repo/.agent-worktrees/feature-x"));
    }
}

#[cfg(test)]
mod manager_tests {
    use std::process::Command;

    use tempfile::TempDir;
    use uuid::Uuid;

    use super::*;

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let run = |args: &[&str]| {
            assert!(Command::new("git").current_dir(dir.path()).args(args).status().unwrap().success());
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "initial"]);
        dir
    }

    #[test]
    fn create_keys_worktree_by_task_id() {
        let dir = init_repo();
        let worktrees_root = dir.path().join(".agent-worktrees");
        let manager = WorktreeManager::new(dir.path().to_path_buf(), worktrees_root.clone());
        let base = GitOps::new().current_branch(dir.path()).unwrap();
        let task_id = Uuid::new_v4();

        let info = manager.create(task_id, "feature/my-task", &base).unwrap();
        assert_eq!(info.path, worktrees_root.join(task_id.to_string()));

        let listed = manager.get(task_id).unwrap();
        assert_eq!(listed.branch.as_deref(), Some("feature/my-task"));
    }

    #[test]
    fn create_adds_worktrees_root_to_gitignore() {
        let dir = init_repo();
        let worktrees_root = dir.path().join(".agent-worktrees");
        let manager = WorktreeManager::new(dir.path().to_path_buf(), worktrees_root);
        let base = GitOps::new().current_branch(dir.path()).unwrap();

        manager.create(Uuid::new_v4(), "feature/one", &base).unwrap();
        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.lines().filter(|l| l.trim() == ".agent-worktrees").count(), 1);

        // A second worktree must not duplicate the entry.
        manager.create(Uuid::new_v4(), "feature/two", &base).unwrap();
        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.lines().filter(|l| l.trim() == ".agent-worktrees").count(), 1);
    }
}
