pub mod error;
pub mod git_ops;
pub mod scm;
pub mod shell;
pub mod worktree;

pub use error::{GitOpsError, ScmError, WorktreeError};
pub use git_ops::GitOps;
pub use scm::GitHubScm;
pub use worktree::{WorktreeInfo, WorktreeManager};

#[cfg(test)]
mod tests {
    use std::process::Command;

    use tempfile::TempDir;

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
    fn current_branch_reports_main_or_master() {
        let dir = init_repo();
        let git = GitOps::new();
        let branch = git.current_branch(dir.path()).unwrap();
        assert!(branch == "main" || branch == "master");
    }
}
