use super::{ToolError, Vcs, checked};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git working copy of the MaterialX repository.
#[derive(Debug, Clone)]
pub struct Git {
    repo: PathBuf,
}

impl Git {
    /// Operate on the repository at `repo`.
    pub fn new(repo: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, ToolError> {
        let output = checked("git", Command::new("git").args(args).current_dir(&self.repo))?;
        Ok(output.stdout.trim().to_string())
    }
}

impl Vcs for Git {
    fn branch(&self) -> Result<String, ToolError> {
        self.run(&["branch", "--show-current"])
    }

    fn head_commit(&self) -> Result<String, ToolError> {
        self.run(&["rev-parse", "HEAD"])
    }

    fn create_tag(&self, tag: &str, message: &str) -> Result<(), ToolError> {
        self.run(&["tag", "-a", tag, "-m", message])?;
        self.run(&["push", "origin", tag])?;
        Ok(())
    }
}
