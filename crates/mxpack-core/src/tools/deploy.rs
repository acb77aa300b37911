//! Publishing through the omnilauncher rez tools.

use super::{Deployer, ToolError, checked, execute};
use std::path::{Path, PathBuf};
use std::process::Command;

const PRECACHE_QUERY: &str = "import omnilauncher.env.settings as s;print('PRECACHE_ROOT IS', s.get_setting('PRECACHE_ROOT'))";
const PRECACHE_MARKER: &str = "PRECACHE_ROOT IS";

/// `rez-deploy` / `rez-cache`, launched through `rez-env omnilauncher` unless
/// the launcher environment is already active.
#[derive(Debug, Clone, Copy)]
pub struct RezDeploy {
    in_launcher_env: bool,
}

impl RezDeploy {
    /// `in_launcher_env` is true when `REZ_OMNILAUNCHER_ROOT` is set.
    pub fn new(in_launcher_env: bool) -> Self {
        Self { in_launcher_env }
    }

    /// Build a command for `program`, wrapped in the launcher env when needed.
    fn launcher_command(&self, extra_packages: &[&str], program: &str) -> Command {
        if self.in_launcher_env {
            Command::new(program)
        } else {
            let mut cmd = Command::new("rez-env");
            cmd.arg("omnilauncher")
                .args(extra_packages)
                .arg("--")
                .arg(program);
            cmd
        }
    }

    fn tool(&self, program: &'static str) -> &'static str {
        if self.in_launcher_env { program } else { "rez-env" }
    }

    fn run_streamed(&self, tool: &'static str, cmd: &mut Command) -> Result<(), ToolError> {
        tracing::info!("{cmd:?}");
        let output = execute(tool, cmd, false)?;
        if !output.success() {
            return Err(ToolError::Failed {
                tool,
                code: output.code,
                stderr: String::new(),
            });
        }
        Ok(())
    }
}

impl Deployer for RezDeploy {
    fn cache(&self, packages: &[String]) -> Result<(), ToolError> {
        tracing::info!("Caching {} ...", packages.join(", "));
        let mut cmd = self.launcher_command(&[], "rez-cache");
        cmd.args(packages);
        self.run_streamed(self.tool("rez-cache"), &mut cmd)?;
        tracing::info!("Finished caching packages.");
        Ok(())
    }

    fn deploy_manifest(&self, dir: &Path, name: &str, version: &str) -> Result<(), ToolError> {
        let mut cmd = self.launcher_command(&[], "rez-deploy");
        cmd.args(["--package", name, "--version", version, "--manifest_only"])
            .current_dir(dir);
        self.run_streamed(self.tool("rez-deploy"), &mut cmd)
    }

    fn deploy_variant(
        &self,
        dir: &Path,
        name: &str,
        version: &str,
        keys: &[String],
    ) -> Result<(), ToolError> {
        let mut cmd = self.launcher_command(&[], "rez-deploy");
        cmd.args(["--package", name, "--version", version]);
        for key in keys {
            cmd.args(["-v", key]);
        }
        cmd.current_dir(dir);
        self.run_streamed(self.tool("rez-deploy"), &mut cmd)
    }

    fn precache_root(&self) -> Result<PathBuf, ToolError> {
        tracing::info!("Finding precache root from omnilauncher");
        let mut cmd = self.launcher_command(&["pyside2"], "python3");
        cmd.args(["-c", PRECACHE_QUERY]);
        let output = checked(self.tool("python3"), &mut cmd)?;

        parse_precache_root(&output.stdout).ok_or_else(|| ToolError::Output {
            tool: "python3",
            detail: "Could not find PRECACHE_ROOT".to_string(),
        })
    }
}

/// Extract the path printed after the `PRECACHE_ROOT IS` marker.
pub fn parse_precache_root(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .find(|line| line.starts_with(PRECACHE_MARKER))
        .and_then(|line| line.split_whitespace().next_back())
        .filter(|root| *root != "IS")
        .map(PathBuf::from)
}
