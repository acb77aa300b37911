//! CMake adapter.

use super::{Builder, CMakeInvocation, ToolError, ToolOutput, execute};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runs the CMake configure and build steps with the resolved environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct CMake;

impl CMake {
    fn command(program: impl AsRef<std::ffi::OsStr>, invocation: &CMakeInvocation<'_>) -> Command {
        let mut cmd = Command::new(program);
        // The resolved environment replaces the host one entirely.
        cmd.current_dir(invocation.build_dir)
            .env_clear()
            .envs(invocation.env.iter());
        cmd
    }
}

impl Builder for CMake {
    fn configure(&self, invocation: &CMakeInvocation<'_>) -> Result<ToolOutput, ToolError> {
        let mut cmd = if invocation.xcrun {
            tracing::info!("Using xcrun to build Xcode Project");
            let mut cmd = Self::command("xcrun", invocation);
            cmd.arg("cmake");
            cmd
        } else {
            Self::command(find_cmake(invocation.env.get("PATH")), invocation)
        };
        cmd.args(["-G", "Unix Makefiles"])
            .arg(invocation.source_dir)
            .args(invocation.flags);

        tracing::info!("Generating build with {cmd:?}");
        execute(
            if invocation.xcrun { "xcrun" } else { "cmake" },
            &mut cmd,
            invocation.capture,
        )
    }

    fn build_install(&self, invocation: &CMakeInvocation<'_>) -> Result<ToolOutput, ToolError> {
        let mut cmd = Self::command(find_cmake(invocation.env.get("PATH")), invocation);
        cmd.args(["--build", ".", "--config", invocation.build_type])
            .args(["--target", "install", "--", "-j"])
            .arg(invocation.jobs.to_string());

        tracing::info!("Starting compilation with {cmd:?}");
        execute("cmake", &mut cmd, invocation.capture)
    }
}

/// Locate `cmake` on a `PATH` string, falling back to a bare `cmake`.
pub fn find_cmake(path: Option<&str>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    path.and_then(|p| which::which_in("cmake", Some(p), &cwd).ok())
        .unwrap_or_else(|| Path::new("cmake").to_path_buf())
}
