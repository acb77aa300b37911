//! Keeps the machine from sleeping during long builds.

use std::process::{Child, Command, Stdio};
use tracing::{debug, warn};

/// Runs `caffeinate` for as long as the guard lives.
#[derive(Debug)]
pub struct KeepAwake {
    process: Option<Child>,
}

impl KeepAwake {
    /// Start `caffeinate`. A missing or failing tool only logs a warning.
    pub fn start() -> Self {
        Self::with_command(Command::new("caffeinate"))
    }

    fn with_command(mut cmd: Command) -> Self {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.spawn() {
            Ok(child) => {
                debug!("caffeinate running as pid {}", child.id());
                Self {
                    process: Some(child),
                }
            }
            Err(e) => {
                warn!("Could not start caffeinate, the machine may sleep during the build: {e}");
                Self { process: None }
            }
        }
    }

    /// Whether the helper process is running.
    pub fn is_active(&self) -> bool {
        self.process.is_some()
    }
}

impl Drop for KeepAwake {
    fn drop(&mut self) {
        if let Some(mut child) = self.process.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_is_inactive() {
        let guard = KeepAwake::with_command(Command::new("mxpack-no-such-caffeinate"));
        assert!(!guard.is_active());
    }

    #[test]
    fn test_process_killed_on_drop() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let guard = KeepAwake::with_command(cmd);
        let pid = guard.process.as_ref().map(Child::id).unwrap();
        drop(guard);

        let alive = Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(!alive.success(), "pid {pid} still running");
    }
}
