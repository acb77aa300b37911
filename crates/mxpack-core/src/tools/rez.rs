//! rez package manager adapter.

use super::{Resolver, ToolError, checked, execute};
use crate::env::Environment;
use std::process::Command;

/// Resolves environments with `rez-env` and lists versions with `rez-search`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rez;

impl Resolver for Rez {
    fn resolve(&self, request: &[String]) -> Result<Environment, ToolError> {
        // `env -0` keeps values containing newlines intact.
        let output = checked(
            "rez-env",
            Command::new("rez-env")
                .args(request)
                .args(["--", "env", "-0"]),
        )?;
        Ok(parse_env_block(&output.stdout))
    }

    fn versions(&self, package: &str) -> Result<Vec<String>, ToolError> {
        let output = execute(
            "rez-search",
            Command::new("rez-search").args([package, "--format", "{version}"]),
            true,
        )?;

        if !output.success() {
            // rez-search exits non-zero when nothing matches.
            if output.stdout.trim().is_empty() && output.stderr.contains("No matching") {
                return Ok(Vec::new());
            }
            return Err(ToolError::Failed {
                tool: "rez-search",
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Parse NUL separated `KEY=VALUE` records as printed by `env -0`.
pub fn parse_env_block(block: &str) -> Environment {
    block
        .split('\0')
        .filter_map(|record| record.trim_start_matches('\n').split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_block() {
        let env = parse_env_block("PATH=/a:/b\0MULTI=line1\nline2\0EMPTY=\0\0");
        assert_eq!(env.get("PATH"), Some("/a:/b"));
        assert_eq!(env.get("MULTI"), Some("line1\nline2"));
        assert_eq!(env.get("EMPTY"), Some(""));
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let env = parse_env_block("OPTS=-DA=1 -DB=2\0");
        assert_eq!(env.get("OPTS"), Some("-DA=1 -DB=2"));
    }
}
