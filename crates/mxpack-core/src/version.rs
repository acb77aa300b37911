//! Package naming and version numbering.
//!
//! Released versions look like `<branch>-<materialx version>-a<n>`, e.g.
//! `main-1.38.8-a3`. The trailing `n` counts releases of one MaterialX
//! version on one branch.

use crate::context::Workspace;
use crate::tools::ToolError;
use mxpack_schema::Config;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^set\(MATERIALX_[A-Z]+_VERSION (\d+)\)").expect("static regex")
});

/// Errors from computing versions.
#[derive(Error, Debug)]
pub enum VersionError {
    /// `CMakeLists.txt` could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `CMakeLists.txt` holds no `MATERIALX_*_VERSION` lines.
    #[error("No MaterialX version found in {0}")]
    NoVersion(PathBuf),

    /// Querying the branch or released versions failed.
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// How the release counter is advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionMode {
    /// Development build: the branch is replaced by `local` and the counter
    /// is not advanced.
    pub local: bool,
    /// Advance the counter past the latest release.
    pub increment: bool,
}

impl Default for VersionMode {
    fn default() -> Self {
        Self {
            local: false,
            increment: true,
        }
    }
}

/// Version components from the `set(MATERIALX_<PART>_VERSION n)` lines, in
/// file order.
pub fn materialx_version_parts(cmakelists: &str) -> Vec<String> {
    cmakelists
        .lines()
        .filter_map(|line| VERSION_LINE.captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// The MaterialX version of the checkout at `repo`, e.g. `1.38.8`.
///
/// # Errors
///
/// Returns an error if `CMakeLists.txt` is unreadable or has no version lines.
pub fn materialx_version(repo: &Path) -> Result<String, VersionError> {
    let path = repo.join("CMakeLists.txt");
    let text = std::fs::read_to_string(&path).map_err(|source| VersionError::Io {
        path: path.clone(),
        source,
    })?;

    let parts = materialx_version_parts(&text);
    if parts.is_empty() {
        return Err(VersionError::NoVersion(path));
    }
    Ok(parts.join("."))
}

/// Compute the package version for `branch`.
///
/// `existing` are the released versions of `package`; only those sharing
/// the `<branch>-<mx_version>-a` prefix with an integer suffix count.
pub fn package_version(
    package: &str,
    branch: &str,
    mx_version: &str,
    existing: &[String],
    mode: VersionMode,
) -> String {
    let branch = if mode.local {
        "local"
    } else {
        let short = package.rsplit('_').next().unwrap_or(package);
        let branch = branch.strip_prefix(short).unwrap_or(branch);
        branch.strip_prefix('-').unwrap_or(branch)
    };

    let prefix = format!("{branch}-{mx_version}-a");
    let mut suffix = existing
        .iter()
        .filter_map(|v| v.strip_prefix(&prefix)?.parse::<i64>().ok())
        .max()
        .unwrap_or(-1);

    if mode.increment && !mode.local {
        suffix += 1;
    }

    format!("{prefix}{}", suffix.max(0))
}

/// Package name for `branch`: `<prefix>_<key>`, where the key is looked up
/// by the branch's first `-` token.
pub fn package_name(config: &Config, branch: &str) -> String {
    let token = branch.split('-').next().unwrap_or(branch);
    let key = config
        .branch_keys
        .get(token)
        .unwrap_or(&config.branch_fallback);
    format!("{}_{key}", config.branch_package_prefix)
}

/// Package searched by `version --latest/--next`: `query` with the package
/// name prepended unless it already starts with it.
pub fn search_name(package: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if q.starts_with(package) => q.to_string(),
        Some(q) => format!("{package}{q}"),
        None => package.to_string(),
    }
}

/// Highest release counter among `versions`.
pub fn latest_suffix(versions: &[String]) -> Option<u32> {
    versions
        .iter()
        .filter_map(|v| v.rsplit("-a").next()?.parse().ok())
        .max()
}

/// Counter the next release should use.
pub fn next_suffix(latest: Option<u32>) -> u32 {
    latest.map_or(0, |n| n + 1)
}

impl Workspace {
    /// The MaterialX version of this checkout.
    ///
    /// # Errors
    ///
    /// See [`materialx_version`].
    pub fn materialx_version(&self) -> Result<String, VersionError> {
        materialx_version(&self.settings.repo)
    }

    /// The current branch, or `branch` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the branch cannot be queried.
    pub fn branch_or(&self, branch: Option<&str>) -> Result<String, VersionError> {
        match branch {
            Some(b) => Ok(b.to_string()),
            None => Ok(self.tools.vcs.branch()?),
        }
    }

    /// Package name for the current (or given) branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the branch cannot be queried.
    pub fn package_name(&self, branch: Option<&str>) -> Result<String, VersionError> {
        Ok(package_name(&self.config, &self.branch_or(branch)?))
    }

    /// Package version for the current (or given) branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the branch, MaterialX version or released
    /// versions cannot be determined.
    pub fn package_version(
        &self,
        branch: Option<&str>,
        mode: VersionMode,
    ) -> Result<String, VersionError> {
        let branch = self.branch_or(branch)?;
        let mx_version = self.materialx_version()?;
        let existing = self.tools.resolver.versions(&self.config.package)?;
        Ok(package_version(
            &self.config.package,
            &branch,
            &mx_version,
            &existing,
            mode,
        ))
    }

    /// Latest release counter of `query` (see [`search_name`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub fn latest_suffix(&self, query: Option<&str>) -> Result<Option<u32>, VersionError> {
        let name = search_name(&self.config.package, query);
        Ok(latest_suffix(&self.tools.resolver.versions(&name)?))
    }
}
