//! Shared state for every operation.
//!
//! A [`Workspace`] is assembled once by the CLI and passed by reference to
//! the build, fix, package and release operations.

use crate::env::HostEnv;
use crate::tools::Toolbox;
use mxpack_schema::{Config, ConfigError};
use std::fmt;
use std::path::{Path, PathBuf};

/// Template file looked up beside the configuration when none is named.
pub const DEFAULT_TEMPLATE: &str = "package.py";

/// Filesystem locations the operations work with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// MaterialX checkout (holds `CMakeLists.txt`).
    pub repo: PathBuf,
    /// Directory of the configuration file; relative paths resolve here.
    pub config_dir: PathBuf,
    /// Manifest template.
    pub template: PathBuf,
}

impl Settings {
    /// Derive settings for `repo` from a loaded config found in `config_dir`.
    pub fn new(repo: &Path, config_dir: &Path, config: &Config) -> Self {
        let template = match &config.template {
            Some(t) if t.is_absolute() => t.clone(),
            Some(t) => config_dir.join(t),
            None => config_dir.join(DEFAULT_TEMPLATE),
        };
        Self {
            repo: repo.to_path_buf(),
            config_dir: config_dir.to_path_buf(),
            template,
        }
    }

    /// Default CMake build folder for a variant alias.
    pub fn build_folder(&self, alias: &str) -> PathBuf {
        self.repo
            .join("build")
            .join(format!("materialx_build_{alias}"))
    }
}

/// Configuration, locations, host snapshot and tool adapters.
pub struct Workspace {
    /// Variant and package configuration.
    pub config: Config,
    /// Filesystem locations.
    pub settings: Settings,
    /// Ambient environment captured at startup.
    pub host: HostEnv,
    /// External tool adapters.
    pub tools: Toolbox,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("settings", &self.settings)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Assemble a workspace from its parts.
    pub fn new(config: Config, settings: Settings, host: HostEnv, tools: Toolbox) -> Self {
        Self {
            config,
            settings,
            host,
            tools,
        }
    }

    /// Load the configuration at `config_path` and wire the real tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or is invalid.
    pub fn open(repo: &Path, config_path: &Path, host: HostEnv) -> Result<Self, ConfigError> {
        let config = Config::load(config_path)?;
        let config_dir = config_path.parent().unwrap_or(Path::new("."));
        let settings = Settings::new(repo, config_dir, &config);
        let tools = Toolbox::system(&host, repo);
        Ok(Self::new(config, settings, host, tools))
    }

    /// Root of deployed packages (`/usr/local/apps` by default).
    pub fn apps_root(&self) -> &Path {
        &self.config.apps_root
    }
}

#[cfg(test)]
impl Workspace {
    /// A workspace over `repo` with fake tools.
    pub(crate) fn for_tests(repo: &Path, config: Config, tools: Toolbox) -> Self {
        let settings = Settings::new(repo, repo, &config);
        Self::new(config, settings, HostEnv::default(), tools)
    }
}
