//! Resolved build environments and the host process snapshot.

use crate::tools::{Resolver, ToolError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Value forced into every resolved environment so Xcode generators never
/// try to pick a signing team.
pub const DEVELOPMENT_TEAM: (&str, &str) = ("XCODE_ATTRIBUTE_DEVELOPMENT_TEAM", "-");

/// Errors from resolving a build environment.
#[derive(Error, Debug)]
pub enum EnvError {
    /// Nothing was requested.
    #[error("You need to pass a request to get a rez resolve")]
    EmptyRequest,

    /// The package manager could not satisfy the request.
    #[error("Failed to create rez_env because: {description}")]
    Resolution {
        /// The resolver's own description of the failure.
        description: String,
    },
}

/// A concrete environment: variable name to value.
///
/// Produced once per build invocation and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment(BTreeMap<String, String>);

impl Environment {
    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether a variable is set.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate over all variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the environment is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `KEY=VALUE;` pairs concatenated, for dry-run output.
    pub fn to_env_string(&self) -> String {
        self.iter().map(|(k, v)| format!("{k}={v};")).collect()
    }

    /// Resolved packages as `name-version`, read from `REZ_RESOLVE`.
    ///
    /// With a `query`, only packages whose name is listed are returned.
    pub fn resolved_packages(&self, query: Option<&[&str]>) -> Vec<String> {
        self.get("REZ_RESOLVE")
            .unwrap_or_default()
            .split_whitespace()
            .map(|pkg| pkg.trim_start_matches('~'))
            .filter(|pkg| {
                query.is_none_or(|names| {
                    let name = pkg.split('-').next().unwrap_or(pkg);
                    names.contains(&name)
                })
            })
            .map(str::to_string)
            .collect()
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Variables exported by `rez-build` when it runs our build entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RezBuild {
    /// `REZ_BUILD_PROJECT_NAME`
    pub name: String,
    /// `REZ_BUILD_PROJECT_VERSION`
    pub version: String,
    /// `REZ_BUILD_INSTALL_PATH`
    pub install_path: PathBuf,
}

impl RezBuild {
    /// Variant keys encoded in the install path after the version segment.
    pub fn variant_keys(&self) -> Vec<String> {
        let path = self.install_path.to_string_lossy();
        path.rsplit(self.version.as_str())
            .next()
            .unwrap_or_default()
            .split('/')
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Snapshot of every ambient variable the tool reads.
///
/// Captured once at startup and handed to the components that need it.
#[derive(Debug, Clone, Default)]
pub struct HostEnv {
    /// `DEVELOPER_DIR`: selected Xcode developer directory.
    pub developer_dir: Option<String>,
    /// `REZ_OMNILAUNCHER_ROOT`: set when already running inside the launcher env.
    pub omnilauncher_root: Option<String>,
    /// `REZ_CMAKE_MINOR_VERSION` of the rez-provided CMake.
    pub cmake_minor_version: Option<u32>,
    /// Present when invoked by `rez-build`.
    pub rez_build: Option<RezBuild>,
}

impl HostEnv {
    /// Read the current process environment.
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build a snapshot from explicit variables.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> =
            vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();

        let rez_build = match (
            vars.get("REZ_BUILD_PROJECT_NAME"),
            vars.get("REZ_BUILD_PROJECT_VERSION"),
            vars.get("REZ_BUILD_INSTALL_PATH"),
        ) {
            (Some(name), Some(version), Some(path)) => Some(RezBuild {
                name: name.clone(),
                version: version.clone(),
                install_path: PathBuf::from(path),
            }),
            _ => None,
        };

        Self {
            developer_dir: vars.get("DEVELOPER_DIR").cloned(),
            omnilauncher_root: vars.get("REZ_OMNILAUNCHER_ROOT").cloned(),
            cmake_minor_version: vars
                .get("REZ_CMAKE_MINOR_VERSION")
                .and_then(|v| v.parse().ok()),
            rez_build,
        }
    }
}

/// Resolve `request` into a build environment.
///
/// The host's `DEVELOPER_DIR` is carried over when present, and
/// [`DEVELOPMENT_TEAM`] is always set.
///
/// # Errors
///
/// Returns [`EnvError::EmptyRequest`] for an empty request, or
/// [`EnvError::Resolution`] when the resolver fails.
pub fn resolve_environment(
    resolver: &dyn Resolver,
    request: &[String],
    host: &HostEnv,
) -> Result<Environment, EnvError> {
    if request.is_empty() {
        return Err(EnvError::EmptyRequest);
    }

    let resolved = resolver.resolve(request).map_err(|e| match e {
        ToolError::Failed { stderr, .. } => EnvError::Resolution { description: stderr },
        other => EnvError::Resolution {
            description: other.to_string(),
        },
    })?;

    let mut vars = resolved.0;
    if let Some(dir) = &host.developer_dir {
        info!("Found DEVELOPER_DIR. Adding to Rez environment.");
        vars.insert("DEVELOPER_DIR".to_string(), dir.clone());
    } else {
        info!("Did not find DEVELOPER_DIR. Not adding to Rez environment.");
    }
    vars.insert(DEVELOPMENT_TEAM.0.to_string(), DEVELOPMENT_TEAM.1.to_string());

    Ok(Environment(vars))
}

/// Resolve `request` and list the resolved packages as `name-version`.
///
/// # Errors
///
/// See [`resolve_environment`].
pub fn resolved_packages(
    resolver: &dyn Resolver,
    request: &[String],
    host: &HostEnv,
    query: Option<&[&str]>,
) -> Result<Vec<String>, EnvError> {
    Ok(resolve_environment(resolver, request, host)?.resolved_packages(query))
}
