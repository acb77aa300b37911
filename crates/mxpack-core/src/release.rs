//! Publishing built variants and tagging releases.

use crate::context::Workspace;
use crate::tools::{ToolError, Vcs};
use crate::version::{VersionError, VersionMode};
use mxpack_schema::{ConfigError, VariantRef};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors from releasing a precached variant.
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// The variant is not configured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The package name or version could not be determined.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// The deploy tool failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// An existing precache could not be removed.
    #[error("Failed to remove existing precache {path}: {source}")]
    Io {
        /// Precache directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The deploy finished but the precache is not where it should be.
    #[error("Failed to find precache at {0}")]
    MissingPrecache(PathBuf),
}

/// Create and push the release tag for `version`.
///
/// # Errors
///
/// Returns an error if tagging or pushing fails.
pub fn tag_release(vcs: &dyn Vcs, version: &str) -> Result<(), ToolError> {
    info!("Creating tag {version}");
    vcs.create_tag(
        version,
        &format!("Automated tag from Jenkins build: {version}"),
    )?;
    info!("Created tag {version}");
    Ok(())
}

/// Deploy the variant built at `root` into the precache.
///
/// Any existing precache for the same name, version and variant is removed
/// first. Returns the new precache directory.
///
/// # Errors
///
/// Returns an error if the variant is unknown, the name or version cannot
/// be determined, the deploy fails, or the precache is missing afterwards.
pub fn release_precache(
    ws: &Workspace,
    variant: &VariantRef,
    root: &Path,
    name: Option<&str>,
    version: Option<&str>,
) -> Result<PathBuf, ReleaseError> {
    let variant = ws.config.variant(variant)?;
    let name = match name {
        Some(n) => n.to_string(),
        None => ws.package_name(None)?,
    };
    let version = match version {
        Some(v) => v.to_string(),
        None => ws.package_version(None, VersionMode::default())?,
    };

    let mut precache = ws.tools.deployer.precache_root()?;
    precache.push(&name);
    precache.push(&version);
    precache.extend(&variant.keys);

    info!("Checking {} for existing cache.", precache.display());
    if precache.exists() {
        info!(
            "Removing existing precache at {} to replace it",
            precache.display()
        );
        std::fs::remove_dir_all(&precache).map_err(|source| ReleaseError::Io {
            path: precache.clone(),
            source,
        })?;
    }

    info!(
        "Releasing {name}-{version} with variant: {} from: {}",
        variant.name,
        root.display()
    );
    ws.tools
        .deployer
        .deploy_variant(root, &name, &version, &variant.keys)?;

    if !precache.exists() {
        return Err(ReleaseError::MissingPrecache(precache));
    }
    info!("Created precache at {}", precache.display());
    Ok(precache)
}
