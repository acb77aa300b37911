//! Version command

use anyhow::{Context, Result};
use mxpack_core::Workspace;
use mxpack_core::version::{VersionMode, materialx_version, next_suffix};
use std::path::Path;

/// What `mxpack version` should print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// The MaterialX version of the checkout.
    MaterialX,
    /// The latest release counter.
    Latest,
    /// The counter the next release will use.
    Next,
    /// The full package version.
    Package(VersionMode),
}

/// Print the MaterialX version read from `repo`.
pub fn print_materialx(repo: &Path) -> Result<()> {
    let version = materialx_version(repo)
        .with_context(|| format!("Failed to read the MaterialX version under {}", repo.display()))?;
    println!("{version}");
    Ok(())
}

/// Answer a release query.
pub fn version(ws: &Workspace, query: Query, package_name: Option<&str>) -> Result<()> {
    match query {
        Query::MaterialX => print_materialx(&ws.settings.repo)?,
        Query::Latest => {
            let latest = ws.latest_suffix(package_name)?;
            println!("{}", latest.unwrap_or(0));
        }
        Query::Next => {
            let latest = ws.latest_suffix(package_name)?;
            println!("{}", next_suffix(latest));
        }
        Query::Package(mode) => {
            let version = ws
                .package_version(None, mode)
                .context("Failed to compute the package version")?;
            println!("{version}");
        }
    }
    Ok(())
}
