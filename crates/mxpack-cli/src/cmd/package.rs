//! Package command

use anyhow::{Context, Result};
use mxpack_core::Workspace;
use mxpack_core::manifest::{PackageOptions, make_package};

/// Write the manifest and optionally release it.
pub fn package(ws: &Workspace, opts: &PackageOptions) -> Result<()> {
    let result = make_package(ws, opts).context("Failed to make the package manifest")?;

    println!(
        "Wrote {} for {}-{} with {} variant(s)",
        result.manifest.display(),
        result.name,
        result.version,
        result.variants.len()
    );
    if result.released {
        println!("Released {}-{}", result.name, result.version);
    }
    Ok(())
}
