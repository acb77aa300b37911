//! Release command

use anyhow::{Context, Result};
use mxpack_core::Workspace;
use mxpack_core::release::release_precache;
use mxpack_schema::VariantRef;
use std::path::Path;

/// Release the variant built under `root` into the precache.
pub fn release(
    ws: &Workspace,
    root: &Path,
    index: u32,
    name: Option<&str>,
    version: Option<&str>,
) -> Result<()> {
    let precache = release_precache(ws, &VariantRef::ById(index), root, name, version)
        .with_context(|| format!("Failed to release variant {index}"))?;
    println!("{}", precache.display());
    Ok(())
}
