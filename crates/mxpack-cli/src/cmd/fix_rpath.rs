//! Fix-rpath command

use anyhow::{Context, Result};
use mxpack_core::Workspace;
use mxpack_core::relinker::fix_rpaths;
use mxpack_schema::VariantRef;
use std::path::Path;

/// Relink the variant built under `root` for `destination`.
pub fn fix_rpath(ws: &Workspace, root: &Path, index: u32, destination: &Path) -> Result<()> {
    let report = fix_rpaths(ws, root, destination, &VariantRef::ById(index))
        .with_context(|| format!("Failed to fix {}", root.display()))?;
    println!(
        "Fixed {} binaries, {} libraries and {} of {} modules ({} scripts left untouched)",
        report.binaries,
        report.libraries,
        report.modules_rewritten,
        report.modules,
        report.scripts
    );
    Ok(())
}
