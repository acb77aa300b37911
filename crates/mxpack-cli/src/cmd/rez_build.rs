//! rez-build entry point
//!
//! `rez-build` runs this command with `REZ_BUILD_PROJECT_NAME`,
//! `REZ_BUILD_PROJECT_VERSION` and `REZ_BUILD_INSTALL_PATH` set. The variant
//! is recovered from the install path and built straight into it.

use anyhow::{Context, Result};
use mxpack_core::Workspace;
use mxpack_core::build::{BuildOptions, build_variant};
use mxpack_core::relinker::fix_rpaths;
use mxpack_core::xcode::detect_xcrun;
use mxpack_schema::VariantRef;

/// Build and relink the variant `rez-build` asked for.
pub fn rez_build(ws: &Workspace) -> Result<()> {
    let rez = ws
        .host
        .rez_build
        .as_ref()
        .context("REZ_BUILD_PROJECT_NAME, REZ_BUILD_PROJECT_VERSION and REZ_BUILD_INSTALL_PATH must be set")?;

    let keys = rez.variant_keys();
    let variant = ws.config.variant_by_keys(&keys)?;
    println!("Building {}", variant.name);

    let mut opts = BuildOptions::new(&rez.install_path);
    opts.exact_root = true;
    opts.xcrun = detect_xcrun(&ws.host);
    build_variant(ws, variant, &opts)
        .with_context(|| format!("Failed to build variant {}", variant.name))?;

    let destination = ws.apps_root().join(&rez.name).join(&rez.version);
    fix_rpaths(
        ws,
        &rez.install_path,
        &destination,
        &VariantRef::ById(variant.id),
    )
    .with_context(|| format!("Failed to fix {}", rez.install_path.display()))?;
    Ok(())
}
