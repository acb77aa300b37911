//! Build command

use anyhow::{Context, Result, bail};
use mxpack_core::Workspace;
use mxpack_core::build::{BuildOptions, BuildOutcome, build_variant};
use mxpack_core::xcode::{detect_xcrun, log_host_diagnostics, parse_boolean};
use mxpack_schema::{Variant, VariantRef};

/// Variants selected on the command line.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Names or aliases (`-n`).
    pub names: Vec<String>,
    /// Ids (`-i`), used only when no name is given.
    pub ids: Vec<u32>,
}

impl Selection {
    fn resolve<'a>(&self, ws: &'a Workspace) -> Result<Vec<&'a Variant>> {
        if !self.names.is_empty() {
            return self
                .names
                .iter()
                .map(|name| ws.config.lookup(name).map_err(Into::into))
                .collect();
        }
        if !self.ids.is_empty() {
            return self
                .ids
                .iter()
                .map(|id| ws.config.variant(&VariantRef::ById(*id)).map_err(Into::into))
                .collect();
        }
        bail!("Not enough arguments to build: pass --name or --index")
    }
}

/// Build every selected variant in order.
pub fn build(
    ws: &Workspace,
    selection: &Selection,
    mut opts: BuildOptions,
    xcrun: Option<&str>,
) -> Result<()> {
    let variants = selection.resolve(ws)?;

    opts.xcrun = match xcrun {
        Some(value) => parse_boolean(value),
        None => detect_xcrun(&ws.host),
    };
    log_host_diagnostics(opts.xcrun);

    for variant in variants {
        println!("Building {}", variant.name);
        let outcome = build_variant(ws, variant, &opts)
            .with_context(|| format!("Failed to build variant {}", variant.name))?;
        match outcome {
            BuildOutcome::DryRun { environment, flags } => {
                println!("Environment:\n\n{environment}\n");
                println!("CMake:\n\n{}\n", flags.join(" "));
            }
            BuildOutcome::Built { install_prefix, .. } => {
                println!("Installed {} to {}", variant.name, install_prefix.display());
            }
        }
    }
    println!("All done.");
    Ok(())
}
