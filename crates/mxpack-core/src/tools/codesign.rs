use super::{Signer, ToolError, checked};
use std::path::Path;
use std::process::Command;

/// Ad-hoc signing with `codesign`.
///
/// Any edit to a Mach-O header invalidates its signature, and arm64 macOS
/// refuses to load unsigned code, so every patched artifact goes through
/// here.
#[derive(Debug, Default, Clone, Copy)]
pub struct Codesign;

impl Signer for Codesign {
    fn sign(&self, path: &Path) -> Result<(), ToolError> {
        checked(
            "codesign",
            Command::new("codesign")
                .args([
                    "-s",
                    "-",
                    "--force",
                    "--deep",
                    "--preserve-metadata=entitlements,identifier",
                ])
                .arg(path),
        )?;
        Ok(())
    }
}
