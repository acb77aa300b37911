//! Makes a build tree relocatable to its deployed location.
//!
//! The fix pass runs in a fixed order over the output of one variant build:
//!
//! 1. **scan** the tree and bucket files into binaries, scripts, libraries
//!    and module descriptors.
//! 2. **module-patch**: rewrite the build root embedded in `.mod` files to
//!    the variant's final root.
//! 3. **rpath-patch**: add `<destination>/<keys>/lib` to every binary and
//!    library.
//! 4. **re-sign**: editing load commands breaks the signature, so each
//!    patched file is signed again.
//! 5. **verify**: every linked library must resolve inside an allowed
//!    location. All offenders are collected before failing.

use crate::context::Workspace;
use crate::tools::macho::is_macho;
use crate::tools::{LinkEditor, Signer, ToolError};
use mxpack_schema::{ConfigError, Variant, VariantRef};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Library locations every macOS process may link against.
const SYSTEM_PREFIXES: &[&str] = &["@", "/usr/lib/", "/System/Library/"];

/// Stray library references per artifact.
pub type ExternalLinks = BTreeMap<PathBuf, BTreeSet<String>>;

fn format_links(links: &ExternalLinks) -> String {
    let mut out = String::new();
    for (artifact, refs) in links {
        let _ = writeln!(out, "  {}:", artifact.display());
        for r in refs {
            let _ = writeln!(out, "    {r}");
        }
    }
    out
}

/// Errors from the fix pass.
#[derive(Error, Debug)]
pub enum FixError {
    /// The variant to fix is not configured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The output tree could not be walked.
    #[error("Failed to scan build output: {0}")]
    Walk(#[from] walkdir::Error),

    /// The build root or a module descriptor could not be accessed.
    #[error("Failed to access {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Re-signing a patched artifact failed.
    #[error("Could not codesign {path}: {source}")]
    Sign {
        /// Artifact that failed.
        path: PathBuf,
        /// Signing tool error.
        source: ToolError,
    },

    /// Linked libraries of an artifact could not be listed.
    #[error("Could not inspect {path}: {source}")]
    Inspect {
        /// Artifact that failed.
        path: PathBuf,
        /// Inspection tool error.
        source: ToolError,
    },

    /// Artifacts still reference libraries outside the allowed locations.
    #[error("Failed to remove external links:\n{}", format_links(.0))]
    ExternalLinks(ExternalLinks),
}

/// How a file in the build output is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    /// Mach-O executable in a `bin` directory.
    Binary,
    /// Non Mach-O executable in a `bin` directory.
    Script,
    /// `.dylib`, `.so` or `.bundle`.
    Library,
    /// `.mod` module descriptor.
    Module,
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

/// Classify `path`, or `None` when the fix pass ignores it.
pub fn classify(path: &Path) -> Option<ArtifactKind> {
    let in_bin = path
        .parent()
        .and_then(Path::file_name)
        .is_some_and(|n| n == "bin");
    if in_bin && is_executable(path) {
        return Some(if is_macho(path) {
            ArtifactKind::Binary
        } else {
            ArtifactKind::Script
        });
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("dylib" | "so" | "bundle") => Some(ArtifactKind::Library),
        Some("mod") => Some(ArtifactKind::Module),
        _ => None,
    }
}

/// Files found under a build output tree, bucketed and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    /// Mach-O executables.
    pub binaries: Vec<PathBuf>,
    /// Executable scripts (left untouched).
    pub scripts: Vec<PathBuf>,
    /// Shared libraries and bundles.
    pub libraries: Vec<PathBuf>,
    /// Module descriptors.
    pub modules: Vec<PathBuf>,
}

impl Scan {
    /// Binaries and libraries: everything that gets an rpath and a signature.
    pub fn linked(&self) -> impl Iterator<Item = &PathBuf> {
        self.libraries.iter().chain(&self.binaries)
    }
}

/// Walk `start` and classify every file.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked.
pub fn scan(start: &Path) -> Result<Scan, FixError> {
    let mut found = Scan::default();
    for entry in walkdir::WalkDir::new(start).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        match classify(&path) {
            Some(ArtifactKind::Binary) => found.binaries.push(path),
            Some(ArtifactKind::Script) => found.scripts.push(path),
            Some(ArtifactKind::Library) => found.libraries.push(path),
            Some(ArtifactKind::Module) => found.modules.push(path),
            None => {}
        }
    }
    Ok(found)
}

fn patch_line(line: &str, old_root: &str, new_root: &str, key_path: &str) -> String {
    let replaced = line.replace(old_root, new_root);
    if key_path.is_empty() || !replaced.contains(key_path) {
        return replaced;
    }

    // A naive replace can nest the key path when the new root contains the
    // old one; keep the text around its first and last occurrence.
    let pre = replaced.split(key_path).next().unwrap_or_default();
    let post = replaced.rsplit(key_path).next().unwrap_or_default();
    format!("{pre}{key_path}{post}")
}

/// Rewrite `old_root` to `new_root` in module descriptor text.
///
/// Returns `None` when no line changed. Applying the patch to its own
/// output changes nothing.
pub fn patch_module_text(
    text: &str,
    old_root: &str,
    new_root: &str,
    key_path: &str,
) -> Option<String> {
    let mut changed = false;
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let patched = patch_line(line, old_root, new_root, key_path);
        if patched != line {
            debug!("{} ---> {}", line.trim_end(), patched.trim_end());
            changed = true;
        }
        out.push_str(&patched);
    }
    changed.then_some(out)
}

/// Patch a module descriptor in place; the file is only written when a line
/// changed. Returns whether it was rewritten.
///
/// # Errors
///
/// Returns [`FixError::Io`] if the file cannot be read or written.
pub fn patch_module_file(
    path: &Path,
    old_root: &Path,
    new_root: &Path,
    key_path: &str,
) -> Result<bool, FixError> {
    let io_err = |source| FixError::Io {
        path: path.to_path_buf(),
        source,
    };
    let text = std::fs::read_to_string(path).map_err(io_err)?;

    let Some(patched) = patch_module_text(
        &text,
        &old_root.to_string_lossy(),
        &new_root.to_string_lossy(),
        key_path,
    ) else {
        info!("No requirement to modify {}", path.display());
        return Ok(false);
    };

    info!("Modifying {}", path.display());
    std::fs::write(path, patched).map_err(io_err)?;
    Ok(true)
}

/// Counts from a completed fix pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixReport {
    /// Mach-O executables patched.
    pub binaries: usize,
    /// Scripts seen (not modified).
    pub scripts: usize,
    /// Libraries patched.
    pub libraries: usize,
    /// Module descriptors seen.
    pub modules: usize,
    /// Module descriptors rewritten.
    pub modules_rewritten: usize,
}

/// Applies the fix pass with a given set of tools.
pub struct Relinker<'a> {
    editor: &'a dyn LinkEditor,
    signer: &'a dyn Signer,
    apps_root: &'a Path,
}

impl std::fmt::Debug for Relinker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relinker")
            .field("apps_root", &self.apps_root)
            .finish_non_exhaustive()
    }
}

impl<'a> Relinker<'a> {
    /// A relinker allowing references into `apps_root`.
    pub fn new(editor: &'a dyn LinkEditor, signer: &'a dyn Signer, apps_root: &'a Path) -> Self {
        Self {
            editor,
            signer,
            apps_root,
        }
    }

    /// Whether `reference` points somewhere a deployed artifact may link to.
    pub fn is_allowed(&self, reference: &str, ignore: &[&Path]) -> bool {
        SYSTEM_PREFIXES.iter().any(|p| reference.starts_with(p))
            || reference.starts_with(&*self.apps_root.to_string_lossy())
            || ignore.iter().any(|i| Path::new(reference).starts_with(i))
    }

    /// Library references of `artifact` outside the allowed locations.
    ///
    /// # Errors
    ///
    /// Returns [`FixError::Inspect`] if the references cannot be listed.
    pub fn external_links(
        &self,
        artifact: &Path,
        ignore: &[&Path],
    ) -> Result<BTreeSet<String>, FixError> {
        let libraries =
            self.editor
                .linked_libraries(artifact)
                .map_err(|source| FixError::Inspect {
                    path: artifact.to_path_buf(),
                    source,
                })?;
        Ok(libraries
            .into_iter()
            .filter(|r| !self.is_allowed(r, ignore))
            .collect())
    }

    /// Fix the build output at `start` for deployment under `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning, module patching, signing or
    /// inspection fails, or [`FixError::ExternalLinks`] with every
    /// offending artifact when verification fails.
    pub fn fix(
        &self,
        start: &Path,
        destination: &Path,
        variant: &Variant,
    ) -> Result<FixReport, FixError> {
        // Module descriptors record the absolute install prefix.
        let start = &std::fs::canonicalize(start).map_err(|source| FixError::Io {
            path: start.to_path_buf(),
            source,
        })?;
        let mut variant_root = destination.to_path_buf();
        variant_root.extend(&variant.keys);
        let lib_root = variant_root.join("lib");
        info!(
            "Fixing rpaths under {} to {} with {}",
            start.display(),
            destination.display(),
            variant_root.display()
        );

        let found = scan(start)?;
        let key_path = variant.key_path();

        let mut modules_rewritten = 0;
        for module in &found.modules {
            if patch_module_file(module, start, &variant_root, &key_path)? {
                modules_rewritten += 1;
            }
        }

        let mut errors = ExternalLinks::new();
        for artifact in found.linked() {
            if let Err(e) = self.editor.add_rpath(artifact, &lib_root) {
                warn!("Could not add rpath to {}: {e}", artifact.display());
            }

            self.signer
                .sign(artifact)
                .map_err(|source| FixError::Sign {
                    path: artifact.clone(),
                    source,
                })?;

            let stray = self.external_links(artifact, &[start.as_path()])?;
            if !stray.is_empty() {
                errors.insert(artifact.clone(), stray);
            }
        }

        if !errors.is_empty() {
            return Err(FixError::ExternalLinks(errors));
        }

        info!("Completed fixing rpaths!");
        Ok(FixReport {
            binaries: found.binaries.len(),
            scripts: found.scripts.len(),
            libraries: found.libraries.len(),
            modules: found.modules.len(),
            modules_rewritten,
        })
    }
}

/// Fix the build output of `variant` at `start` for `destination`.
///
/// # Errors
///
/// Returns [`FixError::Config`] for an unknown variant, otherwise see
/// [`Relinker::fix`].
pub fn fix_rpaths(
    ws: &Workspace,
    start: &Path,
    destination: &Path,
    variant: &VariantRef,
) -> Result<FixReport, FixError> {
    let variant = ws.config.variant(variant)?;
    Relinker::new(
        ws.tools.linker.as_ref(),
        ws.tools.signer.as_ref(),
        ws.apps_root(),
    )
    .fix(start, destination, variant)
}
