//! Narrow interfaces over the external command-line tools.
//!
//! Orchestration code never spawns processes directly: it talks to the
//! traits below, and [`Toolbox::system`] wires in the real implementations.
//! Tests swap in in-memory fakes.

pub mod cmake;
pub mod codesign;
pub mod deploy;
pub mod git;
pub mod macho;
pub mod rez;

#[cfg(test)]
pub(crate) mod fakes;

use crate::env::{Environment, HostEnv};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;

/// Errors from spawning or running an external tool.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The executable is not installed or not on `PATH`.
    #[error("'{tool}' not found. {hint}")]
    NotFound {
        /// Executable name.
        tool: &'static str,
        /// How to get it.
        hint: &'static str,
    },

    /// The process could not be started.
    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        /// Executable name.
        tool: &'static str,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("{tool} failed with exit code {code:?}: {stderr}")]
    Failed {
        /// Executable name.
        tool: &'static str,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The process succeeded but printed something we could not interpret.
    #[error("Unexpected output from {tool}: {detail}")]
    Output {
        /// Executable name.
        tool: &'static str,
        /// What was wrong.
        detail: String,
    },
}

/// Exit status and captured streams of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout (empty when streamed to the terminal).
    pub stdout: String,
    /// Captured stderr (empty when streamed to the terminal).
    pub stderr: String,
}

impl ToolOutput {
    /// A successful, silent run.
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

fn install_hint(tool: &str) -> &'static str {
    match tool {
        "install_name_tool" | "otool" | "codesign" | "xcodebuild" | "xcrun" => {
            "Please install Xcode Command Line Tools: xcode-select --install"
        }
        "rez-env" | "rez-search" | "rez-deploy" | "rez-cache" => {
            "Run inside a rez environment or add rez to PATH."
        }
        "cmake" => "Add cmake to the resolved environment.",
        "git" => "Please install git.",
        _ => "Check that it is installed and on PATH.",
    }
}

/// Run `cmd`, either capturing its output or streaming it to the terminal.
pub(crate) fn execute(
    tool: &'static str,
    cmd: &mut Command,
    capture: bool,
) -> Result<ToolOutput, ToolError> {
    tracing::debug!("Running {cmd:?}");

    let spawn_err = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ToolError::NotFound {
                tool,
                hint: install_hint(tool),
            }
        } else {
            ToolError::Spawn { tool, source: e }
        }
    };

    if capture {
        let output = cmd.output().map_err(spawn_err)?;
        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    } else {
        let status = cmd.status().map_err(spawn_err)?;
        Ok(ToolOutput {
            code: status.code(),
            ..ToolOutput::default()
        })
    }
}

/// Run `cmd` capturing output, turning a non-zero exit into [`ToolError::Failed`].
pub(crate) fn checked(tool: &'static str, cmd: &mut Command) -> Result<ToolOutput, ToolError> {
    let output = execute(tool, cmd, true)?;
    if !output.success() {
        return Err(ToolError::Failed {
            tool,
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Computes concrete environments through the package manager.
pub trait Resolver {
    /// Resolve `request` and return the environment it produces.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Failed`] carrying the resolver's failure
    /// description when the request cannot be satisfied.
    fn resolve(&self, request: &[String]) -> Result<Environment, ToolError>;

    /// Every released version of `package`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the search tool fails.
    fn versions(&self, package: &str) -> Result<Vec<String>, ToolError>;
}

/// Everything needed for one CMake step.
#[derive(Debug, Clone)]
pub struct CMakeInvocation<'a> {
    /// Build (binary) directory; the working directory of both steps.
    pub build_dir: &'a Path,
    /// Source directory holding the top-level `CMakeLists.txt`.
    pub source_dir: &'a Path,
    /// `-D` flags for the configure step.
    pub flags: &'a [String],
    /// Complete environment for the child process.
    pub env: &'a Environment,
    /// Configuration passed to `--config`.
    pub build_type: &'a str,
    /// Parallel job count passed to the generator.
    pub jobs: usize,
    /// Run the configure step through `xcrun`.
    pub xcrun: bool,
    /// Capture stdout/stderr instead of streaming them.
    pub capture: bool,
}

/// Drives the external build system.
pub trait Builder {
    /// Generate the build tree.
    ///
    /// # Errors
    ///
    /// Returns an error only when the process could not be run; a non-zero
    /// exit is reported through [`ToolOutput::code`].
    fn configure(&self, invocation: &CMakeInvocation<'_>) -> Result<ToolOutput, ToolError>;

    /// Compile and run the `install` target.
    ///
    /// # Errors
    ///
    /// Returns an error only when the process could not be run.
    fn build_install(&self, invocation: &CMakeInvocation<'_>) -> Result<ToolOutput, ToolError>;
}

/// Applies code signatures.
pub trait Signer {
    /// Replace the signature of `path` with an ad-hoc one.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing tool fails.
    fn sign(&self, path: &Path) -> Result<(), ToolError>;
}

/// Reads and edits Mach-O load commands.
pub trait LinkEditor {
    /// Append `rpath` to the binary's runtime search paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the edit tool fails (e.g. the rpath already exists).
    fn add_rpath(&self, path: &Path, rpath: &Path) -> Result<(), ToolError>;

    /// Library paths the binary links against.
    ///
    /// # Errors
    ///
    /// Returns an error if the inspection tool fails.
    fn linked_libraries(&self, path: &Path) -> Result<Vec<String>, ToolError>;
}

/// Version control queries and release tags.
pub trait Vcs {
    /// Name of the checked-out branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the VCS tool fails.
    fn branch(&self) -> Result<String, ToolError>;

    /// Hash of the current commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the VCS tool fails.
    fn head_commit(&self) -> Result<String, ToolError>;

    /// Create and publish an annotated tag.
    ///
    /// # Errors
    ///
    /// Returns an error if tagging or pushing fails.
    fn create_tag(&self, tag: &str, message: &str) -> Result<(), ToolError>;
}

/// Publishes packages to the studio package repository.
pub trait Deployer {
    /// Pre-fetch packages into the local package cache.
    ///
    /// # Errors
    ///
    /// Returns an error if caching fails.
    fn cache(&self, packages: &[String]) -> Result<(), ToolError>;

    /// Release the manifest found in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the release fails.
    fn deploy_manifest(&self, dir: &Path, name: &str, version: &str) -> Result<(), ToolError>;

    /// Release the built variant found in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the release fails.
    fn deploy_variant(
        &self,
        dir: &Path,
        name: &str,
        version: &str,
        keys: &[String],
    ) -> Result<(), ToolError>;

    /// Root directory released variants are precached under.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be determined.
    fn precache_root(&self) -> Result<PathBuf, ToolError>;
}

impl<T: Resolver + ?Sized> Resolver for Arc<T> {
    fn resolve(&self, request: &[String]) -> Result<Environment, ToolError> {
        (**self).resolve(request)
    }
    fn versions(&self, package: &str) -> Result<Vec<String>, ToolError> {
        (**self).versions(package)
    }
}

impl<T: Builder + ?Sized> Builder for Arc<T> {
    fn configure(&self, invocation: &CMakeInvocation<'_>) -> Result<ToolOutput, ToolError> {
        (**self).configure(invocation)
    }
    fn build_install(&self, invocation: &CMakeInvocation<'_>) -> Result<ToolOutput, ToolError> {
        (**self).build_install(invocation)
    }
}

impl<T: Signer + ?Sized> Signer for Arc<T> {
    fn sign(&self, path: &Path) -> Result<(), ToolError> {
        (**self).sign(path)
    }
}

impl<T: LinkEditor + ?Sized> LinkEditor for Arc<T> {
    fn add_rpath(&self, path: &Path, rpath: &Path) -> Result<(), ToolError> {
        (**self).add_rpath(path, rpath)
    }
    fn linked_libraries(&self, path: &Path) -> Result<Vec<String>, ToolError> {
        (**self).linked_libraries(path)
    }
}

impl<T: Vcs + ?Sized> Vcs for Arc<T> {
    fn branch(&self) -> Result<String, ToolError> {
        (**self).branch()
    }
    fn head_commit(&self) -> Result<String, ToolError> {
        (**self).head_commit()
    }
    fn create_tag(&self, tag: &str, message: &str) -> Result<(), ToolError> {
        (**self).create_tag(tag, message)
    }
}

impl<T: Deployer + ?Sized> Deployer for Arc<T> {
    fn cache(&self, packages: &[String]) -> Result<(), ToolError> {
        (**self).cache(packages)
    }
    fn deploy_manifest(&self, dir: &Path, name: &str, version: &str) -> Result<(), ToolError> {
        (**self).deploy_manifest(dir, name, version)
    }
    fn deploy_variant(
        &self,
        dir: &Path,
        name: &str,
        version: &str,
        keys: &[String],
    ) -> Result<(), ToolError> {
        (**self).deploy_variant(dir, name, version, keys)
    }
    fn precache_root(&self) -> Result<PathBuf, ToolError> {
        (**self).precache_root()
    }
}

/// The set of external tool adapters used by every operation.
pub struct Toolbox {
    /// Package environment resolver.
    pub resolver: Box<dyn Resolver>,
    /// Build system driver.
    pub builder: Box<dyn Builder>,
    /// Code signer.
    pub signer: Box<dyn Signer>,
    /// Mach-O inspector/editor.
    pub linker: Box<dyn LinkEditor>,
    /// Version control.
    pub vcs: Box<dyn Vcs>,
    /// Package publisher.
    pub deployer: Box<dyn Deployer>,
}

impl fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolbox").finish_non_exhaustive()
    }
}

impl Toolbox {
    /// Adapters backed by the real command-line tools.
    pub fn system(host: &HostEnv, repo: &Path) -> Self {
        Self {
            resolver: Box::new(rez::Rez),
            builder: Box::new(cmake::CMake),
            signer: Box::new(codesign::Codesign),
            linker: Box::new(macho::MachOTools),
            vcs: Box::new(git::Git::new(repo)),
            deployer: Box::new(deploy::RezDeploy::new(host.omnilauncher_root.is_some())),
        }
    }
}
