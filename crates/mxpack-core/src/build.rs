//! CMake configuration and build of one variant.
//!
//! A build resolves the variant's package list into an environment, derives
//! the CMake cache entries from that environment, then runs the configure
//! and `install` steps inside the variant's build folder.
//!
//! ## Cache entries
//!
//! | Entry | Value |
//! |---|---|
//! | `CMAKE_OSX_ARCHITECTURES` | Variant architectures, `;` separated |
//! | `CMAKE_INSTALL_PREFIX` | Install root, plus the variant keys unless exact |
//! | `CMAKE_BUILD_TYPE` | `RelWithDebInfo` |
//! | `MATERIALX_BUILD_PYTHON` | Off inside a Maya variant |
//! | `MATERIALX_BUILD_VIEWER` | Off inside a Maya variant |
//! | `MATERIALX_BUILD_SHARED_LIBS` | On |
//! | `MATERIALX_PYTHON_EXECUTABLE` | `mayapy` or the rez Python framework binary |
//! | `MATERIALX_BUILD_GRAPH_EDITOR` | Off inside a Maya variant |
//! | `MATERIALX_BUILD_TESTS` | Off |

use crate::awake::KeepAwake;
use crate::context::Workspace;
use crate::env::{EnvError, Environment, resolve_environment};
use crate::packages::package_list;
use crate::tools::{CMakeInvocation, ToolError, ToolOutput};
use mxpack_schema::{Arch, Variant};
use regex::{Captures, Regex};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::info;

/// Build configuration used for every variant.
pub const BUILD_TYPE: &str = "RelWithDebInfo";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"));

/// Errors from building a variant.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The build environment could not be resolved.
    #[error(transparent)]
    Env(#[from] EnvError),

    /// A cache entry needs a variable the environment does not define.
    #[error("Environment variable {0} is required by the CMake arguments but not set")]
    MissingVariable(String),

    /// A build or install directory could not be created.
    #[error("Failed to create {path}: {source}")]
    Io {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An external tool could not be run.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The configure step exited unsuccessfully.
    #[error("Failed to generate project: {code:?}")]
    Configure {
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },

    /// The build or install step exited unsuccessfully.
    #[error("Failed to build: {code:?}")]
    Compile {
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },
}

/// Value of one CMake cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CMakeValue {
    /// Path or string.
    Str(String),
    /// Boolean, written `TRUE`/`FALSE`.
    Bool(bool),
}

impl fmt::Display for CMakeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
        }
    }
}

/// Ordered CMake cache entries for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CMakeArgs(Vec<(&'static str, CMakeValue)>);

impl CMakeArgs {
    fn push(&mut self, key: &'static str, value: CMakeValue) {
        self.0.push((key, value));
    }

    /// Look up an entry.
    pub fn get(&self, key: &str) -> Option<&CMakeValue> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &CMakeValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Entries as `-DKEY=VALUE` flags.
    pub fn to_flags(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("-D{k}={v}")).collect()
    }

    /// `CMAKE_INSTALL_PREFIX`.
    pub fn install_prefix(&self) -> Option<&str> {
        match self.get("CMAKE_INSTALL_PREFIX")? {
            CMakeValue::Str(s) => Some(s),
            CMakeValue::Bool(_) => None,
        }
    }
}

/// Replace every `{NAME}` in `template` with the variable from `env`.
///
/// # Errors
///
/// Returns [`BuildError::MissingVariable`] naming the first unset variable.
pub fn expand_placeholders(template: &str, env: &Environment) -> Result<String, BuildError> {
    if let Some(missing) = PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .find(|name| !env.contains(name))
    {
        return Err(BuildError::MissingVariable(missing));
    }

    Ok(PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            env.get(&caps[1]).unwrap_or_default().to_string()
        })
        .into_owned())
}

/// Root of a resolved package, using its `osx/` sub-directory when present.
///
/// Older packages keep their payload under `osx/` instead of a platform
/// variant.
///
/// # Errors
///
/// Returns [`BuildError::MissingVariable`] if `REZ_<PACKAGE>_ROOT` is unset.
pub fn package_root(package: &str, env: &Environment) -> Result<PathBuf, BuildError> {
    let var = format!("REZ_{}_ROOT", package.to_uppercase());
    let root = PathBuf::from(env.get(&var).ok_or(BuildError::MissingVariable(var))?);
    let osx = root.join("osx");
    Ok(if osx.exists() { osx } else { root })
}

/// Derive the CMake cache entries for `variant` installed under `root`.
///
/// # Errors
///
/// Returns [`BuildError::MissingVariable`] when the environment lacks a
/// variable the Python executable path needs.
pub fn cmake_args(
    variant: &Variant,
    root: &Path,
    env: &Environment,
    exact_root: bool,
) -> Result<CMakeArgs, BuildError> {
    let mut prefix = root.to_path_buf();
    if !exact_root {
        prefix.extend(&variant.keys);
    }

    let is_maya = env.get("REZ_MAYA_ROOT").is_some_and(|r| !r.is_empty());
    let build_extras = !is_maya;

    let python = if is_maya {
        format!(
            "{}/Applications/Autodesk/maya{{REZ_MAYA_MAJOR_VERSION}}/Maya.app/Contents/bin/mayapy",
            package_root("maya", env)?.display()
        )
    } else {
        format!(
            "{}/Python.framework/Versions/{{REZ_PYTHON_MAJOR_VERSION}}.{{REZ_PYTHON_MINOR_VERSION}}/bin/python{{REZ_PYTHON_MAJOR_VERSION}}",
            package_root("python", env)?.display()
        )
    };

    let mut args = CMakeArgs::default();
    args.push(
        "CMAKE_OSX_ARCHITECTURES",
        CMakeValue::Str(Arch::cmake_list(&variant.architectures)),
    );
    args.push(
        "CMAKE_INSTALL_PREFIX",
        CMakeValue::Str(prefix.to_string_lossy().into_owned()),
    );
    args.push("CMAKE_BUILD_TYPE", CMakeValue::Str(BUILD_TYPE.to_string()));
    args.push("MATERIALX_BUILD_PYTHON", CMakeValue::Bool(build_extras));
    args.push("MATERIALX_BUILD_VIEWER", CMakeValue::Bool(build_extras));
    args.push("MATERIALX_BUILD_SHARED_LIBS", CMakeValue::Bool(true));
    args.push(
        "MATERIALX_PYTHON_EXECUTABLE",
        CMakeValue::Str(expand_placeholders(&python, env)?),
    );
    args.push("MATERIALX_BUILD_GRAPH_EDITOR", CMakeValue::Bool(build_extras));
    args.push("MATERIALX_BUILD_TESTS", CMakeValue::Bool(false));

    Ok(args)
}

/// How to build a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Install root.
    pub root: PathBuf,
    /// Install directly into `root` instead of `root/<keys>`.
    pub exact_root: bool,
    /// Pre-fetch the package list into the local cache.
    pub cache: bool,
    /// Resolve and report the environment and flags without building.
    pub print_args: bool,
    /// Build folder; defaults to `<repo>/build/materialx_build_<alias>`.
    pub build_folder: Option<PathBuf>,
    /// Parallel jobs; defaults to the logical CPU count.
    pub jobs: Option<usize>,
    /// Run CMake through `xcrun`.
    pub xcrun: bool,
}

impl BuildOptions {
    /// Defaults for installing under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exact_root: false,
            cache: true,
            print_args: false,
            build_folder: None,
            jobs: None,
            xcrun: false,
        }
    }
}

/// Result of [`build_variant`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// `print_args` was set; nothing was built.
    DryRun {
        /// `KEY=VALUE;` environment string.
        environment: String,
        /// `-D` flags.
        flags: Vec<String>,
    },
    /// The variant was configured, built and installed.
    Built {
        /// Folder CMake ran in.
        build_dir: PathBuf,
        /// Where the variant was installed.
        install_prefix: PathBuf,
    },
}

fn create_dir(path: &Path) -> Result<(), BuildError> {
    if !path.exists() {
        info!("Creating {}", path.display());
        std::fs::create_dir_all(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn echo_output(output: &ToolOutput) {
    if !output.stderr.is_empty() {
        eprintln!("\n\nstderr:\n\n {}", output.stderr);
    }
    if !output.stdout.is_empty() {
        eprintln!("\n\nstdout:\n\n {}", output.stdout);
    }
}

/// Print `CMakeFiles/CMakeError.log` from a failed build folder.
pub fn print_cmake_logs(build_dir: &Path) {
    let log = build_dir.join("CMakeFiles").join("CMakeError.log");
    match std::fs::read_to_string(&log) {
        Ok(content) => {
            eprintln!("Printing Contents of {}:", log.display());
            for line in content.lines() {
                eprintln!("\t{line}");
            }
            eprintln!("Finished Printing Contents of {}", log.display());
        }
        Err(_) => eprintln!("Could not find: {}", log.display()),
    }
}

/// Resolve, configure, build and install one variant.
///
/// # Errors
///
/// Returns an error if the environment cannot be resolved, a required
/// variable is missing, a directory cannot be created, or a CMake step
/// fails.
pub fn build_variant(
    ws: &Workspace,
    variant: &Variant,
    opts: &BuildOptions,
) -> Result<BuildOutcome, BuildError> {
    let _awake = KeepAwake::start();
    info!("Building {}", variant.name);

    let packages = package_list(&ws.config, variant);
    if opts.cache {
        ws.tools.deployer.cache(&packages)?;
    }

    let env = resolve_environment(ws.tools.resolver.as_ref(), &packages, &ws.host)?;
    let args = cmake_args(variant, &opts.root, &env, opts.exact_root)?;
    let flags = args.to_flags();

    if opts.print_args {
        return Ok(BuildOutcome::DryRun {
            environment: env.to_env_string(),
            flags,
        });
    }

    let build_dir = opts
        .build_folder
        .clone()
        .unwrap_or_else(|| ws.settings.build_folder(&variant.alias));
    let install_prefix = PathBuf::from(args.install_prefix().unwrap_or_default());
    info!("Building in {}", build_dir.display());
    create_dir(&build_dir)?;
    create_dir(&install_prefix)?;

    let capture = ws.host.developer_dir.is_some() || env.contains("DEVELOPER_DIR");
    if capture {
        info!("Redirecting cmake output...");
    } else {
        info!("Not redirecting cmake output...");
    }

    let invocation = CMakeInvocation {
        build_dir: &build_dir,
        source_dir: &ws.settings.repo,
        flags: &flags,
        env: &env,
        build_type: BUILD_TYPE,
        jobs: opts.jobs.unwrap_or_else(num_cpus::get),
        xcrun: opts.xcrun,
        capture,
    };

    let configured = ws.tools.builder.configure(&invocation)?;
    echo_output(&configured);
    if !configured.success() {
        print_cmake_logs(&build_dir);
        return Err(BuildError::Configure {
            code: configured.code,
        });
    }

    let built = ws.tools.builder.build_install(&invocation)?;
    echo_output(&built);
    if !built.success() {
        print_cmake_logs(&build_dir);
        return Err(BuildError::Compile { code: built.code });
    }

    info!("Finished build of {}", variant.name);
    Ok(BuildOutcome::Built {
        build_dir,
        install_prefix,
    })
}
