//! mxpack - build, fix and package MaterialX variants for rez
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! # Overview
//!
//! Each variant in the packaging configuration is built with CMake inside a
//! rez-resolved environment, relinked for its final install location, and
//! collected into a rez `package.py` manifest.
//!
//! # Layout
//!
//! ```text
//! <repo>/
//! ├── CMakeLists.txt            # MaterialX version source
//! ├── packaging/
//! │   ├── config.toml           # variants and dependency lists
//! │   └── package.py            # manifest template
//! └── build/
//!     └── materialx_build_<alias>/
//! ```

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Configuration file looked up under the repository when `--config` is absent.
pub const DEFAULT_CONFIG: &str = "packaging/config.toml";

#[derive(Debug, Parser)]
#[command(name = "mxpack")]
#[command(author, version, about = "Build and package MaterialX for rez on macOS")]
pub struct Cli {
    /// Packaging configuration (TOML, or JSON with a .json extension)
    #[arg(long, global = true, env = "MXPACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// MaterialX checkout
    #[arg(long, global = true, env = "MXPACK_REPO", default_value = ".")]
    pub repo: PathBuf,

    /// Show debug output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Configuration path, defaulting to `<repo>/packaging/config.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.repo.join(DEFAULT_CONFIG))
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the MaterialX version or query release counters
    Version {
        /// Print the next release counter
        #[arg(short, long)]
        next: bool,
        /// Print the latest release counter
        #[arg(short, long)]
        latest: bool,
        /// Package to search for (prefixed with the configured package name)
        #[arg(short = 'p', long)]
        package_name: Option<String>,
        /// Print the full package version for the current branch
        #[arg(long)]
        package: bool,
        /// Use `local` in place of the branch
        #[arg(long, requires = "package")]
        local: bool,
        /// Do not advance the release counter
        #[arg(long, requires = "package")]
        no_increment: bool,
    },
    /// List configured variants
    Variants,
    /// Build one or more variants
    Build {
        /// Variant name or alias
        #[arg(short, long, num_args = 1..)]
        name: Vec<String>,
        /// Variant id
        #[arg(short, long, num_args = 1..)]
        index: Vec<u32>,
        /// Root to install under
        #[arg(short, long)]
        root: PathBuf,
        /// Install directly into the root instead of root/<keys>
        #[arg(short, long)]
        exact_root: bool,
        /// Skip pre-fetching packages into the local cache
        #[arg(short = 'c', long)]
        no_cache: bool,
        /// Print the environment and CMake flags without building
        #[arg(short, long)]
        print_args: bool,
        /// Build folder (default: <repo>/build/materialx_build_<alias>)
        #[arg(short, long)]
        build: Option<PathBuf>,
        /// Parallel build jobs (default: logical CPU count)
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Run CMake through xcrun; accepts a boolean string (default: detected)
        #[arg(short = 'x', long)]
        xcrun: Option<String>,
    },
    /// Relink and re-sign a built variant for its final location
    #[command(name = "fix-rpath", alias = "fix_rpath")]
    FixRpath {
        /// Current package root
        #[arg(short, long)]
        root: PathBuf,
        /// Variant id
        #[arg(short, long)]
        index: u32,
        /// Final package root
        #[arg(short, long)]
        destination: PathBuf,
    },
    /// Generate the package manifest, optionally releasing it
    Package {
        /// Package folder (default: a new temporary folder)
        #[arg(short, long)]
        root: Option<PathBuf>,
        /// Package name to release under
        #[arg(short, long)]
        name: Option<String>,
        /// Version to release as
        #[arg(short, long)]
        version: Option<String>,
        /// Publish the manifest and tag the release
        #[arg(long)]
        release: bool,
        /// Folders to look under for built variants
        #[arg(short, long, num_args = 1..)]
        path: Vec<PathBuf>,
        /// Look under the precache instead
        #[arg(short, long)]
        cache_path: bool,
    },
    /// Release a built variant into the precache
    Release {
        /// Folder to release from
        #[arg(short, long)]
        root: PathBuf,
        /// Variant id
        #[arg(short, long)]
        index: u32,
        /// Package name to release under
        #[arg(short, long)]
        name: Option<String>,
        /// Version to release as
        #[arg(short, long)]
        version: Option<String>,
    },
    /// Build entry point for rez-build (reads REZ_BUILD_* variables)
    #[command(name = "rez-build")]
    RezBuild,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fix_rpath_alias() {
        let cli = Cli::try_parse_from([
            "mxpack", "fix_rpath", "-r", "/tmp/a", "-i", "2", "-d", "/tmp/b",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::FixRpath { index: 2, .. }));
    }

    #[test]
    fn test_build_multiple_names() {
        let cli =
            Cli::try_parse_from(["mxpack", "build", "-n", "maya2024", "py", "-r", "/out"]).unwrap();
        match cli.command {
            Commands::Build { name, index, .. } => {
                assert_eq!(name, ["maya2024", "py"]);
                assert!(index.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_config_defaults_under_repo() {
        let cli = Cli {
            config: None,
            repo: PathBuf::from("/src/MaterialX"),
            verbose: false,
            command: Commands::Variants,
        };
        assert_eq!(
            cli.config_path(),
            PathBuf::from("/src/MaterialX/packaging/config.toml")
        );
    }

    #[test]
    fn test_explicit_config_wins() {
        let cli = Cli::try_parse_from([
            "mxpack",
            "--config",
            "/etc/mxpack.json",
            "--repo",
            "/src/MaterialX",
            "variants",
        ])
        .unwrap();
        assert_eq!(cli.config_path(), PathBuf::from("/etc/mxpack.json"));
    }
}
