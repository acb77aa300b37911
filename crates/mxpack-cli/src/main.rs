//! mxpack - MaterialX rez packaging CLI

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mxpack_cli::cmd;
use mxpack_cli::cmd::build::Selection;
use mxpack_cli::cmd::version::Query;
use mxpack_cli::{Cli, Commands};
use mxpack_core::build::BuildOptions;
use mxpack_core::manifest::PackageOptions;
use mxpack_core::version::VersionMode;
use mxpack_core::{HostEnv, Workspace};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    // Plain `version` only reads CMakeLists.txt.
    if let Commands::Version {
        next: false,
        latest: false,
        package: false,
        ..
    } = &cli.command
    {
        return cmd::version::print_materialx(&cli.repo);
    }

    let config_path = cli.config_path();
    let ws = Workspace::open(&cli.repo, &config_path, HostEnv::capture())
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    tracing::debug!("{ws:?}");

    match cli.command {
        Commands::Version {
            next,
            latest,
            package_name,
            package,
            local,
            no_increment,
        } => {
            let query = if package {
                Query::Package(VersionMode {
                    local,
                    increment: !no_increment,
                })
            } else if next {
                Query::Next
            } else if latest {
                Query::Latest
            } else {
                Query::MaterialX
            };
            cmd::version::version(&ws, query, package_name.as_deref())
        }
        Commands::Variants => {
            cmd::variants::variants(&ws.config);
            Ok(())
        }
        Commands::Build {
            name,
            index,
            root,
            exact_root,
            no_cache,
            print_args,
            build,
            jobs,
            xcrun,
        } => {
            let mut opts = BuildOptions::new(root);
            opts.exact_root = exact_root;
            opts.cache = !no_cache;
            opts.print_args = print_args;
            opts.build_folder = build;
            opts.jobs = jobs;
            let selection = Selection { names: name, ids: index };
            cmd::build::build(&ws, &selection, opts, xcrun.as_deref())
        }
        Commands::FixRpath {
            root,
            index,
            destination,
        } => cmd::fix_rpath::fix_rpath(&ws, &root, index, &destination),
        Commands::Package {
            root,
            name,
            version,
            release,
            path,
            cache_path,
        } => {
            let opts = PackageOptions {
                dest: root,
                name,
                version,
                release,
                paths: path,
                cache_path,
            };
            cmd::package::package(&ws, &opts)
        }
        Commands::Release {
            root,
            index,
            name,
            version,
        } => cmd::release::release(&ws, &root, index, name.as_deref(), version.as_deref()),
        Commands::RezBuild => cmd::rez_build::rez_build(&ws),
    }
}
