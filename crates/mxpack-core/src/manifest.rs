//! Package manifest generation.
//!
//! The manifest (`package.py`) is rendered from a template whose lines may
//! carry a trailing directive comment:
//!
//! ```text
//! import utils  # orez-rm
//! version = utils.package_version()  # orez-sub: PACKAGE_VERSION
//! ```
//!
//! `orez-rm` drops the line. Any other command replaces the assigned value
//! with the named key, so the second line above renders as
//! `version = "main-1.38.8-a3"`.

use crate::context::Workspace;
use crate::release::tag_release;
use crate::tools::ToolError;
use crate::version::{VersionError, VersionMode};
use mxpack_schema::Config;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{info, warn};

/// File name of the generated manifest.
pub const MANIFEST_FILE: &str = "package.py";

/// Total width a pretty-printed assignment may use before lists wrap.
const LINE_WIDTH: usize = 120;

/// Files whose presence marks a variant as built or precached.
const VARIANT_MARKERS: &[&str] = &["README.md", "bundled_precache_files.zip"];

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#.*orez-([a-z]+)(?::\s*([A-Za-z_0-9]+))?").expect("static regex")
});

/// Errors from generating or releasing a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The template could not be read.
    #[error("Failed to read template {path}: {source}")]
    Template {
        /// Template path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The destination could not be created or written.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No search path holds a built or precached variant.
    #[error("Could not find any variants. Aborting build.")]
    NoVariants,

    /// The package name or version could not be determined.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// A tool needed to fill the manifest failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Publishing the manifest failed.
    #[error("Failed to release package: {0}")]
    Release(ToolError),
}

/// A parsed `orez-` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    /// `orez-rm`: drop the line.
    Remove,
    /// Any other command: substitute `key`.
    Substitute {
        /// Command name, e.g. `sub`.
        command: &'a str,
        /// Key to substitute; `None` leaves the line as is.
        key: Option<&'a str>,
    },
}

/// Find the directive on `line`, if any.
pub fn parse_directive(line: &str) -> Option<Directive<'_>> {
    let caps = DIRECTIVE.captures(line)?;
    let command = caps.get(1)?.as_str();
    if command == "rm" {
        return Some(Directive::Remove);
    }
    Some(Directive::Substitute {
        command,
        key: caps.get(2).map(|m| m.as_str()),
    })
}

/// A value substituted into the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestValue {
    /// Written double quoted.
    Str(String),
    /// Written bare.
    Int(i64),
    /// Written as a Python list.
    List(Vec<ManifestValue>),
}

impl From<&str> for ManifestValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ManifestValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<ManifestValue>> From<Vec<T>> for ManifestValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl ManifestValue {
    fn inline(&self) -> String {
        match self {
            Self::Str(s) => format!("\"{s}\""),
            Self::Int(n) => n.to_string(),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::inline).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }

    /// Render as the right-hand side of `<var> = `.
    ///
    /// Lists that do not fit in `120 - var_len` columns are written one
    /// element per line, indented `var_len + 4`, with the closing bracket
    /// indented `var_len`.
    pub fn render(&self, var_len: usize) -> String {
        let inline = self.inline();
        let Self::List(items) = self else {
            return inline;
        };
        if inline.len() <= LINE_WIDTH.saturating_sub(var_len) {
            return inline;
        }

        let indent = " ".repeat(var_len + 4);
        let body: Vec<String> = items
            .iter()
            .map(|item| format!("{indent}{}", item.inline()))
            .collect();
        format!("[\n{}\n{}]", body.join(",\n"), " ".repeat(var_len))
    }
}

/// Substitution keys by name.
pub type ManifestKeys = BTreeMap<String, ManifestValue>;

fn substitute(line: &str, key: &str, keys: &ManifestKeys) -> String {
    let var = line.split('=').next().unwrap_or(line).trim_end();
    let value = keys.get(key).cloned().unwrap_or_else(|| {
        warn!("Missing key: {key}");
        ManifestValue::Str(key.to_string())
    });
    format!("{var} = {}\n", value.render(var.len()))
}

/// Apply every directive in `template`.
pub fn render_template(template: &str, keys: &ManifestKeys) -> String {
    let mut out = String::with_capacity(template.len());
    for line in template.split_inclusive('\n') {
        match parse_directive(line) {
            Some(Directive::Remove) => {}
            Some(Directive::Substitute { key: Some(key), .. }) => {
                out.push_str(&substitute(line, key, keys));
            }
            _ => out.push_str(line),
        }
    }
    out
}

/// Key lists of every variant present under one of `search_paths`.
///
/// A variant is present when `<path>/<keys>/README.md` or
/// `<path>/<keys>/bundled_precache_files.zip` exists. Each variant is
/// listed once, in id order.
pub fn find_variants(config: &Config, search_paths: &[PathBuf]) -> Vec<Vec<String>> {
    let mut found = Vec::new();
    for variant in config.variants() {
        let hit = search_paths.iter().find(|path| {
            let mut dir = (*path).clone();
            dir.extend(&variant.keys);
            VARIANT_MARKERS.iter().any(|m| dir.join(m).exists())
        });

        match hit {
            Some(path) => {
                info!("Found variant {} in {}", variant.name, path.display());
                found.push(variant.keys.clone());
            }
            None => info!(
                "Could not find variant: {}. Not adding to list.",
                variant.name
            ),
        }
    }
    found
}

/// Name and version encoded in a destination under the apps root
/// (`<apps root>/<name>/<version>`).
pub fn name_version_from_dest(dest: &Path, apps_root: &Path) -> (Option<String>, Option<String>) {
    let Ok(rel) = dest.strip_prefix(apps_root) else {
        return (None, None);
    };
    let mut parts = rel.components().filter_map(|c| match c {
        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
        _ => None,
    });
    (parts.next(), parts.next())
}

/// Options for [`make_package`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageOptions {
    /// Destination folder; a fresh temporary directory when `None`.
    pub dest: Option<PathBuf>,
    /// Package name override.
    pub name: Option<String>,
    /// Package version override.
    pub version: Option<String>,
    /// Publish the manifest and tag the release.
    pub release: bool,
    /// Folders searched for built variants; defaults to the destination.
    pub paths: Vec<PathBuf>,
    /// Search the precache of this package version instead.
    pub cache_path: bool,
}

/// What [`make_package`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResult {
    /// Folder holding the manifest.
    pub dest: PathBuf,
    /// Written manifest.
    pub manifest: PathBuf,
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Variant key lists written to the manifest.
    pub variants: Vec<Vec<String>>,
    /// Whether the manifest was published.
    pub released: bool,
}

fn temp_destination() -> Result<PathBuf, ManifestError> {
    info!("Making temporary destination for package release");
    let dir = tempfile::Builder::new()
        .prefix("mxpack-package-")
        .tempdir()
        .map_err(|source| ManifestError::Write {
            path: std::env::temp_dir(),
            source,
        })?;
    Ok(dir.keep())
}

/// Render the package manifest and optionally release it.
///
/// # Errors
///
/// Returns [`ManifestError::NoVariants`] when no variant is found, an error
/// if the name, version or commit cannot be determined, if the template
/// cannot be read or the manifest written, or [`ManifestError::Release`]
/// if publishing fails. Tag creation failures are only logged.
pub fn make_package(ws: &Workspace, opts: &PackageOptions) -> Result<PackageResult, ManifestError> {
    let template_path = &ws.settings.template;
    let template =
        std::fs::read_to_string(template_path).map_err(|source| ManifestError::Template {
            path: template_path.clone(),
            source,
        })?;

    let (dest_name, dest_version) = match &opts.dest {
        Some(dest) => name_version_from_dest(dest, ws.apps_root()),
        None => (None, None),
    };
    let name = match opts.name.clone().or(dest_name) {
        Some(name) => name,
        None => ws.package_name(None)?,
    };
    let version = match opts.version.clone().or(dest_version) {
        Some(version) => version,
        None => ws.package_version(None, VersionMode::default())?,
    };

    let search_paths = if opts.cache_path {
        let precache = ws.tools.deployer.precache_root()?;
        info!("Cache path is {}", precache.display());
        vec![precache.join(&name).join(&version)]
    } else if opts.paths.is_empty() {
        opts.dest.iter().cloned().collect()
    } else {
        opts.paths.clone()
    };

    let variants = find_variants(&ws.config, &search_paths);
    if variants.is_empty() {
        return Err(ManifestError::NoVariants);
    }

    let mut keys = ManifestKeys::new();
    keys.insert("PACKAGE_NAME".into(), name.clone().into());
    keys.insert("PACKAGE_VERSION".into(), version.clone().into());
    keys.insert(
        "REQUIRES".into(),
        ws.config
            .requires(&[name.as_str(), ws.config.package.as_str()])
            .into(),
    );
    keys.insert(
        "TIMESTAMP".into(),
        ManifestValue::Int(chrono::Utc::now().timestamp()),
    );
    keys.insert(
        "COMMIT_HASH".into(),
        ws.tools.vcs.head_commit()?.into(),
    );
    keys.insert("VARIANT_LIST".into(), variants.clone().into());

    let dest = match &opts.dest {
        Some(dest) => dest.clone(),
        None => temp_destination()?,
    };
    let manifest = dest.join(MANIFEST_FILE);
    std::fs::create_dir_all(&dest).map_err(|source| ManifestError::Write {
        path: dest.clone(),
        source,
    })?;
    std::fs::write(&manifest, render_template(&template, &keys)).map_err(|source| {
        ManifestError::Write {
            path: manifest.clone(),
            source,
        }
    })?;
    info!("Wrote {}", manifest.display());

    if opts.release {
        info!("Releasing package {name}-{version}");
        ws.tools
            .deployer
            .deploy_manifest(&dest, &name, &version)
            .map_err(ManifestError::Release)?;
        info!("Released package");

        if let Err(e) = tag_release(ws.tools.vcs.as_ref(), &version) {
            warn!("Failed to tag {version} because {e}");
        }
    } else {
        info!("Release was not selected.");
    }

    Ok(PackageResult {
        dest,
        manifest,
        name,
        version,
        variants,
        released: opts.release,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Toolbox;
    use crate::tools::fakes::{FakeDeployer, FakeResolver, FakeVcs};
    use std::sync::Arc;

    const TEMPLATE: &str = "\
# -*- coding: utf-8 -*-
import sys  # orez-rm

name = \"materialx\"

version = utils.package_version()  # orez-sub: PACKAGE_VERSION

commit = utils.commit_hash()  # orez-sub: COMMIT_HASH

timestamp = 0  # orez-sub: TIMESTAMP

requires = []  # orez-sub:REQUIRES

variants = utils.rez_variant_list()  # orez-sub: VARIANT_LIST
";

    const CONFIG: &str = r#"
package = "materialx"
requires = ["materialx", "imath-3", "python"]

[branch_keys]
materialx = "main"

[variants.python39]
id = 0
alias = "py39"
keys = ["platform-osx", "python-3.9"]
enabled = true

[variants.maya2024]
id = 1
alias = "m24"
keys = ["platform-osx", "maya-2024"]
enabled = true

[variants.maya2025]
id = 2
alias = "m25"
keys = ["platform-osx", "maya-2025"]
"#;

    fn keys(pairs: Vec<(&str, ManifestValue)>) -> ManifestKeys {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_sub_and_rm() {
        let template = "import utils  # orez-rm\nversion = VALUE  # orez-sub:PACKAGE_VERSION\n";
        let rendered = render_template(
            template,
            &keys(vec![("PACKAGE_VERSION", "1.2.3".into())]),
        );
        assert_eq!(rendered, "version = \"1.2.3\"\n");
    }

    #[test]
    fn test_directive_forms() {
        assert_eq!(parse_directive("x = 1  # orez-rm"), Some(Directive::Remove));
        assert_eq!(
            parse_directive("x = 1  # orez-sub: KEY_1"),
            Some(Directive::Substitute {
                command: "sub",
                key: Some("KEY_1")
            })
        );
        assert_eq!(
            parse_directive("x = 1  # orez-sub"),
            Some(Directive::Substitute {
                command: "sub",
                key: None
            })
        );
        assert_eq!(parse_directive("x = 1  # orez is great"), None);
        assert_eq!(parse_directive("orez-rm without comment"), None);
    }

    #[test]
    fn test_integer_and_unknown_key() {
        let template = "timestamp = 0  # orez-sub: TIMESTAMP\nother = 1  # orez-sub: NOPE\n";
        let rendered = render_template(template, &keys(vec![("TIMESTAMP", ManifestValue::Int(42))]));
        assert_eq!(rendered, "timestamp = 42\nother = \"NOPE\"\n");
    }

    #[test]
    fn test_directive_without_key_unchanged() {
        let template = "x = compute()  # orez-sub\n";
        assert_eq!(render_template(template, &ManifestKeys::new()), template);
    }

    #[test]
    fn test_short_list_single_line() {
        let value: ManifestValue = vec![vec!["platform-osx", "python-3.9"]].into();
        assert_eq!(value.render(8), r#"[["platform-osx", "python-3.9"]]"#);
    }

    #[test]
    fn test_long_list_wraps() {
        let variants: Vec<Vec<&str>> = (0..6)
            .map(|_| vec!["platform-osx", "maya-2024", "python-3.10"])
            .collect();
        let rendered = ManifestValue::from(variants).render("variants".len());

        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "[");
        assert_eq!(
            lines[1],
            r#"            ["platform-osx", "maya-2024", "python-3.10"],"#
        );
        assert_eq!(lines[7], "        ]");
    }

    #[test]
    fn test_name_version_from_dest() {
        let apps = Path::new("/usr/local/apps");
        assert_eq!(
            name_version_from_dest(Path::new("/usr/local/apps/usd_main/main-1.38.8-a2"), apps),
            (Some("usd_main".to_string()), Some("main-1.38.8-a2".to_string()))
        );
        assert_eq!(
            name_version_from_dest(Path::new("/tmp/out"), apps),
            (None, None)
        );
    }

    #[test]
    fn test_find_variants_dedupes_and_orders() {
        let config = Config::parse(CONFIG).unwrap();
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for root in [a.path(), b.path()] {
            let dir = root.join("platform-osx/maya-2024");
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("README.md"), "").unwrap();
        }
        let dir = b.path().join("platform-osx/python-3.9");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bundled_precache_files.zip"), "").unwrap();

        let found = find_variants(&config, &[a.path().to_path_buf(), b.path().to_path_buf()]);
        assert_eq!(
            found,
            [
                vec!["platform-osx".to_string(), "python-3.9".to_string()],
                vec!["platform-osx".to_string(), "maya-2024".to_string()],
            ]
        );
    }

    struct Fixture {
        _repo: tempfile::TempDir,
        dest: tempfile::TempDir,
        ws: Workspace,
        vcs: Arc<FakeVcs>,
        deployer: Arc<FakeDeployer>,
    }

    fn fixture(vcs: FakeVcs, deployer: FakeDeployer) -> Fixture {
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join(MANIFEST_FILE), TEMPLATE).unwrap();
        std::fs::write(
            repo.path().join("CMakeLists.txt"),
            "set(MATERIALX_MAJOR_VERSION 1)\nset(MATERIALX_MINOR_VERSION 38)\nset(MATERIALX_BUILD_VERSION 8)\n",
        )
        .unwrap();

        let dest = tempfile::tempdir().unwrap();
        let built = dest.path().join("platform-osx/maya-2024");
        std::fs::create_dir_all(&built).unwrap();
        std::fs::write(built.join("README.md"), "").unwrap();

        let vcs = Arc::new(vcs);
        let deployer = Arc::new(deployer);
        let mut tools = Toolbox::fake();
        tools.resolver = Box::new(FakeResolver::with_versions(&["main-1.38.8-a1"]));
        tools.vcs = Box::new(vcs.clone());
        tools.deployer = Box::new(deployer.clone());

        let ws = Workspace::for_tests(repo.path(), Config::parse(CONFIG).unwrap(), tools);
        Fixture {
            _repo: repo,
            dest,
            ws,
            vcs,
            deployer,
        }
    }

    #[test]
    fn test_make_package_from_branch() {
        let fx = fixture(FakeVcs::default(), FakeDeployer::default());
        let opts = PackageOptions {
            dest: Some(fx.dest.path().to_path_buf()),
            ..PackageOptions::default()
        };

        let result = make_package(&fx.ws, &opts).unwrap();
        assert_eq!(result.name, "usd_main");
        assert_eq!(result.version, "main-1.38.8-a2");
        assert!(!result.released);

        let manifest = std::fs::read_to_string(&result.manifest).unwrap();
        assert!(!manifest.contains("import sys"));
        assert!(manifest.contains("version = \"main-1.38.8-a2\"\n"));
        assert!(manifest.contains("commit = \"0123abcd\"\n"));
        assert!(manifest.contains("requires = [\"imath-3\", \"python\"]\n"));
        assert!(manifest.contains("variants = [[\"platform-osx\", \"maya-2024\"]]\n"));
        assert!(manifest.contains("name = \"materialx\"\n"));
        assert!(fx.deployer.calls.borrow().is_empty());
        assert!(fx.vcs.tags.borrow().is_empty());
    }

    #[test]
    fn test_make_package_without_variants() {
        let fx = fixture(FakeVcs::default(), FakeDeployer::default());
        let empty = tempfile::tempdir().unwrap();
        let opts = PackageOptions {
            dest: Some(fx.dest.path().to_path_buf()),
            paths: vec![empty.path().to_path_buf()],
            ..PackageOptions::default()
        };
        assert!(matches!(
            make_package(&fx.ws, &opts),
            Err(ManifestError::NoVariants)
        ));
    }

    #[test]
    fn test_release_tags_version() {
        let fx = fixture(FakeVcs::default(), FakeDeployer::default());
        let opts = PackageOptions {
            dest: Some(fx.dest.path().to_path_buf()),
            name: Some("materialx".to_string()),
            version: Some("main-1.38.8-a5".to_string()),
            release: true,
            ..PackageOptions::default()
        };

        let result = make_package(&fx.ws, &opts).unwrap();
        assert!(result.released);
        assert_eq!(
            fx.deployer.calls.borrow().as_slice(),
            ["manifest materialx main-1.38.8-a5"]
        );
        assert_eq!(fx.vcs.tags.borrow().as_slice(), ["main-1.38.8-a5"]);
    }

    #[test]
    fn test_tag_failure_does_not_fail_release() {
        let vcs = FakeVcs {
            fail_tag: true,
            ..FakeVcs::default()
        };
        let fx = fixture(vcs, FakeDeployer::default());
        let opts = PackageOptions {
            dest: Some(fx.dest.path().to_path_buf()),
            version: Some("main-1.38.8-a5".to_string()),
            release: true,
            ..PackageOptions::default()
        };

        let result = make_package(&fx.ws, &opts).unwrap();
        assert!(result.released);
        assert!(fx.vcs.tags.borrow().is_empty());
    }

    #[test]
    fn test_release_failure_is_fatal() {
        let deployer = FakeDeployer {
            fail: true,
            ..FakeDeployer::default()
        };
        let fx = fixture(FakeVcs::default(), deployer);
        let opts = PackageOptions {
            dest: Some(fx.dest.path().to_path_buf()),
            release: true,
            ..PackageOptions::default()
        };

        assert!(matches!(
            make_package(&fx.ws, &opts),
            Err(ManifestError::Release(_))
        ));
        assert!(fx.vcs.tags.borrow().is_empty());
    }

    fn temp_packages() -> usize {
        std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("mxpack-package-"))
            .count()
    }

    #[test]
    fn test_failed_package_leaves_no_temp_destination() {
        let fx = fixture(FakeVcs::default(), FakeDeployer::default());
        let empty = tempfile::tempdir().unwrap();
        let before = temp_packages();

        let opts = PackageOptions {
            paths: vec![empty.path().to_path_buf()],
            ..PackageOptions::default()
        };
        assert!(matches!(
            make_package(&fx.ws, &opts),
            Err(ManifestError::NoVariants)
        ));

        std::fs::remove_file(&fx.ws.settings.template).unwrap();
        assert!(matches!(
            make_package(&fx.ws, &PackageOptions::default()),
            Err(ManifestError::Template { .. })
        ));

        assert_eq!(temp_packages(), before);
    }

    #[test]
    fn test_shipped_template_keeps_package_name() {
        let template = include_str!("../../../packaging/package.py");
        let fx = fixture(FakeVcs::default(), FakeDeployer::default());
        std::fs::write(&fx.ws.settings.template, template).unwrap();
        let opts = PackageOptions {
            dest: Some(fx.dest.path().to_path_buf()),
            ..PackageOptions::default()
        };

        let result = make_package(&fx.ws, &opts).unwrap();
        assert_eq!(result.name, "usd_main");

        let manifest = std::fs::read_to_string(&result.manifest).unwrap();
        assert!(manifest.contains("name = \"materialx\"\n"));
        assert!(manifest.contains("version = \"main-1.38.8-a2\"\n"));
        assert!(manifest.contains("requires = [\"imath-3\", \"python\"]\n"));
        assert!(!manifest.contains("orez-"));
        assert!(!manifest.contains("import os"));
    }

    #[test]
    fn test_cache_path_searches_precache() {
        let precache = tempfile::tempdir().unwrap();
        let built = precache
            .path()
            .join("usd_main/main-1.38.8-a2/platform-osx/python-3.9");
        std::fs::create_dir_all(&built).unwrap();
        std::fs::write(built.join("bundled_precache_files.zip"), "").unwrap();

        let deployer = FakeDeployer {
            precache: precache.path().to_path_buf(),
            ..FakeDeployer::default()
        };
        let fx = fixture(FakeVcs::default(), deployer);
        let opts = PackageOptions {
            dest: Some(fx.dest.path().to_path_buf()),
            cache_path: true,
            ..PackageOptions::default()
        };

        let result = make_package(&fx.ws, &opts).unwrap();
        assert_eq!(
            result.variants,
            [vec!["platform-osx".to_string(), "python-3.9".to_string()]]
        );
    }
}
