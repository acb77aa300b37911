//! Static packaging configuration.
//!
//! The configuration file describes every variant that can be built along
//! with the base dependency lists shared by all of them. It is read once at
//! process start and never mutated afterwards; every component receives a
//! `&Config` instead of reading global state.
//!
//! TOML is the native format. Files ending in `.json` are parsed as JSON so
//! the legacy `config.json` layout keeps working unchanged.

use crate::variant::{Variant, VariantRef, VariantSpec};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or querying the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// TOML syntax or schema error.
    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or schema error.
    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Two variants share a name, alias or id.
    #[error("Duplicate variant {field}: {value}")]
    Duplicate {
        /// Which identifying field clashed.
        field: &'static str,
        /// The clashing value.
        value: String,
    },

    /// No variant matched the request.
    #[error("Could not find a matching variant for {0}")]
    VariantNotFound(String),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_package")]
    package: String,
    #[serde(default)]
    branch_keys: BTreeMap<String, String>,
    #[serde(default = "default_branch_fallback")]
    branch_fallback: String,
    #[serde(default = "default_branch_package_prefix")]
    branch_package_prefix: String,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    build_requires: Vec<String>,
    #[serde(default = "default_priority")]
    priority: Vec<String>,
    #[serde(default = "default_apps_root")]
    apps_root: PathBuf,
    #[serde(default)]
    template: Option<PathBuf>,
    #[serde(default)]
    variants: BTreeMap<String, VariantSpec>,
}

fn default_package() -> String {
    "materialx".to_string()
}

fn default_branch_fallback() -> String {
    "dev".to_string()
}

fn default_branch_package_prefix() -> String {
    "usd".to_string()
}

fn default_priority() -> Vec<String> {
    vec!["maya".to_string()]
}

fn default_apps_root() -> PathBuf {
    PathBuf::from("/usr/local/apps")
}

/// The validated packaging configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Rez package name being produced (e.g. `materialx`).
    pub package: String,
    /// Maps a branch prefix (text before the first `-`) to a package key.
    pub branch_keys: BTreeMap<String, String>,
    /// Package key used when the branch prefix is not in `branch_keys`.
    pub branch_fallback: String,
    /// Prefix joined to the branch key to form branch-derived package names.
    pub branch_package_prefix: String,
    /// Packages pinned to the front of every resolved package list.
    pub priority: Vec<String>,
    /// Root of the deployed package tree (`/usr/local/apps`).
    pub apps_root: PathBuf,
    /// Manifest template path, relative to the config file when not absolute.
    pub template: Option<PathBuf>,
    requires: Vec<String>,
    build_requires: Vec<String>,
    variants: Vec<Variant>,
}

impl Config {
    /// Load a configuration file, choosing the parser from its extension.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, a parse
    /// error for malformed content, or [`ConfigError::Duplicate`] when two
    /// variants share an identifier.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            Self::from_json_str(&content)
        } else {
            Self::parse(&content)
        }
    }

    /// Parse a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns a parse error or [`ConfigError::Duplicate`].
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        Self::from_raw(raw)
    }

    /// Parse a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns a parse error or [`ConfigError::Duplicate`].
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut variants: Vec<Variant> = raw
            .variants
            .into_iter()
            .map(|(name, spec)| Variant::from_spec(name, spec))
            .collect();
        variants.sort_by_key(|v| v.id);

        let mut ids = HashSet::new();
        let mut identifiers = HashSet::new();
        let mut key_lists = HashSet::new();
        for variant in &variants {
            if !ids.insert(variant.id) {
                return Err(ConfigError::Duplicate {
                    field: "id",
                    value: variant.id.to_string(),
                });
            }
            // Names and aliases share one namespace so `lookup` stays unambiguous.
            if !identifiers.insert(variant.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    field: "name",
                    value: variant.name.clone(),
                });
            }
            if variant.alias != variant.name && !identifiers.insert(variant.alias.as_str()) {
                return Err(ConfigError::Duplicate {
                    field: "alias",
                    value: variant.alias.clone(),
                });
            }
            // Keys double as the install path, so two variants cannot share them.
            if !key_lists.insert(variant.keys.as_slice()) {
                return Err(ConfigError::Duplicate {
                    field: "keys",
                    value: variant.key_path(),
                });
            }
        }

        Ok(Self {
            package: raw.package,
            branch_keys: raw.branch_keys,
            branch_fallback: raw.branch_fallback,
            branch_package_prefix: raw.branch_package_prefix,
            priority: raw.priority,
            apps_root: raw.apps_root,
            template: raw.template,
            requires: raw.requires,
            build_requires: raw.build_requires,
            variants,
        })
    }

    /// All variants, ordered by id.
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Resolve a [`VariantRef`] to its variant.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::VariantNotFound`] when nothing matches.
    pub fn variant(&self, reference: &VariantRef) -> Result<&Variant, ConfigError> {
        self.variants
            .iter()
            .find(|v| reference.matches(v))
            .ok_or_else(|| ConfigError::VariantNotFound(reference.to_string()))
    }

    /// Resolve a free-form identifier: name first, then alias, then id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::VariantNotFound`] when no interpretation matches.
    pub fn lookup(&self, identifier: &str) -> Result<&Variant, ConfigError> {
        let mut candidates = vec![
            VariantRef::ByName(identifier.to_string()),
            VariantRef::ByAlias(identifier.to_string()),
        ];
        if let Ok(id) = identifier.trim().parse::<u32>() {
            candidates.push(VariantRef::ById(id));
        }

        candidates
            .iter()
            .find_map(|reference| self.variant(reference).ok())
            .ok_or_else(|| ConfigError::VariantNotFound(format!("'{identifier}'")))
    }

    /// Find the variant whose keys equal `keys` exactly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::VariantNotFound`] when no variant has those keys.
    pub fn variant_by_keys(&self, keys: &[String]) -> Result<&Variant, ConfigError> {
        self.variants
            .iter()
            .find(|v| v.keys == keys)
            .ok_or_else(|| ConfigError::VariantNotFound(format!("keys {keys:?}")))
    }

    /// Key lists of the enabled variants, ordered by id.
    pub fn enabled_variant_keys(&self) -> Vec<Vec<String>> {
        self.variants
            .iter()
            .filter(|v| v.enabled)
            .map(|v| v.keys.clone())
            .collect()
    }

    /// Runtime requirements, minus any whose package name is in `exclude`.
    pub fn requires(&self, exclude: &[&str]) -> Vec<String> {
        filter_requests(&self.requires, exclude)
    }

    /// Build-time requirements, minus any whose package name is in `exclude`.
    pub fn build_requires(&self, exclude: &[&str]) -> Vec<String> {
        filter_requests(&self.build_requires, exclude)
    }
}

fn filter_requests(requests: &[String], exclude: &[&str]) -> Vec<String> {
    requests
        .iter()
        .filter(|r| !exclude.contains(&r.replace('!', "").as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arch;

    const EXAMPLE_CONFIG: &str = r#"
package = "materialx"
branch_fallback = "dev"
requires = ["python"]
build_requires = ["cmake-3", "!boost"]

[branch_keys]
release = "stable"

[variants.maya2024]
id = 1
alias = "m24"
keys = ["platform-osx", "maya-2024"]
additions = ["python-3.10"]
enabled = true

[variants.python39]
id = 0
alias = "py39"
keys = ["platform-osx", "python-3.9"]
architectures = ["arm64"]
"#;

    #[test]
    fn test_parse_config_sorts_by_id() {
        let config = Config::parse(EXAMPLE_CONFIG).unwrap();
        let names: Vec<_> = config.variants().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["python39", "maya2024"]);
        assert_eq!(config.apps_root, PathBuf::from("/usr/local/apps"));
        assert_eq!(config.priority, ["maya"]);
        assert_eq!(
            config.variants()[1].architectures,
            vec![Arch::X86_64, Arch::Arm64]
        );
    }

    #[test]
    fn test_lookup_forms_return_same_variant() {
        let config = Config::parse(EXAMPLE_CONFIG).unwrap();
        let by_name = config.lookup("maya2024").unwrap();
        let by_alias = config.lookup("m24").unwrap();
        let by_id = config.lookup("1").unwrap();
        let by_ref = config.variant(&VariantRef::ById(1)).unwrap();

        assert_eq!(by_name, by_alias);
        assert_eq!(by_name, by_id);
        assert_eq!(by_name, by_ref);
    }

    #[test]
    fn test_lookup_not_found() {
        let config = Config::parse(EXAMPLE_CONFIG).unwrap();
        let err = config.lookup("nuke14").unwrap_err();
        assert!(matches!(err, ConfigError::VariantNotFound(_)));
        assert!(config.variant(&VariantRef::ById(42)).is_err());
    }

    #[test]
    fn test_variant_by_keys() {
        let config = Config::parse(EXAMPLE_CONFIG).unwrap();
        let keys = vec!["platform-osx".to_string(), "python-3.9".to_string()];
        assert_eq!(config.variant_by_keys(&keys).unwrap().name, "python39");
        assert!(config.variant_by_keys(&keys[..1]).is_err());
    }

    #[test]
    fn test_enabled_variant_keys() {
        let config = Config::parse(EXAMPLE_CONFIG).unwrap();
        assert_eq!(
            config.enabled_variant_keys(),
            vec![vec!["platform-osx".to_string(), "maya-2024".to_string()]]
        );
    }

    #[test]
    fn test_requires_exclusion_ignores_bang() {
        let config = Config::parse(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.build_requires(&["boost"]), ["cmake-3"]);
        assert_eq!(config.requires(&["materialx"]), ["python"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let content = r#"
[variants.a]
id = 0
alias = "a1"
keys = []

[variants.b]
id = 0
alias = "b1"
keys = []
"#;
        let err = Config::parse(content).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate { field: "id", .. }));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let content = r#"
[variants.a]
id = 0
alias = "a1"
keys = ["platform-osx", "maya-2024"]

[variants.b]
id = 1
alias = "b1"
keys = ["platform-osx", "maya-2024"]
"#;
        match Config::parse(content).unwrap_err() {
            ConfigError::Duplicate { field, value } => {
                assert_eq!(field, "keys");
                assert_eq!(value, "platform-osx/maya-2024");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_alias_clashing_with_name_rejected() {
        let content = r#"
[variants.a]
id = 0
alias = "b"
keys = []

[variants.b]
id = 1
alias = "c"
keys = []
"#;
        assert!(Config::parse(content).is_err());
    }

    #[test]
    fn test_load_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"requires": ["python"], "variants": {"py": {"id": 3, "alias": "p", "keys": ["python-3"]}}}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.lookup("3").unwrap().name, "py");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/mxpack.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
