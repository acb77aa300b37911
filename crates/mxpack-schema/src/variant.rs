//! Build variants and the ways of addressing them.

use crate::arch::Arch;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A variant exactly as written in the configuration file.
///
/// The variant name is the table key, so it is not part of the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Stable numeric id, used by CI jobs (`build -i 3`).
    pub id: u32,
    /// Short alternative name; also used to name the build folder.
    pub alias: String,
    /// Ordered rez variant requests; doubles as the install path segments.
    pub keys: Vec<String>,
    /// Architectures compiled into the universal binaries.
    #[serde(default = "default_architectures")]
    pub architectures: Vec<Arch>,
    /// Extra requests merged into the base dependency list.
    #[serde(default)]
    pub additions: Vec<String>,
    /// Whether the variant is published in the package manifest.
    #[serde(default)]
    pub enabled: bool,
}

fn default_architectures() -> Vec<Arch> {
    vec![Arch::X86_64, Arch::Arm64]
}

/// A named build configuration: platform, architectures and host toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Unique variant name.
    pub name: String,
    /// Unique numeric id.
    pub id: u32,
    /// Unique alias.
    pub alias: String,
    /// Ordered key requests, e.g. `["platform-osx", "maya-2024"]`.
    pub keys: Vec<String>,
    /// Target architectures.
    pub architectures: Vec<Arch>,
    /// Variant specific dependency additions.
    pub additions: Vec<String>,
    /// Published in the manifest variant list.
    pub enabled: bool,
}

impl Variant {
    /// Attach a name to a parsed [`VariantSpec`].
    pub fn from_spec(name: impl Into<String>, spec: VariantSpec) -> Self {
        Self {
            name: name.into(),
            id: spec.id,
            alias: spec.alias,
            keys: spec.keys,
            architectures: spec.architectures,
            additions: spec.additions,
            enabled: spec.enabled,
        }
    }

    /// The keys joined with `/`, i.e. the variant's relative install path.
    pub fn key_path(&self) -> String {
        self.keys.join("/")
    }
}

/// How a caller refers to a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantRef {
    /// Match on [`Variant::name`].
    ByName(String),
    /// Match on [`Variant::alias`].
    ByAlias(String),
    /// Match on [`Variant::id`].
    ById(u32),
}

impl VariantRef {
    /// Whether `variant` is the one this reference points at.
    pub fn matches(&self, variant: &Variant) -> bool {
        match self {
            Self::ByName(name) => variant.name == *name,
            Self::ByAlias(alias) => variant.alias == *alias,
            Self::ById(id) => variant.id == *id,
        }
    }
}

impl fmt::Display for VariantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByName(name) => write!(f, "name '{name}'"),
            Self::ByAlias(alias) => write!(f, "alias '{alias}'"),
            Self::ById(id) => write!(f, "id {id}"),
        }
    }
}
