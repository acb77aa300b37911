/// Target CPU architecture for a variant.
///
/// Variants may target several architectures at once; the list is handed to
/// CMake as `CMAKE_OSX_ARCHITECTURES` to produce universal binaries.
///
/// # Example
///
/// ```
/// use mxpack_schema::Arch;
///
/// let arch: Arch = "aarch64".parse().unwrap();
/// assert_eq!(arch.as_str(), "arm64");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// ARM64 architecture (Apple Silicon)
    Arm64,
    /// `x86_64` architecture (Intel Macs)
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Arch {
    /// Apple platform name, as understood by `CMAKE_OSX_ARCHITECTURES`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }

    /// Join architectures into the `;`-separated form CMake expects.
    pub fn cmake_list(archs: &[Arch]) -> String {
        archs.iter().map(Arch::as_str).collect::<Vec<_>>().join(";")
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" | "arm64-macos" => Ok(Self::Arm64),
            "x86_64" | "amd64" | "x86_64-macos" => Ok(Self::X86_64),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}
