//! Host toolchain probing: Xcode, its SDKs, and whether CMake must run
//! through `xcrun`.

use crate::env::HostEnv;
use crate::tools::{ToolError, checked};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from probing Xcode.
#[derive(Error, Debug)]
pub enum XcodeError {
    /// `xcodebuild` failed or is missing.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The SDK listing was not valid JSON.
    #[error("Invalid SDK listing: {0}")]
    Json(#[from] serde_json::Error),

    /// The version listing had no build version line.
    #[error("Could not find the Xcode build version in: {0}")]
    Version(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SdkEntry {
    #[serde(default)]
    is_base_sdk: bool,
    display_name: Option<String>,
    product_build_version: Option<String>,
}

/// Installed Xcode build and base SDKs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XcodeInfo {
    /// Xcode build version, e.g. `15A240d`.
    pub xcode: String,
    /// SDK display name to product build version, e.g. `macOS 14.0` to `23A334`.
    pub sdks: BTreeMap<String, String>,
}

impl XcodeInfo {
    /// Major number of the Xcode build (`15A240d` is 15).
    pub fn xcode_major(&self) -> Option<u32> {
        leading_number(&self.xcode)
    }

    /// Major number of the macOS SDK build, if a macOS SDK is installed.
    pub fn macos_sdk_major(&self) -> Option<u32> {
        self.sdks
            .iter()
            .filter(|(name, _)| name.starts_with("macOS"))
            .filter_map(|(_, build)| leading_number(build))
            .next_back()
    }
}

fn leading_number(text: &str) -> Option<u32> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text[..end].parse().ok()
}

/// Parse `xcodebuild -version -sdk` and `xcodebuild -version -sdk -json`.
///
/// Simulator SDKs, names containing `(`, and SDKs shadowed by an
/// `<name> Internal` entry are dropped.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or no build version is found.
pub fn parse_sdks(version_text: &str, sdk_json: &str) -> Result<XcodeInfo, XcodeError> {
    let xcode = version_text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| line.split_whitespace().next_back())
        .ok_or_else(|| XcodeError::Version(version_text.to_string()))?
        .to_string();

    let entries: Vec<SdkEntry> = serde_json::from_str(sdk_json)?;
    let all: BTreeMap<String, String> = entries
        .into_iter()
        .filter(|e| e.is_base_sdk)
        .filter_map(|e| Some((e.display_name?, e.product_build_version?)))
        .collect();

    let sdks = all
        .iter()
        .filter(|(name, _)| {
            !name.contains("Simulator")
                && !name.contains('(')
                && !all.contains_key(&format!("{name} Internal"))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(XcodeInfo { xcode, sdks })
}

/// Query the installed Xcode.
///
/// # Errors
///
/// Returns an error if `xcodebuild` fails or prints something unexpected.
pub fn inspect_host() -> Result<XcodeInfo, XcodeError> {
    let text = checked(
        "xcodebuild",
        Command::new("xcodebuild").args(["-version", "-sdk"]),
    )?;
    let json = checked(
        "xcodebuild",
        Command::new("xcodebuild").args(["-version", "-sdk", "-json"]),
    )?;
    parse_sdks(&text.stdout, &json.stdout)
}

/// Whether CMake must be launched through `xcrun` to find the SDK.
pub fn should_use_xcrun(info: &XcodeInfo, cmake_minor: u32) -> bool {
    // Without a macOS SDK Xcode is not set up; let the rez CMake try.
    let Some(sdk) = info.macos_sdk_major() else {
        return false;
    };

    if info.xcode_major().unwrap_or(0) >= 14 {
        return true;
    }

    // CMake before 3.25 cannot locate SDKs newer than build 21.
    sdk >= 22 && cmake_minor < 25
}

/// Inspect the host and decide whether to use `xcrun`.
///
/// A failed inspection is logged and treated as "no".
pub fn detect_xcrun(host: &HostEnv) -> bool {
    match inspect_host() {
        Ok(info) => should_use_xcrun(&info, host.cmake_minor_version.unwrap_or(0)),
        Err(e) => {
            warn!("Could not query Xcode, not using xcrun: {e}");
            false
        }
    }
}

/// Lenient boolean: true when the lowercase text starts with `y`, `1`, `t`
/// or `o`.
pub fn parse_boolean(value: &str) -> bool {
    let value = value.to_lowercase();
    ["y", "1", "t", "o"].iter().any(|p| value.starts_with(p))
}

fn capture(tool: &'static str, cmd: &mut Command) -> Option<String> {
    match checked(tool, cmd) {
        Ok(out) => Some(out.stdout.trim().to_string()),
        Err(e) => {
            warn!("Could not query {tool}: {e}");
            None
        }
    }
}

/// Log the OS, CMake, Xcode, SDK and SIP status of the build host.
///
/// Every query is best effort.
pub fn log_host_diagnostics(xcrun: bool) {
    if let Some(os) = capture("sw_vers", &mut Command::new("sw_vers")) {
        info!("OS Version:\n{os}");
    }

    let mut cmake = if xcrun {
        info!("Using xcrun");
        let mut cmd = Command::new("xcrun");
        cmd.arg("cmake");
        cmd
    } else {
        Command::new("cmake")
    };
    cmake.arg("--version");
    if let Some(version) = capture("cmake", &mut cmake) {
        info!("CMake Version: {version}");
    }

    if let Some(path) = capture("xcode-select", Command::new("xcode-select").arg("-p")) {
        info!("Xcode: {path}");
    }

    match inspect_host() {
        Ok(data) => {
            info!("Xcode build: {}", data.xcode);
            for (name, build) in &data.sdks {
                info!("  {name}: {build}");
            }
        }
        Err(e) => warn!("Could not list Xcode SDKs: {e}"),
    }

    if let Some(status) = capture("csrutil", Command::new("csrutil").arg("status")) {
        info!("SIP Status: {status}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION_TEXT: &str = "\
MacOSX14.0.sdk - macOS 14.0 (macosx14.0)
SDKVersion: 14.0
ProductBuildVersion: 23A334

Xcode 15.0
Build version 15A240d
";

    const SDK_JSON: &str = r#"[
  {"isBaseSdk": true, "displayName": "macOS 14.0", "productBuildVersion": "23A334"},
  {"isBaseSdk": true, "displayName": "iOS 17.0", "productBuildVersion": "21A326"},
  {"isBaseSdk": true, "displayName": "iOS 17.0 Internal", "productBuildVersion": "21A326i"},
  {"isBaseSdk": true, "displayName": "iOS Simulator 17.0", "productBuildVersion": "21A328"},
  {"isBaseSdk": true, "displayName": "DriverKit 23.0 (beta)", "productBuildVersion": "23A1"},
  {"isBaseSdk": false, "displayName": "Other", "productBuildVersion": "1"},
  {"isBaseSdk": true, "displayName": "watchOS 10.0"}
]"#;

    #[test]
    fn test_parse_sdks() {
        let info = parse_sdks(VERSION_TEXT, SDK_JSON).unwrap();
        assert_eq!(info.xcode, "15A240d");
        assert_eq!(
            info.sdks.keys().collect::<Vec<_>>(),
            ["iOS 17.0 Internal", "macOS 14.0"]
        );
        assert_eq!(info.xcode_major(), Some(15));
        assert_eq!(info.macos_sdk_major(), Some(23));
    }

    #[test]
    fn test_parse_sdks_rejects_bad_json() {
        assert!(matches!(
            parse_sdks(VERSION_TEXT, "not json"),
            Err(XcodeError::Json(_))
        ));
        assert!(matches!(parse_sdks("\n", "[]"), Err(XcodeError::Version(_))));
    }

    fn info(xcode: &str, sdk: Option<&str>) -> XcodeInfo {
        XcodeInfo {
            xcode: xcode.to_string(),
            sdks: sdk
                .map(|b| ("macOS 13.0".to_string(), b.to_string()))
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn test_should_use_xcrun() {
        assert!(!should_use_xcrun(&info("15A240d", None), 24));
        assert!(should_use_xcrun(&info("14A309", Some("22A380")), 27));
        assert!(should_use_xcrun(&info("13E113", Some("22A380")), 24));
        assert!(!should_use_xcrun(&info("13E113", Some("22A380")), 25));
        assert!(!should_use_xcrun(&info("13E113", Some("21E226")), 20));
    }

    #[test]
    fn test_parse_boolean() {
        for truthy in ["yes", "Y", "1", "true", "True", "on"] {
            assert!(parse_boolean(truthy), "{truthy}");
        }
        for falsy in ["no", "0", "false", "", "never"] {
            assert!(!parse_boolean(falsy), "{falsy}");
        }
    }
}
