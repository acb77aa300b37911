//! Mach-O load command utilities.
//!
//! macOS binaries find their shared libraries through load commands in the
//! file header. `LC_LOAD_DYLIB` entries name each library, and `@rpath/`
//! entries are resolved against the `LC_RPATH` search paths. Adding the
//! final install location's `lib/` directory as an rpath lets the build
//! output move from the build tree to the deployed package tree.

use super::{LinkEditor, ToolError, checked};
use std::path::Path;
use std::process::Command;

/// `install_name_tool` and `otool` from the Xcode command line tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct MachOTools;

impl LinkEditor for MachOTools {
    fn add_rpath(&self, path: &Path, rpath: &Path) -> Result<(), ToolError> {
        checked(
            "install_name_tool",
            Command::new("/usr/bin/install_name_tool")
                .arg("-add_rpath")
                .arg(rpath)
                .arg(path),
        )?;
        Ok(())
    }

    fn linked_libraries(&self, path: &Path) -> Result<Vec<String>, ToolError> {
        let output = checked("otool", Command::new("otool").arg("-L").arg(path))?;
        Ok(parse_otool_libraries(&output.stdout))
    }
}

/// Extract library paths from `otool -L` output.
///
/// Header lines (`<file>:` or `<file> (architecture arm64):`) are skipped
/// and the trailing `(compatibility version ...)` annotation is dropped.
pub fn parse_otool_libraries(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with(char::is_whitespace))
        .filter_map(|line| {
            let line = line.trim();
            let path = line.split(" (").next().unwrap_or(line).trim();
            (!path.is_empty()).then(|| path.to_string())
        })
        .collect()
}

/// Checks if a file is a Mach-O binary (magic bytes).
pub fn is_macho(path: &Path) -> bool {
    use std::io::Read;
    let Ok(mut f) = std::fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_err() {
        return false;
    }
    // feedface, feedfacf, cafebabe (universal) - and their LE/BE variants
    matches!(
        magic,
        [0xfe, 0xed, 0xfa, 0xce]
            | [0xfe, 0xed, 0xfa, 0xcf]
            | [0xcf, 0xfa, 0xed, 0xfe]
            | [0xce, 0xfa, 0xed, 0xfe]
            | [0xca, 0xfe, 0xba, 0xbe]
    )
}
