//! Subcommand implementations.

pub mod build;
pub mod fix_rpath;
pub mod package;
pub mod release;
pub mod rez_build;
pub mod variants;
pub mod version;
