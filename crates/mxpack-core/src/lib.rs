//! Build, fix and package MaterialX variants for rez on macOS.

pub mod awake;
pub mod build;
pub mod context;
pub mod env;
pub mod manifest;
pub mod packages;
pub mod relinker;
pub mod release;
pub mod tools;
pub mod version;
pub mod xcode;

pub use context::{Settings, Workspace};
pub use env::{EnvError, Environment, HostEnv};
pub use tools::{ToolError, Toolbox};
