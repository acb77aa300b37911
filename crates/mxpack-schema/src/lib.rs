//! Shared configuration types for mxpack.

pub mod arch;
pub mod config;
pub mod variant;

// Re-exports
pub use arch::Arch;
pub use config::{Config, ConfigError};
pub use variant::{Variant, VariantRef, VariantSpec};
