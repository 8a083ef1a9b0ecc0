//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/dox/config.toml)
//! 3. Project config (.dox/config.toml)
//! 4. Explicit config file (--config / DOX_CONFIG)
//! 5. Environment variables (DOX_*)
//! 6. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::{CONFIG_ENV_VAR, ConfigLoader};
pub use types::*;
