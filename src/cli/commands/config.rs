//! Config Command
//!
//! Inspect and initialize dox configuration.
//!
//! Usage:
//!   dox config show [--format toml|json]
//!   dox config path
//!   dox config init [--force]

use std::path::Path;

use crate::cli::Output;
use crate::config::ConfigLoader;
use crate::types::{DoxError, Result};

/// Print the effective configuration merged from all sources
pub fn show(explicit: Option<&Path>, format: &str) -> Result<()> {
    let as_json = match format.to_lowercase().as_str() {
        "toml" => false,
        "json" => true,
        other => {
            return Err(DoxError::Config(format!(
                "Unknown format '{}'. Valid values: toml, json",
                other
            )));
        }
    };

    let config = ConfigLoader::load(explicit)?;
    println!("{}", ConfigLoader::render(&config, as_json)?);
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Write the default global configuration
pub fn init(force: bool) -> Result<()> {
    let existed = ConfigLoader::global_config_path().is_some_and(|p| p.exists());
    let path = ConfigLoader::init_global(force)?;

    let output = Output::default();
    if existed && !force {
        output.warning(&format!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        ));
    } else {
        output.success("Initialized global configuration");
        output.field("Config", path.display());
    }
    Ok(())
}
