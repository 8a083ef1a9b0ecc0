//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/dox/config.toml)
//! 3. Project config (.dox/config.toml)
//! 4. Explicit file (`--config` or `DOX_CONFIG`)
//! 5. Environment variables (DOX_* prefix, `__` between sections)
//!
//! Provider API keys missing after all layers fall back to the vendors'
//! conventional variables (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
//! `CLAUDE_API_KEY`).

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::ai::provider::ProviderKind;
use crate::types::{DoxError, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DOX_CONFIG";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → explicit file → env vars
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(DoxError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            debug!("Loading config from: {}", path.display());
            figment = figment.merge(Toml::file(&path));
        }

        // DOX_OPENAI__MODEL -> openai.model
        figment = figment.merge(
            Env::prefixed("DOX_")
                .ignore(&["CONFIG"])
                .split("__")
                .lowercase(true),
        );

        let mut config: Config = figment
            .extract()
            .map_err(|e| DoxError::Config(format!("Configuration error: {}", e)))?;

        Self::apply_key_fallbacks(&mut config, |name| env::var(name).ok());

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| DoxError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Fill missing provider keys from the vendors' conventional variables
    pub fn apply_key_fallbacks<F>(config: &mut Config, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for kind in ProviderKind::ALL {
            let provider = config.provider_mut(kind);
            if provider.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
                continue;
            }
            if let Some(key) = kind
                .api_key_vars()
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
            {
                debug!(provider = %kind, "Using API key from environment");
                provider.api_key = Some(key);
            }
        }
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/dox/)
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "dox").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".dox/config.toml")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());

        if let Some(explicit) = env::var_os(CONFIG_ENV_VAR) {
            let explicit = PathBuf::from(explicit);
            let exists = if explicit.exists() { "✓" } else { "✗" };
            println!("  {}: {} {}", CONFIG_ENV_VAR, exists, explicit.display());
        }
    }

    /// Render the effective configuration (API keys are never serialized)
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| DoxError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            DoxError::Config("Cannot determine global config directory".to_string())
        })?;
        Self::write_default_config(&global_dir.join("config.toml"), force)
    }

    /// Write the commented default config to `path`
    pub fn write_default_config(path: &Path, force: bool) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !path.exists() || force {
            fs::write(path, Self::default_config())?;
            info!("Created config: {}", path.display());
        } else {
            info!("Config exists: {}", path.display());
        }

        Ok(path.to_path_buf())
    }

    /// Default config content (TOML)
    fn default_config() -> String {
        r#"# dox Configuration
# Project settings in .dox/config.toml override these.
# API keys are read from OPENAI_API_KEY / ANTHROPIC_API_KEY when unset here.

version = "1.0"

[generate]
content_type = "custom"
max_tokens = 2000
temperature = 0.7
enhance_prompt = true
# provider = "openai"
# model = "gpt-3.5-turbo"

[openai]
model = "gpt-3.5-turbo"
timeout_secs = 30

[openai.retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 10000
multiplier = 2.0
jitter = true

[claude]
model = "claude-3-sonnet-20240229"
timeout_secs = 60

[claude.retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 10000
multiplier = 2.0
jitter = true

[cache]
enabled = true
ttl_secs = 3600
max_entries = 100
max_bytes = 52428800
sweep_interval_secs = 300
"#
        .to_string()
    }
}
