//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// API endpoint used when neither flag, environment nor config file set one
pub const DEFAULT_API_URL: &str = "http://localhost:5057";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// API endpoint URL
    pub api_url: Option<String>,
    /// Default output format (`table` or `json`)
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from `~/.config/padv/config.json`. Without a home
    /// directory the defaults apply.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Ok(path) => Self::load_from(&path),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Load configuration from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Resolve the API URL: explicit flag or env first, then the file
    pub fn api_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Resolve the output format: explicit flag first, then the file
    pub fn format(&self, flag: Option<OutputFormat>) -> Result<OutputFormat> {
        if let Some(format) = flag {
            return Ok(format);
        }
        match &self.default_format {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid default_format in config: {}", e)),
            None => Ok(OutputFormat::default()),
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("padv").join("config.json"))
    }
}
