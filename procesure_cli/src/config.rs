//! Installation config file for the Procesure CLI

use anyhow::{Context, Result};
use directories::ProjectDirs;
use procesure_core::InstallationConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Location of the installation config on disk
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    /// Default config file path (`<config dir>/config.json`)
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "procesure", "procesure")
            .context("Could not determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.json"))
    }

    /// Use `explicit` when given, the default location otherwise
    pub fn locate(explicit: Option<PathBuf>) -> Result<Self> {
        match explicit {
            Some(path) => Ok(Self::at(path)),
            None => Ok(Self::at(Self::default_path()?)),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the config, or return the default one if the file doesn't exist
    pub fn load(&self) -> Result<InstallationConfig> {
        if !self.exists() {
            debug!("No config at {}, using defaults", self.path.display());
            return Ok(InstallationConfig::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config from {}", self.path.display()))?;

        InstallationConfig::from_json(&content)
            .with_context(|| format!("Failed to parse config file {}", self.path.display()))
    }

    pub fn save(&self, config: &InstallationConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }

        let mut content = config.to_json().context("Failed to serialize config")?;
        content.push('\n');

        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))?;

        Ok(())
    }
}

/// JSON rendering of `config` with secrets masked, for display
pub fn redacted_json(config: &InstallationConfig) -> Result<String> {
    let mut shown = config.clone();
    if !shown.agent.token.is_empty() {
        shown.agent.token = "********".to_string();
    }
    if !shown.rdp.password.is_empty() {
        shown.rdp.password = "********".to_string();
    }
    serde_json::to_string_pretty(&shown).context("Failed to serialize config")
}
