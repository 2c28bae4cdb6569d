//! Podslot configuration stored at `<home>/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use super::atomic::write_atomic;

/// Podslot configuration (TOML).
///
/// Edited by humans; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PodslotConfig {
    /// Docker-compatible runtime CLI.
    pub runtime: String,

    /// Prefix of every container and image name podslot manages.
    pub container_prefix: String,

    /// Timeout for a single runtime query, in seconds.
    pub probe_timeout_secs: u64,

    /// File inside a slot directory whose presence means "credentials stored".
    pub credential_file: String,

    pub build: BuildConfig,
}

/// Inputs of each build-cache layer.
///
/// Relative paths resolve against the project directory. Directories are
/// hashed recursively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    pub base_definition: Vec<PathBuf>,
    pub support_scripts: Vec<PathBuf>,
    pub profile_config: Vec<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            base_definition: vec![PathBuf::from("Dockerfile")],
            support_scripts: vec![PathBuf::from("scripts")],
            profile_config: vec![PathBuf::from(".podslot/profile.toml")],
        }
    }
}

impl Default for PodslotConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            container_prefix: "podslot".to_string(),
            probe_timeout_secs: 10,
            credential_file: ".credentials.json".to_string(),
            build: BuildConfig::default(),
        }
    }
}

impl PodslotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.runtime.trim().is_empty() {
            return Err(anyhow!("runtime must not be empty"));
        }
        if self.container_prefix.is_empty()
            || !self
                .container_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(anyhow!(
                "container_prefix must be non-empty [a-z0-9_-] (got '{}')",
                self.container_prefix
            ));
        }
        if self.probe_timeout_secs == 0 {
            return Err(anyhow!("probe_timeout_secs must be > 0"));
        }
        if self.credential_file.trim().is_empty() || self.credential_file.contains('/') {
            return Err(anyhow!("credential_file must be a plain file name"));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PodslotConfig::default()`.
pub fn load_config(path: &Path) -> Result<PodslotConfig> {
    if !path.exists() {
        let cfg = PodslotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PodslotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PodslotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)?;
    Ok(())
}
