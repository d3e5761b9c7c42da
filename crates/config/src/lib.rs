//! Configuration loading for the mirror service
//!
//! Settings live in a `settings.yaml` file resolved against the process
//! working directory and are reloaded at the top of every sync cycle so
//! edits take effect without a restart. The [`SettingsSource`] trait lets
//! tests inject fixed settings without file I/O.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings filename, relative to the working directory
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Runtime settings for the mirror service
///
/// Field names map to the upper-case keys used in deployed `settings.yaml`
/// files, so existing files keep working unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Local InfluxDB endpoint URL
    #[serde(rename = "LOCAL_IP")]
    pub local_url: String,
    #[serde(rename = "LOCAL_TOKEN")]
    pub local_token: String,
    #[serde(rename = "LOCAL_ORG")]
    pub local_org: String,
    /// Remote InfluxDB endpoint URL; its host part is also the ping target
    #[serde(rename = "REMOTE_IP")]
    pub remote_url: String,
    #[serde(rename = "REMOTE_TOKEN")]
    pub remote_token: String,
    #[serde(rename = "REMOTE_ORG")]
    pub remote_org: String,
    /// Buckets to mirror, synced strictly in this order
    #[serde(rename = "BUCKETS")]
    pub buckets: Vec<String>,
    /// Wait between cycles, as `HH:MM:SS`
    #[serde(rename = "REFRESH_RATE")]
    pub refresh_rate: String,
    /// Lower bound for the first pull of a bucket with no local data
    #[serde(rename = "RECOVER_DATA_SINCE_DATE")]
    pub recover_since: DateTime<Utc>,
}

impl Settings {
    /// Parse the `HH:MM:SS` refresh rate into a duration
    pub fn refresh_interval(&self) -> Result<Duration> {
        parse_interval(&self.refresh_rate)
            .with_context(|| format!("Invalid REFRESH_RATE: {:?}", self.refresh_rate))
    }
}

/// Parse an `HH:MM:SS` string into a duration
pub fn parse_interval(text: &str) -> Result<Duration> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 3 {
        bail!("expected HH:MM:SS, got {:?}", text);
    }
    let hours: u64 = parts[0].parse().context("invalid hours")?;
    let minutes: u64 = parts[1].parse().context("invalid minutes")?;
    let seconds: u64 = parts[2].parse().context("invalid seconds")?;
    if minutes >= 60 || seconds >= 60 {
        bail!("minutes and seconds must be below 60 in {:?}", text);
    }
    Ok(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
}

/// Load and parse a YAML file from an arbitrary path
pub fn load_yaml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

/// Source of settings for the sync controller
pub trait SettingsSource: Send + Sync {
    /// Load a fresh copy of the settings
    fn load(&self) -> Result<Settings>;
}

/// File-backed settings source, re-reading the YAML on every load
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    /// Settings file at the default location (`settings.yaml` in the
    /// working directory)
    pub fn default_location() -> Self {
        Self {
            path: PathBuf::from(SETTINGS_FILE),
        }
    }

    /// Settings file at a specific path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this source reads from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for SettingsFile {
    fn load(&self) -> Result<Settings> {
        load_yaml_file(&self.path)
    }
}

/// Fixed in-memory settings, for tests
pub struct FixedSettings(pub Settings);

impl SettingsSource for FixedSettings {
    fn load(&self) -> Result<Settings> {
        Ok(self.0.clone())
    }
}
