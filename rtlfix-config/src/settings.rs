//! Sync settings: load, save, path resolution and sanitization.
//!
//! Settings live at `~/.config/rtlfix/settings.yaml` (XDG convention on all
//! platforms except Windows, which uses the platform config dir). A missing
//! file is created with defaults on first load. Out-of-range values are
//! clamped with a warning rather than rejected, so a hand-edited file can never
//! stop the sync core from starting.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults;

/// Tunables for the configuration sync core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Base URL the four `<type>.json` documents are fetched from
    #[serde(default = "crate::defaults::remote_base_url")]
    pub remote_base_url: String,

    /// Timeout for a single HTTP fetch, in seconds (default: 10)
    #[serde(default = "crate::defaults::fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Maximum accepted response body size in bytes (default: 1 MB)
    #[serde(default = "crate::defaults::max_response_bytes")]
    pub max_response_bytes: usize,

    /// Allow plain-HTTP sources (default: false, not recommended)
    #[serde(default = "crate::defaults::bool_false")]
    pub allow_http: bool,

    /// Total fetch attempts per type before counting it as failed (default: 3)
    #[serde(default = "crate::defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles for every further attempt (default: 1000)
    #[serde(default = "crate::defaults::retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Refresh interval used when no metadata record exists yet (default: 360)
    #[serde(default = "crate::defaults::refresh_interval_minutes")]
    pub default_refresh_interval_minutes: u32,

    /// Directory holding the durable store (default: platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote_base_url: defaults::remote_base_url(),
            fetch_timeout_secs: defaults::fetch_timeout_secs(),
            max_response_bytes: defaults::max_response_bytes(),
            allow_http: false,
            max_attempts: defaults::max_attempts(),
            retry_base_delay_ms: defaults::retry_base_delay_ms(),
            default_refresh_interval_minutes: defaults::refresh_interval_minutes(),
            data_dir: None,
        }
    }
}

impl SyncSettings {
    /// Load settings from the default path, creating the file if missing.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::settings_path())
    }

    /// Load settings from `path`, creating it with defaults if missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("Settings file not found, creating default at {:?}", path);
            let settings = Self::default();
            settings.save_to(path)?;
            return Ok(settings);
        }

        log::info!("Loading sync settings from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {path:?}"))?;
        let mut settings: SyncSettings = serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("Failed to parse settings YAML from {path:?}"))?;
        settings.sanitize();
        Ok(settings)
    }

    /// Save settings to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path())
    }

    /// Save settings to `path` atomically (temp file, then rename).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {parent:?}"))?;
        }

        let yaml = serde_yaml_ng::to_string(self).context("Failed to serialize settings")?;
        let temp_path = path.with_extension("yaml.tmp");
        fs::write(&temp_path, yaml)
            .with_context(|| format!("Failed to write settings temp file {temp_path:?}"))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to move settings into place at {path:?}"))?;
        Ok(())
    }

    /// Clamp out-of-range values, logging each adjustment.
    pub fn sanitize(&mut self) {
        if self.remote_base_url.trim().is_empty() {
            log::warn!("remote_base_url is empty; using {}", defaults::REMOTE_BASE_URL);
            self.remote_base_url = defaults::remote_base_url();
        }
        if self.fetch_timeout_secs == 0 {
            log::warn!("fetch_timeout_secs must be at least 1; using default");
            self.fetch_timeout_secs = defaults::fetch_timeout_secs();
        }
        if self.max_response_bytes == 0 {
            log::warn!("max_response_bytes must be positive; using default");
            self.max_response_bytes = defaults::max_response_bytes();
        }
        let attempts = self.max_attempts.clamp(1, defaults::MAX_ATTEMPTS_CEILING);
        if attempts != self.max_attempts {
            log::warn!(
                "max_attempts {} out of range, clamped to {}",
                self.max_attempts,
                attempts
            );
            self.max_attempts = attempts;
        }
        let interval = clamp_refresh_interval(self.default_refresh_interval_minutes);
        if interval != self.default_refresh_interval_minutes {
            log::warn!(
                "default_refresh_interval_minutes {} out of range, clamped to {}",
                self.default_refresh_interval_minutes,
                interval
            );
            self.default_refresh_interval_minutes = interval;
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Directory for the durable store, resolved against the platform data dir.
    pub fn resolved_data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("rtlfix"),
        }
    }

    /// Get the settings file path (using XDG convention)
    pub fn settings_path() -> PathBuf {
        Self::settings_dir().join("settings.yaml")
    }

    /// Get the settings directory path (using XDG convention)
    pub fn settings_dir() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            dirs::config_dir()
                .map(|dir| dir.join("rtlfix"))
                .unwrap_or_else(|| PathBuf::from("."))
        }
        #[cfg(not(target_os = "windows"))]
        {
            dirs::home_dir()
                .map(|home| home.join(".config").join("rtlfix"))
                .unwrap_or_else(|| PathBuf::from("."))
        }
    }
}

/// Clamp a refresh interval into the accepted range.
pub fn clamp_refresh_interval(minutes: u32) -> u32 {
    minutes.clamp(
        defaults::MIN_REFRESH_INTERVAL_MINUTES,
        defaults::MAX_REFRESH_INTERVAL_MINUTES,
    )
}
