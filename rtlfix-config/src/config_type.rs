//! The four named configuration documents.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every per-type cache key in the durable store.
pub const CACHE_KEY_PREFIX: &str = "cached_config_";

/// Storage key of the singleton metadata record.
pub const METADATA_KEY: &str = "config_metadata";

/// One of the four configuration documents the sync core manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    /// Global defaults: indicator position, element selectors, behaviour settings
    Defaults,
    /// Per-site overrides, matched by domain pattern
    Domains,
    /// Named CSS classes applied to detected RTL elements
    Styles,
    /// Indicator theme and base styles
    Ui,
}

impl ConfigType {
    /// All config types in canonical enqueue order.
    pub const ALL: [ConfigType; 4] = [
        ConfigType::Defaults,
        ConfigType::Domains,
        ConfigType::Styles,
        ConfigType::Ui,
    ];

    /// Lowercase name used in URLs, storage keys and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::Defaults => "defaults",
            ConfigType::Domains => "domains",
            ConfigType::Styles => "styles",
            ConfigType::Ui => "ui",
        }
    }

    /// Key under which this type's cached entry is persisted.
    pub fn storage_key(&self) -> String {
        format!("{CACHE_KEY_PREFIX}{}", self.as_str())
    }

    /// Remote file name relative to the configured base URL.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }

    /// Fixed remote URL for this type under `base_url`.
    pub fn remote_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.file_name())
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "defaults" => Ok(ConfigType::Defaults),
            "domains" => Ok(ConfigType::Domains),
            "styles" => Ok(ConfigType::Styles),
            "ui" => Ok(ConfigType::Ui),
            other => Err(format!(
                "unknown config type '{other}' (expected one of: defaults, domains, styles, ui)"
            )),
        }
    }
}
