//! Cached entry record persisted per config type.

use serde::{Deserialize, Serialize};

use crate::baseline::bundled;
use crate::config_type::ConfigType;
use crate::document::ConfigDocument;

/// Where a cached document came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// Seeded from the build-embedded baseline
    #[default]
    Bundled,
    /// Fetched and validated from the remote source
    Remote,
}

impl EntrySource {
    pub fn display_name(&self) -> &'static str {
        match self {
            EntrySource::Bundled => "bundled",
            EntrySource::Remote => "remote",
        }
    }
}

/// The currently-accepted document for one config type plus its provenance.
///
/// Entries are replaced wholesale; there is no field-level mutation API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry {
    pub source: EntrySource,
    /// Epoch milliseconds of the last write or unchanged-content check
    pub timestamp: i64,
    /// SHA-256 hex of the raw remote body, `None` for bundled entries
    pub content_hash: Option<String>,
    pub document: ConfigDocument,
}

impl CachedEntry {
    /// Entry seeded from the bundled baseline.
    pub fn bundled(config_type: ConfigType, timestamp: i64) -> Self {
        Self {
            source: EntrySource::Bundled,
            timestamp,
            content_hash: None,
            document: bundled(config_type).clone(),
        }
    }

    /// Entry for a freshly validated remote document.
    pub fn remote(document: ConfigDocument, content_hash: String, timestamp: i64) -> Self {
        Self {
            source: EntrySource::Remote,
            timestamp,
            content_hash: Some(content_hash),
            document,
        }
    }

    /// Copy of this entry with only the timestamp replaced.
    pub fn touched(&self, timestamp: i64) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    pub fn is_remote(&self) -> bool {
        self.source == EntrySource::Remote
    }
}
