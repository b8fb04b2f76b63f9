//! Read side of the sync core.
//!
//! Collaborators read the active document for a config type through
//! [`ConfigFacade`]. A read never fails and never comes back empty: a cached
//! remote entry wins, anything else falls back to the bundled baseline.

use serde::de::DeserializeOwned;

use rtlfix_config::{
    ConfigDocument, ConfigType, DefaultsConfig, DomainRule, EntrySource, StyleClasses, UiConfig,
    UpdateStatus, bundled,
};

use crate::sync::store::CacheStore;

/// Cache provenance of one config type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeStatus {
    pub config_type: ConfigType,
    pub source: EntrySource,
    /// `None` when no entry has been written yet
    pub timestamp: Option<i64>,
    pub content_hash: Option<String>,
}

/// Snapshot of sync metadata plus per-type provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStatus {
    pub last_check: Option<i64>,
    pub last_update_timestamp: Option<i64>,
    pub last_update_status: UpdateStatus,
    pub last_successful_update: Option<i64>,
    pub refresh_interval_minutes: u32,
    pub per_type: Vec<TypeStatus>,
}

impl ConfigStatus {
    pub fn type_status(&self, config_type: ConfigType) -> Option<&TypeStatus> {
        self.per_type.iter().find(|s| s.config_type == config_type)
    }
}

#[derive(Clone)]
pub struct ConfigFacade {
    store: CacheStore,
}

impl ConfigFacade {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// Active document for `config_type`.
    pub fn read(&self, config_type: ConfigType) -> ConfigDocument {
        match self.store.get(config_type) {
            Some(entry) if entry.is_remote() => entry.document,
            _ => bundled(config_type).clone(),
        }
    }

    pub fn status(&self) -> ConfigStatus {
        let metadata = self.store.metadata();
        let per_type = ConfigType::ALL
            .iter()
            .map(|&config_type| match self.store.get(config_type) {
                Some(entry) => TypeStatus {
                    config_type,
                    source: entry.source,
                    timestamp: Some(entry.timestamp),
                    content_hash: entry.content_hash,
                },
                None => TypeStatus {
                    config_type,
                    source: EntrySource::Bundled,
                    timestamp: None,
                    content_hash: None,
                },
            })
            .collect();

        ConfigStatus {
            last_check: metadata.last_update_check,
            last_update_timestamp: metadata.last_update_timestamp,
            last_update_status: metadata.last_update_status,
            last_successful_update: metadata.last_successful_update,
            refresh_interval_minutes: metadata.refresh_interval_minutes,
            per_type,
        }
    }

    pub fn defaults(&self) -> DefaultsConfig {
        self.typed(ConfigType::Defaults)
    }

    /// Active domain rules. Remote items that do not fit a rule are skipped.
    pub fn domains(&self) -> Vec<DomainRule> {
        match self.read(ConfigType::Domains).domain_rules() {
            Ok(rules) => rules,
            Err(e) => {
                log::warn!("Cached domains config is not a list ({}); using bundled", e);
                bundled(ConfigType::Domains)
                    .domain_rules()
                    .unwrap_or_default()
            }
        }
    }

    pub fn styles(&self) -> StyleClasses {
        self.typed(ConfigType::Styles)
    }

    pub fn ui(&self) -> UiConfig {
        self.typed(ConfigType::Ui)
    }

    /// First domain rule matching `host`, if any.
    pub fn domain_rule_for(&self, host: &str) -> Option<DomainRule> {
        self.domains().into_iter().find(|rule| rule.matches_host(host))
    }

    /// Typed view of the active document, falling back to the bundled one.
    fn typed<T: DeserializeOwned>(&self, config_type: ConfigType) -> T {
        let active = self.read(config_type);
        match active.to_typed() {
            Ok(value) => value,
            Err(e) => {
                log::warn!(
                    "Cached {} config does not fit the typed view ({}); using bundled",
                    config_type,
                    e
                );
                bundled_typed(config_type)
            }
        }
    }
}

fn bundled_typed<T: DeserializeOwned>(config_type: ConfigType) -> T {
    match bundled(config_type).to_typed() {
        Ok(value) => value,
        // Unreachable while the embedded baseline matches its typed views
        Err(e) => panic!("bundled {config_type} config does not fit its typed view: {e}"),
    }
}
