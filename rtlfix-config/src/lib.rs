//! Configuration model for the rtlfix sync core.
//!
//! This crate provides the data shared by every layer of the sync pipeline:
//!
//! - The four config types and their storage keys
//! - Config documents and the typed views styling code reads them through
//! - Bundled baseline documents embedded at build time
//! - The structural validator that gates remote documents
//! - Cached entry and metadata records
//! - Sync settings with YAML persistence
//! - The error taxonomy

pub mod baseline;
pub mod cached;
pub mod config_type;
pub mod defaults;
pub mod document;
pub mod error;
pub mod metadata;
pub mod settings;
pub mod validate;

pub use baseline::bundled;
pub use cached::{CachedEntry, EntrySource};
pub use config_type::{CACHE_KEY_PREFIX, ConfigType, METADATA_KEY};
pub use document::{
    BehaviourSettings, ConfigDocument, CssValue, Declarations, DefaultsConfig, DomainRule,
    PositionSpec, SelectorSpec, StyleClasses, ThemePair, UiConfig,
};
pub use error::{SyncError, ValidationError};
pub use metadata::{ConfigMetadata, UpdateStatus, format_timestamp, now_millis};
pub use settings::{SyncSettings, clamp_refresh_interval};
pub use validate::{accept, validate};
