//! Durable cache store for config entries and sync metadata.
//!
//! [`CacheStore`] maps the four config types and the metadata record onto a
//! flat key/value namespace. Persistence goes through the [`KeyValueStore`]
//! trait so the same cache logic runs on disk ([`FileStore`]) or in memory
//! ([`MemoryStore`]).

use anyhow::Context;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rtlfix_config::{
    CachedEntry, ConfigMetadata, ConfigType, METADATA_KEY, SyncError, now_millis,
};

/// File name of the on-disk store inside the data directory.
pub const STORE_FILE_NAME: &str = "storage.json";

/// Flat key/value persistence backend.
///
/// Each `set_many`/`remove_many` call is applied as one unit: either every
/// key in the batch is written or none is.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, SyncError>;
    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), SyncError>;
    fn remove_many(&self, keys: &[String]) -> Result<(), SyncError>;
}

/// One JSON object on disk, rewritten atomically per batch.
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at `<data_dir>/storage.json`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> anyhow::Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store {:?}", self.path))?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse store {:?}", self.path))
    }

    fn write_map(&self, map: &Map<String, Value>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory {parent:?}"))?;
        }
        let contents =
            serde_json::to_string_pretty(map).context("Failed to serialize store contents")?;

        // Write to a temp file then rename so a crash never leaves a torn store
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents)
            .with_context(|| format!("Failed to write {temp_path:?}"))?;
        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to move {temp_path:?} into place"))?;
        Ok(())
    }

    /// Current contents for a write. An unreadable store is replaced by the
    /// write rather than blocking every later one.
    fn read_map_for_write(&self) -> Map<String, Value> {
        self.read_map().unwrap_or_else(|e| {
            log::warn!("Discarding unreadable store {:?}: {:#}", self.path, e);
            Map::new()
        })
    }

    fn batch_key(keys: impl Iterator<Item = impl AsRef<str>>) -> String {
        keys.map(|k| k.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        let _guard = self.lock.lock();
        let mut map = self
            .read_map()
            .map_err(|e| SyncError::storage(key, format!("{e:#}")))?;
        Ok(map.remove(key))
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), SyncError> {
        if entries.is_empty() {
            return Ok(());
        }
        let batch = Self::batch_key(entries.iter().map(|(k, _)| k));
        let _guard = self.lock.lock();
        let mut map = self.read_map_for_write();
        for (key, value) in entries {
            map.insert(key, value);
        }
        self.write_map(&map)
            .map_err(|e| SyncError::storage(batch, format!("{e:#}")))
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), SyncError> {
        let batch = Self::batch_key(keys.iter());
        let _guard = self.lock.lock();
        let mut map = self.read_map_for_write();
        for key in keys {
            map.remove(key);
        }
        self.write_map(&map)
            .map_err(|e| SyncError::storage(batch, format!("{e:#}")))
    }
}

/// In-memory backend for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, Value>>,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a storage error.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Insert a raw value, bypassing the read-only flag.
    pub fn insert_raw(&self, key: impl Into<String>, value: Value) {
        self.map.lock().insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    fn check_writable(&self, key: &str) -> Result<(), SyncError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(SyncError::storage(key, "store is read-only"));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), SyncError> {
        if let Some((key, _)) = entries.first() {
            self.check_writable(key)?;
        }
        let mut map = self.map.lock();
        for (key, value) in entries {
            map.insert(key, value);
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), SyncError> {
        if let Some(key) = keys.first() {
            self.check_writable(key)?;
        }
        let mut map = self.map.lock();
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}

/// Typed view over a [`KeyValueStore`].
///
/// Reads never fail: missing or unreadable records come back as `None` (or
/// default metadata) so callers fall back to the bundled baseline.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KeyValueStore>,
    default_interval_minutes: u32,
    /// Serializes metadata read-modify-write within this process
    metadata_lock: Arc<Mutex<()>>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, default_interval_minutes: u32) -> Self {
        Self {
            backend,
            default_interval_minutes,
            metadata_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store backed by a fresh [`MemoryStore`].
    pub fn in_memory(default_interval_minutes: u32) -> Self {
        Self::new(Arc::new(MemoryStore::new()), default_interval_minutes)
    }

    /// Cached entry for `config_type`, or `None` if missing or unreadable.
    pub fn get(&self, config_type: ConfigType) -> Option<CachedEntry> {
        let key = config_type.storage_key();
        let value = match self.backend.get(&key) {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                crate::debug_error!("CONFIG_SYNC", "Store read failed for {}: {}", key, e);
                log::warn!("Ignoring unreadable cache entry {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_value::<CachedEntry>(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Ignoring corrupt cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Replace the entry for `config_type`.
    pub fn put(&self, config_type: ConfigType, entry: &CachedEntry) -> Result<(), SyncError> {
        let key = config_type.storage_key();
        let value = serde_json::to_value(entry).map_err(|e| SyncError::storage(&key, e))?;
        self.backend.set_many(vec![(key.clone(), value)])?;
        crate::debug_log!(
            "CONFIG_SYNC",
            "Stored {} entry (source={}, ts={})",
            key,
            entry.source.display_name(),
            entry.timestamp
        );
        Ok(())
    }

    /// Remove every cached entry and the metadata record in one batch.
    pub fn clear_all(&self) -> Result<(), SyncError> {
        let _guard = self.metadata_lock.lock();
        let mut keys: Vec<String> = ConfigType::ALL.iter().map(|t| t.storage_key()).collect();
        keys.push(METADATA_KEY.to_string());
        self.backend.remove_many(&keys)?;
        crate::debug_info!("CONFIG_SYNC", "Cleared all cached configs");
        Ok(())
    }

    /// Stored metadata, or defaults when absent or unreadable.
    pub fn metadata(&self) -> ConfigMetadata {
        let fallback = || ConfigMetadata::with_interval(self.default_interval_minutes);
        match self.backend.get(METADATA_KEY) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                log::warn!("Ignoring corrupt sync metadata: {}", e);
                fallback()
            }),
            Ok(None) => fallback(),
            Err(e) => {
                log::warn!("Ignoring unreadable sync metadata: {}", e);
                fallback()
            }
        }
    }

    pub fn put_metadata(&self, metadata: &ConfigMetadata) -> Result<(), SyncError> {
        let value =
            serde_json::to_value(metadata).map_err(|e| SyncError::storage(METADATA_KEY, e))?;
        self.backend.set_many(vec![(METADATA_KEY.to_string(), value)])
    }

    /// Apply `update` to the current metadata and persist the whole record.
    ///
    /// Returns the record as written.
    pub fn update_metadata(
        &self,
        update: impl FnOnce(&mut ConfigMetadata),
    ) -> Result<ConfigMetadata, SyncError> {
        let _guard = self.metadata_lock.lock();
        let mut metadata = self.metadata();
        update(&mut metadata);
        self.put_metadata(&metadata)?;
        Ok(metadata)
    }

    /// Write bundled entries for every type that has no readable entry.
    ///
    /// Returns the number of entries seeded.
    pub fn seed_bundled(&self) -> Result<usize, SyncError> {
        let now = now_millis();
        let mut batch = Vec::new();
        for config_type in ConfigType::ALL {
            if self.get(config_type).is_some() {
                continue;
            }
            let entry = CachedEntry::bundled(config_type, now);
            let key = config_type.storage_key();
            let value = serde_json::to_value(&entry).map_err(|e| SyncError::storage(&key, e))?;
            batch.push((key, value));
        }
        let seeded = batch.len();
        self.backend.set_many(batch)?;
        if seeded > 0 {
            crate::debug_info!("CONFIG_SYNC", "Seeded {} bundled config entries", seeded);
        }
        Ok(seeded)
    }
}
