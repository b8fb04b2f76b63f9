//! Dynamic configuration sync.
//!
//! [`ConfigSync`] wires the pieces together:
//!
//! - [`store::CacheStore`] persists cached entries and sync metadata
//! - [`facade::ConfigFacade`] answers reads, falling back to the bundled baseline
//! - [`scheduler::UpdateScheduler`] decides when to refresh and drains the queue
//! - [`broadcast::Broadcaster`] tells consumers to re-read after a cycle or reset
//!
//! Fetching and validation live in the `rtlfix-update` and `rtlfix-config`
//! crates.

pub mod broadcast;
pub mod facade;
pub mod scheduler;
pub mod store;


pub use broadcast::{Broadcaster, ConfigEvent, ConsumerId};
pub use facade::{ConfigFacade, ConfigStatus, TypeStatus};
pub use scheduler::{
    CycleReport, DEFAULT_TIMEOUT_SLACK, RefreshHandle, SchedulerConfig, SchedulerState,
    TypeOutcome, UpdateScheduler, backoff_delay,
};
pub use store::{CacheStore, FileStore, KeyValueStore, MemoryStore};

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rtlfix_config::{ConfigDocument, ConfigType, SyncError, SyncSettings};
use rtlfix_update::ContentFetcher;

/// The configuration sync service.
///
/// Must be created within a tokio runtime; the scheduler worker is spawned
/// on construction.
pub struct ConfigSync {
    facade: ConfigFacade,
    scheduler: UpdateScheduler,
    broadcaster: Arc<Broadcaster>,
}

impl ConfigSync {
    pub fn new(store: CacheStore, fetcher: ContentFetcher, config: SchedulerConfig) -> Self {
        let broadcaster = Arc::new(Broadcaster::new());
        let facade = ConfigFacade::new(store.clone());
        let scheduler = UpdateScheduler::spawn(
            store,
            Arc::new(fetcher),
            Arc::clone(&broadcaster),
            config,
        );
        Self {
            facade,
            scheduler,
            broadcaster,
        }
    }

    /// Open the file-backed store under the settings' data directory and use
    /// the HTTP fetcher. Seeds bundled entries for types never written.
    pub fn open(settings: &SyncSettings) -> anyhow::Result<Self> {
        let data_dir = settings.resolved_data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {data_dir:?}"))?;

        let backend = Arc::new(FileStore::in_dir(&data_dir));
        log::info!("Config store: {:?}", backend.path());
        let store = CacheStore::new(backend, settings.default_refresh_interval_minutes);

        if let Err(e) = store.seed_bundled() {
            // Reads still fall back to the bundled baseline
            log::warn!("Failed to seed bundled configs: {}", e);
        }

        Ok(Self::new(
            store,
            ContentFetcher::from_settings(settings),
            SchedulerConfig::from_settings(settings),
        ))
    }

    pub fn facade(&self) -> &ConfigFacade {
        &self.facade
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Active document for `config_type`. Never fails.
    pub fn read(&self, config_type: ConfigType) -> ConfigDocument {
        self.facade.read(config_type)
    }

    pub fn status(&self) -> ConfigStatus {
        self.facade.status()
    }

    pub fn should_refresh(&self) -> bool {
        self.scheduler.should_refresh()
    }

    pub fn check_and_refresh(&self) -> Option<RefreshHandle> {
        self.scheduler.check_and_refresh()
    }

    pub fn force_refresh(&self) -> RefreshHandle {
        self.scheduler.force_refresh()
    }

    pub fn update_refresh_interval(&self, minutes: u32) -> Result<u32, SyncError> {
        self.scheduler.update_refresh_interval(minutes)
    }

    /// Reset to bundled: drop every cached entry and the metadata record,
    /// then tell consumers to re-read.
    ///
    /// A cycle in progress cannot write over the reset; see
    /// [`UpdateScheduler::reset`].
    pub async fn clear_all_configs(&self) -> Result<(), SyncError> {
        self.scheduler.reset().await?;
        log::info!("Cleared cached configs; bundled baseline is active");
        self.broadcaster.notify_all(&ConfigEvent::Reset);
        Ok(())
    }

    pub fn register(&self) -> (ConsumerId, mpsc::UnboundedReceiver<ConfigEvent>) {
        self.broadcaster.register()
    }

    pub fn unregister(&self, id: ConsumerId) -> bool {
        self.broadcaster.unregister(id)
    }

    pub fn spawn_periodic(&self) -> JoinHandle<()> {
        self.scheduler.spawn_periodic()
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
