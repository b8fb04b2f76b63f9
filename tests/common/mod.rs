//! Shared integration test helpers for rtlfix.
//!
//! Include this module at the top of each test file that needs it:
//!
//! ```ignore
//! mod common;
//! use common::{TestRemote, memory_sync};
//! ```
//!
//! The `#[allow(dead_code)]` attribute suppresses warnings when only a subset
//! of helpers is used per file.

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use rtlfix::sync::{
    CacheStore, ConfigSync, CycleReport, FileStore, MemoryStore, RefreshHandle, SchedulerConfig,
};
use rtlfix_config::{ConfigType, bundled};
use rtlfix_update::{ContentFetcher, FetchError};

pub const BASE_URL: &str = "https://config.test/rtlfix";

/// In-process stand-in for the remote config host.
///
/// Each type serves a sticky response; `fail_next` queues failures that are
/// returned before it. Every request is counted per type.
#[derive(Default)]
pub struct TestRemote {
    bodies: Mutex<HashMap<ConfigType, Result<Vec<u8>, FetchError>>>,
    pending_failures: Mutex<HashMap<ConfigType, u32>>,
    requests: Mutex<HashMap<ConfigType, u32>>,
}

impl TestRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve the bundled documents for every type.
    pub fn with_bundled() -> Arc<Self> {
        let remote = Self::new();
        for t in ConfigType::ALL {
            remote.serve(t, bundled(t).as_value());
        }
        remote
    }

    pub fn serve(&self, config_type: ConfigType, body: &Value) {
        let bytes = serde_json::to_vec(body).expect("serialize body");
        self.bodies.lock().insert(config_type, Ok(bytes));
    }

    pub fn serve_error(&self, config_type: ConfigType, error: FetchError) {
        self.bodies.lock().insert(config_type, Err(error));
    }

    /// Answer the next `count` requests for `config_type` with HTTP 503.
    pub fn fail_next(&self, config_type: ConfigType, count: u32) {
        self.pending_failures.lock().insert(config_type, count);
    }

    pub fn requests(&self, config_type: ConfigType) -> u32 {
        self.requests.lock().get(&config_type).copied().unwrap_or(0)
    }

    fn respond(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let Some(config_type) = ConfigType::ALL
            .into_iter()
            .find(|t| url.contains(&format!("/{}?", t.file_name())))
        else {
            return Err(FetchError::Status(404));
        };
        *self.requests.lock().entry(config_type).or_default() += 1;

        if let Some(remaining) = self.pending_failures.lock().get_mut(&config_type)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(FetchError::Status(503));
        }

        self.bodies
            .lock()
            .get(&config_type)
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }

    pub fn fetcher(self: &Arc<Self>) -> ContentFetcher {
        let remote = Arc::clone(self);
        ContentFetcher::new(
            move |url: &str| -> Result<Vec<u8>, FetchError> { remote.respond(url) },
            BASE_URL,
            false,
        )
    }
}

/// Fast retry settings: millisecond backoff, `max_attempts` total attempts.
pub fn fast_config(max_attempts: u32) -> SchedulerConfig {
    SchedulerConfig {
        max_attempts,
        retry_base_delay: Duration::from_millis(1),
        fetch_timeout: Duration::from_secs(2),
        timeout_slack: Duration::ZERO,
    }
}

/// Sync service over an in-memory store. Must be called inside a runtime.
pub fn memory_sync(remote: &Arc<TestRemote>, max_attempts: u32) -> (ConfigSync, Arc<MemoryStore>) {
    let backend = Arc::new(MemoryStore::new());
    let store = CacheStore::new(backend.clone(), 360);
    let sync = ConfigSync::new(store, remote.fetcher(), fast_config(max_attempts));
    (sync, backend)
}

/// Sync service over a file store in `dir`. Must be called inside a runtime.
pub fn file_sync(remote: &Arc<TestRemote>, dir: &TempDir) -> ConfigSync {
    let store = CacheStore::new(Arc::new(FileStore::in_dir(dir.path())), 360);
    ConfigSync::new(store, remote.fetcher(), fast_config(3))
}

/// Wait for a refresh handle, failing the test instead of hanging.
pub async fn finish(handle: RefreshHandle) -> CycleReport {
    tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("cycle should finish within 10s")
        .expect("worker should deliver a report")
}
