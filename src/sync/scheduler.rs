//! Update scheduler: refresh decision, queue drain, retry and cycle reporting.
//!
//! One worker task owns the queue. Callers enqueue config types over an
//! unbounded channel and may attach a oneshot to hear about the cycle their
//! request lands in. Jobs that arrive while a drain is running are absorbed
//! into that drain, so at most one drain runs at a time and every waiter that
//! joined a cycle receives the same [`CycleReport`].
//!
//! Resets go through the same channel. The worker applies them between jobs
//! and drops whatever was still queued, so no fetch started before a reset
//! can write its result after it.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use rtlfix_config::{
    CachedEntry, ConfigType, SyncError, SyncSettings, UpdateStatus, ValidationError,
    clamp_refresh_interval, now_millis, validate,
};
use rtlfix_update::{ContentFetcher, FetchError, FetchResult};

use crate::sync::broadcast::{Broadcaster, ConfigEvent};
use crate::sync::store::CacheStore;

/// Shortest sleep of the periodic timer between refresh decisions.
const MIN_TIMER_SLEEP: Duration = Duration::from_secs(60);

/// Default slack added to the fetch timeout for the outer bound on a blocking fetch.
pub const DEFAULT_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

/// Retry and timeout tunables for the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Total fetch attempts per type, including the first
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub fetch_timeout: Duration,
    /// Added to `fetch_timeout` before a fetch still running is abandoned
    pub timeout_slack: Duration,
}

impl SchedulerConfig {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            retry_base_delay: settings.retry_base_delay(),
            fetch_timeout: settings.fetch_timeout(),
            timeout_slack: DEFAULT_TIMEOUT_SLACK,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Queue empty, worker waiting
    Idle,
    /// Jobs enqueued, worker not yet draining
    Queued,
    /// Worker is processing the queue
    Draining,
}

/// Result of processing one config type within a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeOutcome {
    /// New content validated and stored
    Updated { fingerprint: String },
    /// Remote matched the cached fingerprint; timestamp refreshed
    Unchanged,
    /// Remote content failed validation; cache untouched
    Rejected(ValidationError),
    /// Every attempt failed, or the result could not be stored
    Failed { attempts: u32, error: String },
}

impl TypeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TypeOutcome::Updated { .. } | TypeOutcome::Unchanged)
    }
}

impl fmt::Display for TypeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeOutcome::Updated { fingerprint } => {
                write!(f, "updated ({})", &fingerprint[..fingerprint.len().min(12)])
            }
            TypeOutcome::Unchanged => write!(f, "unchanged"),
            TypeOutcome::Rejected(e) => write!(f, "rejected: {e}"),
            TypeOutcome::Failed { attempts, error } => {
                write!(f, "failed after {attempts} attempt(s): {error}")
            }
        }
    }
}

/// Summary of one drain cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub status: UpdateStatus,
    /// Processed jobs in processing order
    pub outcomes: Vec<(ConfigType, TypeOutcome)>,
    pub started_at: i64,
    pub finished_at: i64,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Outcome for `config_type`, the last one if it was processed twice.
    pub fn outcome(&self, config_type: ConfigType) -> Option<&TypeOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|(t, _)| *t == config_type)
            .map(|(_, o)| o)
    }
}

/// Completion notice for a requested refresh.
///
/// Dropping the handle is fine; the refresh still runs.
pub struct RefreshHandle {
    rx: oneshot::Receiver<CycleReport>,
}

impl RefreshHandle {
    /// Wait for the cycle this request joined.
    ///
    /// Returns `None` if the worker stopped before the cycle finished.
    pub async fn wait(self) -> Option<CycleReport> {
        self.rx.await.ok()
    }
}

enum Command {
    Enqueue {
        types: Vec<ConfigType>,
        notify: Option<oneshot::Sender<CycleReport>>,
    },
    Reset {
        done: oneshot::Sender<Result<(), SyncError>>,
    },
    Shutdown,
}

struct Shared {
    store: CacheStore,
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<Mutex<SchedulerState>>,
    interval_tx: watch::Sender<u32>,
    shutdown_tx: watch::Sender<bool>,
}

/// Handle to the scheduler worker. Cheap to clone.
#[derive(Clone)]
pub struct UpdateScheduler {
    shared: Arc<Shared>,
}

impl UpdateScheduler {
    /// Spawn the worker task. Must be called within a tokio runtime.
    pub fn spawn(
        store: CacheStore,
        fetcher: Arc<ContentFetcher>,
        broadcaster: Arc<Broadcaster>,
        config: SchedulerConfig,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(SchedulerState::Idle));
        let (interval_tx, _) = watch::channel(store.metadata().refresh_interval_minutes);
        let (shutdown_tx, _) = watch::channel(false);

        let worker = Worker {
            store: store.clone(),
            fetcher,
            broadcaster,
            config,
            state: Arc::clone(&state),
            rx,
            queue: VecDeque::new(),
            waiters: Vec::new(),
            reset_seen: false,
            stopping: false,
        };
        tokio::spawn(worker.run());

        Self {
            shared: Arc::new(Shared {
                store,
                commands,
                state,
                interval_tx,
                shutdown_tx,
            }),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.lock()
    }

    /// Whether a refresh is due at `now_ms`.
    pub fn should_refresh_at(&self, now_ms: i64) -> bool {
        self.shared.store.metadata().is_refresh_due(now_ms)
    }

    pub fn should_refresh(&self) -> bool {
        self.should_refresh_at(now_millis())
    }

    /// Refresh all types if the interval has elapsed.
    ///
    /// Returns immediately; `None` when no refresh was due.
    pub fn check_and_refresh(&self) -> Option<RefreshHandle> {
        let now = now_millis();
        if !self.should_refresh_at(now) {
            crate::debug_trace!("CONFIG_SYNC", "Refresh not due");
            return None;
        }
        crate::debug_info!("CONFIG_SYNC", "Refresh due, enqueueing all config types");
        Some(self.begin_refresh(now))
    }

    /// Refresh all types regardless of the interval.
    pub fn force_refresh(&self) -> RefreshHandle {
        crate::debug_info!("CONFIG_SYNC", "Forced refresh requested");
        self.begin_refresh(now_millis())
    }

    /// Enqueue specific types without touching `last_update_check`.
    pub fn refresh_types(&self, types: &[ConfigType]) -> RefreshHandle {
        self.enqueue(types.to_vec())
    }

    /// Set the refresh interval, clamped to 15..=10080 minutes.
    ///
    /// Returns the interval actually stored and wakes the periodic timer.
    pub fn update_refresh_interval(&self, minutes: u32) -> Result<u32, SyncError> {
        let clamped = clamp_refresh_interval(minutes);
        if clamped != minutes {
            log::warn!(
                "Refresh interval {} min out of range, using {} min",
                minutes,
                clamped
            );
        }
        self.shared
            .store
            .update_metadata(|m| m.refresh_interval_minutes = clamped)?;
        self.shared.interval_tx.send_replace(clamped);
        crate::debug_info!("CONFIG_SYNC", "Refresh interval set to {} min", clamped);
        Ok(clamped)
    }

    /// Spawn the periodic timer.
    ///
    /// The timer sleeps until the next check is due (at least one minute),
    /// then runs the refresh decision. Interval changes wake it early.
    pub fn spawn_periodic(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        let mut interval_rx = self.shared.interval_tx.subscribe();
        let mut shutdown_rx = self.shared.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                let _ = scheduler.check_and_refresh();

                let wait = scheduler.time_until_due();
                crate::debug_trace!("CONFIG_SYNC", "Next refresh check in {:?}", wait);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            crate::debug_info!("CONFIG_SYNC", "Periodic refresh timer stopped");
        })
    }

    /// Drop every cached entry and the metadata record.
    ///
    /// Runs on the worker between jobs: a fetch in flight finishes first,
    /// queued jobs are dropped, and the running cycle forgets the outcomes
    /// it had collected. Falls back to clearing directly when the worker is
    /// gone.
    pub async fn reset(&self) -> Result<(), SyncError> {
        let (done, rx) = oneshot::channel();
        if self.shared.commands.send(Command::Reset { done }).is_err() {
            return self.shared.store.clear_all();
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => self.shared.store.clear_all(),
        }
    }

    /// Stop the worker after the current cycle and stop the periodic timer.
    pub fn shutdown(&self) {
        self.shared.shutdown_tx.send_replace(true);
        let _ = self.shared.commands.send(Command::Shutdown);
    }

    fn time_until_due(&self) -> Duration {
        let millis = self.shared.store.metadata().millis_until_due(now_millis());
        Duration::from_millis(millis.max(0) as u64).max(MIN_TIMER_SLEEP)
    }

    fn begin_refresh(&self, now_ms: i64) -> RefreshHandle {
        if let Err(e) = self
            .shared
            .store
            .update_metadata(|m| m.last_update_check = Some(now_ms))
        {
            log::error!("Failed to record update check: {}", e);
        }
        self.enqueue(ConfigType::ALL.to_vec())
    }

    fn enqueue(&self, types: Vec<ConfigType>) -> RefreshHandle {
        let (tx, rx) = oneshot::channel();
        let mut state = self.shared.state.lock();
        let sent = self
            .shared
            .commands
            .send(Command::Enqueue {
                types,
                notify: Some(tx),
            })
            .is_ok();
        if !sent {
            log::warn!("Config sync worker is not running; refresh dropped");
        } else if *state == SchedulerState::Idle {
            *state = SchedulerState::Queued;
        }
        RefreshHandle { rx }
    }
}

struct Worker {
    store: CacheStore,
    fetcher: Arc<ContentFetcher>,
    broadcaster: Arc<Broadcaster>,
    config: SchedulerConfig,
    state: Arc<Mutex<SchedulerState>>,
    rx: mpsc::UnboundedReceiver<Command>,
    queue: VecDeque<ConfigType>,
    waiters: Vec<oneshot::Sender<CycleReport>>,
    /// A reset was applied since the current cycle last checked
    reset_seen: bool,
    stopping: bool,
}

impl Worker {
    async fn run(mut self) {
        crate::debug_info!("CONFIG_SYNC", "Config sync worker started");
        while !self.stopping {
            let Some(command) = self.rx.recv().await else {
                break;
            };
            self.absorb(command);
            if self.queue.is_empty() && self.waiters.is_empty() {
                continue;
            }
            self.drain().await;
        }
        crate::debug_info!("CONFIG_SYNC", "Config sync worker stopped");
    }

    fn absorb(&mut self, command: Command) {
        match command {
            Command::Enqueue { types, notify } => {
                for config_type in types {
                    if !self.queue.contains(&config_type) {
                        self.queue.push_back(config_type);
                    }
                }
                if let Some(tx) = notify {
                    self.waiters.push(tx);
                }
            }
            Command::Reset { done } => {
                if !self.queue.is_empty() {
                    crate::debug_info!(
                        "CONFIG_SYNC",
                        "Reset dropped {} queued job(s)",
                        self.queue.len()
                    );
                }
                self.queue.clear();
                self.reset_seen = true;
                let _ = done.send(self.store.clear_all());
            }
            Command::Shutdown => self.stopping = true,
        }
    }

    /// Absorb pending commands; when none remain and the queue is empty,
    /// mark the scheduler idle. Returns the next job, if any.
    fn next_job(&mut self) -> Option<ConfigType> {
        let shared_state = Arc::clone(&self.state);
        let mut state = shared_state.lock();
        while let Ok(command) = self.rx.try_recv() {
            self.absorb(command);
        }
        let job = self.queue.pop_front();
        if job.is_none() {
            *state = SchedulerState::Idle;
        }
        job
    }

    async fn drain(&mut self) {
        *self.state.lock() = SchedulerState::Draining;
        let started_at = now_millis();
        let mut outcomes = Vec::new();
        self.reset_seen = false;

        loop {
            let job = self.next_job();
            if std::mem::take(&mut self.reset_seen) {
                // Results stored before the reset were wiped with the cache
                outcomes.clear();
            }
            let Some(config_type) = job else {
                break;
            };
            let outcome = self.process(config_type).await;
            crate::debug_log!("CONFIG_SYNC", "{}: {}", config_type, outcome);
            outcomes.push((config_type, outcome));
        }

        self.finish_cycle(started_at, outcomes);
    }

    fn finish_cycle(&mut self, started_at: i64, outcomes: Vec<(ConfigType, TypeOutcome)>) {
        let finished_at = now_millis();
        let succeeded = outcomes.iter().filter(|(_, o)| o.is_success()).count();
        let status = UpdateStatus::classify(succeeded, outcomes.len());

        if !outcomes.is_empty() {
            let result = self.store.update_metadata(|m| {
                m.last_update_timestamp = Some(finished_at);
                m.last_update_status = status;
                if status == UpdateStatus::Success {
                    m.last_successful_update = Some(finished_at);
                }
            });
            if let Err(e) = result {
                log::error!("Failed to record update status: {}", e);
            }
        }

        let report = CycleReport {
            status,
            outcomes,
            started_at,
            finished_at,
        };
        log::info!(
            "Config update cycle finished: {} ({}/{} succeeded)",
            status.display_name(),
            report.succeeded(),
            report.outcomes.len()
        );

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(report.clone());
        }
        self.broadcaster.notify_all(&ConfigEvent::Refreshed(report));
    }

    async fn process(&self, config_type: ConfigType) -> TypeOutcome {
        let previous = self.store.get(config_type);
        let previous_fingerprint = previous.as_ref().and_then(|e| e.content_hash.clone());
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.fetch(config_type, previous_fingerprint.clone()).await {
                FetchResult::Unchanged => {
                    return self.store_unchanged(config_type, previous.as_ref(), attempt);
                }
                FetchResult::Updated {
                    document,
                    fingerprint,
                } => {
                    if let Err(e) = validate(config_type, &document) {
                        log::warn!("Rejected remote {} config: {}", config_type, e);
                        return TypeOutcome::Rejected(e);
                    }
                    let entry = CachedEntry::remote(document, fingerprint.clone(), now_millis());
                    return match self.store.put(config_type, &entry) {
                        Ok(()) => TypeOutcome::Updated { fingerprint },
                        Err(e) => storage_failure(config_type, attempt, e),
                    };
                }
                FetchResult::Failed(error) => error,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                let error = error.into_sync_error(config_type);
                log::warn!(
                    "Giving up on {} config after {} attempt(s): {}",
                    config_type,
                    attempt,
                    error
                );
                return TypeOutcome::Failed {
                    attempts: attempt,
                    error: error.to_string(),
                };
            }

            let delay = backoff_delay(self.config.retry_base_delay, attempt);
            crate::debug_log!(
                "CONFIG_SYNC",
                "{} attempt {} failed ({}), retrying in {:?}",
                config_type,
                attempt,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn store_unchanged(
        &self,
        config_type: ConfigType,
        previous: Option<&CachedEntry>,
        attempt: u32,
    ) -> TypeOutcome {
        let Some(previous) = previous else {
            return TypeOutcome::Unchanged;
        };
        match self.store.put(config_type, &previous.touched(now_millis())) {
            Ok(()) => TypeOutcome::Unchanged,
            Err(e) => storage_failure(config_type, attempt, e),
        }
    }

    /// Run one blocking fetch on the blocking pool with an outer timeout.
    async fn fetch(&self, config_type: ConfigType, previous: Option<String>) -> FetchResult {
        let fetcher = Arc::clone(&self.fetcher);
        let task =
            tokio::task::spawn_blocking(move || fetcher.fetch(config_type, previous.as_deref()));

        let limit = self.config.fetch_timeout + self.config.timeout_slack;
        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => FetchResult::Failed(FetchError::Network(format!(
                "fetch task failed: {join_error}"
            ))),
            Err(_) => FetchResult::Failed(FetchError::Timeout),
        }
    }
}

fn storage_failure(config_type: ConfigType, attempts: u32, error: SyncError) -> TypeOutcome {
    log::error!("Failed to store {} config: {}", config_type, error);
    TypeOutcome::Failed {
        attempts,
        error: error.to_string(),
    }
}
