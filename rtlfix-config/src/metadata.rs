//! Process-wide sync metadata record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current format version of the persisted metadata record.
pub const METADATA_VERSION: u32 = 1;

/// Outcome of the most recent drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    /// No cycle has completed yet
    #[default]
    Never,
    /// Every processed type succeeded
    Success,
    /// Some, but not all, processed types succeeded
    Partial,
    /// No processed type succeeded
    Failed,
}

impl UpdateStatus {
    /// Classify a cycle from its success and job counts.
    pub fn classify(succeeded: usize, total: usize) -> Self {
        if total == 0 {
            UpdateStatus::Never
        } else if succeeded == total {
            UpdateStatus::Success
        } else if succeeded > 0 {
            UpdateStatus::Partial
        } else {
            UpdateStatus::Failed
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            UpdateStatus::Never => "never",
            UpdateStatus::Success => "success",
            UpdateStatus::Partial => "partial",
            UpdateStatus::Failed => "failed",
        }
    }
}

/// Timestamps and schedule for the update cycle. All timestamps are epoch ms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// When the scheduler last decided to run a refresh
    #[serde(default)]
    pub last_update_check: Option<i64>,
    /// When the last drain cycle finished
    #[serde(default)]
    pub last_update_timestamp: Option<i64>,
    #[serde(default)]
    pub last_update_status: UpdateStatus,
    /// When the last fully successful drain cycle finished
    #[serde(default)]
    pub last_successful_update: Option<i64>,
    #[serde(default = "crate::defaults::refresh_interval_minutes")]
    pub refresh_interval_minutes: u32,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    METADATA_VERSION
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        Self::with_interval(crate::defaults::refresh_interval_minutes())
    }
}

impl ConfigMetadata {
    /// Fresh metadata with a specific refresh interval.
    pub fn with_interval(refresh_interval_minutes: u32) -> Self {
        Self {
            last_update_check: None,
            last_update_timestamp: None,
            last_update_status: UpdateStatus::Never,
            last_successful_update: None,
            refresh_interval_minutes,
            version: METADATA_VERSION,
        }
    }

    /// Whole minutes elapsed since the last check, `None` if never checked.
    pub fn minutes_since_check(&self, now_ms: i64) -> Option<i64> {
        self.last_update_check
            .map(|checked| now_ms.saturating_sub(checked).max(0) / 60_000)
    }

    /// Whether a scheduled refresh is due at `now_ms`.
    pub fn is_refresh_due(&self, now_ms: i64) -> bool {
        match self.minutes_since_check(now_ms) {
            None => true,
            Some(elapsed) => elapsed >= i64::from(self.refresh_interval_minutes),
        }
    }

    /// Milliseconds until the next refresh is due (zero when already due).
    pub fn millis_until_due(&self, now_ms: i64) -> i64 {
        let Some(checked) = self.last_update_check else {
            return 0;
        };
        let due_at = checked.saturating_add(i64::from(self.refresh_interval_minutes) * 60_000);
        due_at.saturating_sub(now_ms).max(0)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format an epoch-ms timestamp for display
pub fn format_timestamp(timestamp_ms: Option<i64>) -> String {
    match timestamp_ms.and_then(DateTime::<Utc>::from_timestamp_millis) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "never".to_string(),
    }
}
