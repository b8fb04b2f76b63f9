//! Default value functions for sync settings and metadata.
//!
//! Used as `#[serde(default = "crate::defaults::...")]` attributes so a
//! settings file that omits a field picks up the same value as a fresh install.

/// Where the four remote config documents are published.
pub const REMOTE_BASE_URL: &str = "https://raw.githubusercontent.com/paulrobello/rtlfix/main/config";

/// Lower bound accepted for the refresh interval (15 minutes).
pub const MIN_REFRESH_INTERVAL_MINUTES: u32 = 15;

/// Upper bound accepted for the refresh interval (one week).
pub const MAX_REFRESH_INTERVAL_MINUTES: u32 = 7 * 24 * 60;

/// Hard cap on configured retry attempts per type.
pub const MAX_ATTEMPTS_CEILING: u32 = 10;

// ── Schedule ───────────────────────────────────────────────────────────────

pub fn refresh_interval_minutes() -> u32 {
    360
}

// ── Fetch ──────────────────────────────────────────────────────────────────

pub fn remote_base_url() -> String {
    REMOTE_BASE_URL.to_string()
}

pub fn fetch_timeout_secs() -> u64 {
    10
}

pub fn max_response_bytes() -> usize {
    1_048_576
}

// ── Retry ──────────────────────────────────────────────────────────────────

pub fn max_attempts() -> u32 {
    3
}

pub fn retry_base_delay_ms() -> u64 {
    1000
}

// ── Misc ───────────────────────────────────────────────────────────────────

pub fn bool_false() -> bool {
    false
}
