//! Typed error variants for the rtlfix configuration sync core.
//!
//! Every failure the sync pipeline can observe falls into one of four
//! categories. The scheduler decides retry behaviour by category:
//! network and parse failures are retried with backoff, validation failures
//! are terminal for the attempt, and storage failures are logged and reported
//! to the caller without ever interrupting the drain.

use thiserror::Error;

use crate::config_type::ConfigType;

/// Top-level error type for configuration synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Timeout, connection failure or non-2xx response.
    #[error("network error fetching {config_type} config: {message}")]
    Network {
        /// The config document being fetched.
        config_type: ConfigType,
        /// Human-readable description of the failure.
        message: String,
    },

    /// The response body was not valid JSON.
    #[error("parse error in {config_type} config: {message}")]
    Parse {
        /// The config document being parsed.
        config_type: ConfigType,
        /// Parser diagnostic.
        message: String,
    },

    /// The document is structurally incompatible with the bundled baseline.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Persistence read or write failure.
    #[error("storage error for '{key}': {message}")]
    Storage {
        /// Storage key involved in the failing operation.
        key: String,
        /// Underlying failure description.
        message: String,
    },
}

impl SyncError {
    /// Build a storage error from any displayable source.
    pub fn storage(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        SyncError::Storage {
            key: key.into(),
            message: err.to_string(),
        }
    }
}

/// A candidate document failed the structural compatibility gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{config_type} config rejected at '{path}': {reason}")]
pub struct ValidationError {
    /// Which document type was being validated.
    pub config_type: ConfigType,
    /// JSON path of the offending value (`$` is the document root).
    pub path: String,
    /// Why the value was rejected.
    pub reason: String,
}

impl ValidationError {
    pub(crate) fn new(
        config_type: ConfigType,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            config_type,
            path: path.into(),
            reason: reason.into(),
        }
    }
}
