//! Fetch failure reasons.

use rtlfix_config::{ConfigType, SyncError};
use thiserror::Error;

/// Why a fetch produced no usable document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The source URL could not be parsed or has no host.
    #[error("invalid source URL {0}")]
    InvalidUrl(String),

    /// The source URL uses a scheme that is not allowed.
    #[error("insecure source URL: {0}")]
    InsecureUrl(String),

    /// DNS, connect or TLS failure.
    #[error("request failed: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("server returned HTTP {0}")]
    Status(u16),

    /// The request did not complete within the fetch timeout.
    #[error("request timed out")]
    Timeout,

    /// The body could not be read or exceeded the size limit.
    #[error("failed to read response body: {0}")]
    BodyRead(String),

    /// The body was not valid JSON.
    #[error("response is not valid JSON: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether a later attempt could succeed.
    ///
    /// URL problems are configuration errors and will fail identically every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidUrl(_) | FetchError::InsecureUrl(_))
    }

    /// Map into the sync core's error taxonomy.
    pub fn into_sync_error(self, config_type: ConfigType) -> SyncError {
        match self {
            FetchError::Parse(message) => SyncError::Parse {
                config_type,
                message,
            },
            other => SyncError::Network {
                config_type,
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(FetchError::Parse("eof".into()).is_retryable());
        assert!(!FetchError::InsecureUrl("http".into()).is_retryable());
    }

    #[test]
    fn test_into_sync_error_category() {
        let parse = FetchError::Parse("eof".into()).into_sync_error(ConfigType::Ui);
        assert!(matches!(parse, SyncError::Parse { .. }));

        let status = FetchError::Status(404).into_sync_error(ConfigType::Ui);
        match status {
            SyncError::Network { message, .. } => assert!(message.contains("404")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
