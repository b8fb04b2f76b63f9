//! Content fetcher for remote config documents.
//!
//! Fetches one document per call with:
//! - A cache-defeating query parameter on every request
//! - A bounded timeout and response size limit
//! - A SHA-256 fingerprint over the raw body, computed before parsing, so
//!   "unchanged" detection is exact and independent of JSON key order
//!
//! The fetcher never touches the cache; deciding what to do with the result
//! is the scheduler's job.

use sha2::{Digest, Sha256};
use std::time::Duration;

use rtlfix_config::{ConfigDocument, ConfigType, SyncSettings, now_millis};

use crate::error::FetchError;
use crate::http;

/// Raw byte transport behind the fetcher.
///
/// Implemented by [`HttpTransport`] for real traffic, and by any
/// `Fn(&str) -> Result<Vec<u8>, FetchError>` closure for tests and embedding.
pub trait Transport: Send + Sync {
    /// GET `url`, returning the response body of a 2xx response.
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

impl<F> Transport for F
where
    F: Fn(&str) -> Result<Vec<u8>, FetchError> + Send + Sync,
{
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self(url)
    }
}

/// ureq-backed transport.
pub struct HttpTransport {
    agent: ureq::Agent,
    max_response_bytes: u64,
}

impl HttpTransport {
    pub fn new(timeout: Duration, max_response_bytes: usize) -> Self {
        Self {
            agent: http::agent(timeout),
            max_response_bytes: max_response_bytes as u64,
        }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        http::get_bytes(&self.agent, url, self.max_response_bytes)
    }
}

/// Outcome of a single fetch.
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// Remote body hashes to the previous fingerprint; nothing to parse.
    Unchanged,
    /// New content, parsed as JSON.
    Updated {
        document: ConfigDocument,
        fingerprint: String,
    },
    /// Network error, non-2xx status, timeout or parse error.
    Failed(FetchError),
}

/// SHA-256 hex digest of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fetches config documents from their fixed remote URLs.
pub struct ContentFetcher {
    transport: Box<dyn Transport>,
    base_url: String,
    allow_http: bool,
}

impl ContentFetcher {
    pub fn new(
        transport: impl Transport + 'static,
        base_url: impl Into<String>,
        allow_http: bool,
    ) -> Self {
        Self {
            transport: Box::new(transport),
            base_url: base_url.into(),
            allow_http,
        }
    }

    /// Fetcher using the real HTTP transport configured from `settings`.
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            HttpTransport::new(settings.fetch_timeout(), settings.max_response_bytes),
            settings.remote_base_url.clone(),
            settings.allow_http,
        )
    }

    /// Fixed remote URL for `config_type`, without the cache-busting parameter.
    pub fn source_url(&self, config_type: ConfigType) -> String {
        config_type.remote_url(&self.base_url)
    }

    /// Fetch `config_type`, comparing against `previous_fingerprint`.
    pub fn fetch(
        &self,
        config_type: ConfigType,
        previous_fingerprint: Option<&str>,
    ) -> FetchResult {
        match self.fetch_inner(config_type, previous_fingerprint) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Failed to fetch {} config: {}", config_type, e);
                FetchResult::Failed(e)
            }
        }
    }

    fn fetch_inner(
        &self,
        config_type: ConfigType,
        previous_fingerprint: Option<&str>,
    ) -> Result<FetchResult, FetchError> {
        let source = http::validate_source_url(&self.source_url(config_type), self.allow_http)?;
        let url = http::cache_busted_url(&source, now_millis());
        log::debug!("Fetching {} config from {}", config_type, url);

        let body = self.transport.get(&url)?;
        let hash = fingerprint(&body);

        if previous_fingerprint == Some(hash.as_str()) {
            log::debug!("{} config unchanged ({})", config_type, short_hash(&hash));
            return Ok(FetchResult::Unchanged);
        }

        let document =
            ConfigDocument::from_slice(&body).map_err(|e| FetchError::Parse(e.to_string()))?;
        log::info!(
            "Fetched new {} config ({} bytes, {})",
            config_type,
            body.len(),
            short_hash(&hash)
        );

        Ok(FetchResult::Updated {
            document,
            fingerprint: hash,
        })
    }
}

fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BASE: &str = "https://config.example.com/rtl";

    fn fixed_body(body: &'static str) -> impl Transport {
        move |_url: &str| -> Result<Vec<u8>, FetchError> { Ok(body.as_bytes().to_vec()) }
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_updated_when_no_previous_fingerprint() {
        let body = r#"{"rtl-auto":{"direction":"rtl"}}"#;
        let fetcher = ContentFetcher::new(fixed_body(body), BASE, false);
        match fetcher.fetch(ConfigType::Styles, None) {
            FetchResult::Updated {
                document,
                fingerprint: fp,
            } => {
                assert_eq!(document.as_value()["rtl-auto"]["direction"], "rtl");
                assert_eq!(fp, fingerprint(body.as_bytes()));
            }
            other => panic!("expected Updated, got {other:?}"),
        }
    }

    #[test]
    fn test_unchanged_when_fingerprint_matches() {
        let body = r#"{"a":1}"#;
        let fetcher = ContentFetcher::new(fixed_body(body), BASE, false);
        let previous = fingerprint(body.as_bytes());
        assert!(matches!(
            fetcher.fetch(ConfigType::Ui, Some(&previous)),
            FetchResult::Unchanged
        ));
    }

    #[test]
    fn test_unchanged_check_skips_parsing() {
        // Not JSON, but identical bytes: still Unchanged because parsing never runs.
        let body = "not json";
        let fetcher = ContentFetcher::new(fixed_body(body), BASE, false);
        let previous = fingerprint(body.as_bytes());
        assert!(matches!(
            fetcher.fetch(ConfigType::Ui, Some(&previous)),
            FetchResult::Unchanged
        ));
    }

    #[test]
    fn test_key_order_change_is_an_update() {
        let fetcher = ContentFetcher::new(fixed_body(r#"{"b":2,"a":1}"#), BASE, false);
        let previous = fingerprint(br#"{"a":1,"b":2}"#);
        assert!(matches!(
            fetcher.fetch(ConfigType::Ui, Some(&previous)),
            FetchResult::Updated { .. }
        ));
    }

    #[test]
    fn test_parse_error_is_failure() {
        let fetcher = ContentFetcher::new(fixed_body("{broken"), BASE, false);
        match fetcher.fetch(ConfigType::Domains, None) {
            FetchResult::Failed(FetchError::Parse(_)) => {}
            other => panic!("expected parse failure, got {other:?}"),
        }
    }

    #[test]
    fn test_transport_error_is_failure() {
        let fetcher = ContentFetcher::new(
            |_: &str| -> Result<Vec<u8>, FetchError> { Err(FetchError::Status(503)) },
            BASE,
            false,
        );
        assert!(matches!(
            fetcher.fetch(ConfigType::Defaults, None),
            FetchResult::Failed(FetchError::Status(503))
        ));
    }

    #[test]
    fn test_request_url_is_cache_busted() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let recorder = Arc::clone(&seen);
        let fetcher = ContentFetcher::new(
            move |url: &str| -> Result<Vec<u8>, FetchError> {
                recorder.lock().push(url.to_string());
                Ok(b"{}".to_vec())
            },
            BASE,
            false,
        );
        let _ = fetcher.fetch(ConfigType::Styles, None);

        let url = seen.lock().last().cloned().expect("transport should be called");
        assert!(url.starts_with("https://config.example.com/rtl/styles.json?_="), "{url}");
    }

    #[test]
    fn test_insecure_base_url_never_reaches_transport() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetcher = ContentFetcher::new(
            move |_: &str| -> Result<Vec<u8>, FetchError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(b"{}".to_vec())
            },
            "http://config.example.com",
            false,
        );

        match fetcher.fetch(ConfigType::Ui, None) {
            FetchResult::Failed(err) => assert!(!err.is_retryable()),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
