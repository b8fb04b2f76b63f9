//! HTTP client helper with native-tls support.

use std::time::Duration;
use ureq::Agent;
use ureq::tls::{RootCerts, TlsConfig, TlsProvider};
use url::Url;

use crate::error::FetchError;

/// User-Agent sent with every config request.
const USER_AGENT: &str = concat!("rtlfix/", env!("CARGO_PKG_VERSION"));

/// Query parameter used to defeat intermediate HTTP caches.
pub const CACHE_BUST_PARAM: &str = "_";

/// Validate that a URL is acceptable as a config source.
///
/// Enforces:
/// - The URL parses and has a host
/// - HTTPS only, unless `allow_http` is set (plain HTTP is then logged as a warning)
pub fn validate_source_url(url: &str, allow_http: bool) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("'{url}': {e}")))?;

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(FetchError::InvalidUrl(format!("'{url}' has no host")));
    }

    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if allow_http => {
            log::warn!(
                "rtlfix: fetching '{}' over insecure HTTP (allow_http is enabled). \
                 A MITM attacker could inject styling rules. Switch to HTTPS when possible.",
                url
            );
            Ok(parsed)
        }
        scheme => Err(FetchError::InsecureUrl(format!(
            "scheme '{scheme}' rejected for '{url}'; only HTTPS is allowed"
        ))),
    }
}

/// Append the cache-busting parameter, preserving any existing query.
pub fn cache_busted_url(url: &Url, nonce: i64) -> String {
    let mut busted = url.clone();
    busted
        .query_pairs_mut()
        .append_pair(CACHE_BUST_PARAM, &nonce.to_string());
    busted.into()
}

/// Create a new HTTP agent configured with native-tls and a global timeout.
///
/// The global timeout covers connect, request and body read, so an expired
/// request is abandoned rather than left hanging.
pub fn agent(timeout: Duration) -> Agent {
    let tls_config = TlsConfig::builder()
        .provider(TlsProvider::NativeTls)
        .root_certs(RootCerts::PlatformVerifier)
        .build();

    Agent::config_builder()
        .tls_config(tls_config)
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// GET `url` and return the raw body, limited to `max_bytes`.
pub fn get_bytes(agent: &Agent, url: &str, max_bytes: u64) -> Result<Vec<u8>, FetchError> {
    let mut response = agent
        .get(url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/json")
        .header("Cache-Control", "no-cache")
        .call()
        .map_err(map_ureq_error)?;

    response
        .body_mut()
        .with_config()
        .limit(max_bytes)
        .read_to_vec()
        .map_err(|e| match e {
            ureq::Error::Timeout(_) => FetchError::Timeout,
            other => FetchError::BodyRead(other.to_string()),
        })
}

fn map_ureq_error(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(code) => FetchError::Status(code),
        ureq::Error::Timeout(_) => FetchError::Timeout,
        other => FetchError::Network(other.to_string()),
    }
}
