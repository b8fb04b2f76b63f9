//! Remote config fetcher for the rtlfix sync core.
//!
//! Provides:
//! - `http`: ureq agent construction, source URL policy, cache-busting
//! - `fetcher`: the content fetcher with SHA-256 unchanged-detection
//! - `error`: typed fetch failure reasons

pub mod error;
pub mod fetcher;
pub mod http;

pub use error::FetchError;
pub use fetcher::{ContentFetcher, FetchResult, HttpTransport, Transport, fingerprint};
