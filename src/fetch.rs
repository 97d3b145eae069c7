//! HTTP collaborator.
//!
//! Every fetch failure is an absence signal: `None` plus a log line at the
//! fetch site. Callers decide whether absence skips a unit or ends the run.

use crate::cache::Cache;
use crate::format::{format, Dialect};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

pub const CODE_NAMESPACE: &str = "WebRequestCode";

pub trait Fetcher: Send + Sync {
    fn fetch_text(&self, url: &str) -> Option<String>;
    fn fetch_bytes(&self, url: &str) -> Option<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("webpack-decompiler/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Option<reqwest::blocking::Response> {
        match self.client.get(url).send() {
            Ok(response) if response.status() == reqwest::StatusCode::OK => Some(response),
            Ok(response) => {
                warn!("GET {} returned {}", url, response.status());
                None
            }
            Err(e) => {
                warn!("GET {} failed: {}", url, e);
                None
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Option<String> {
        let response = self.get(url)?;
        response
            .text()
            .map_err(|e| warn!("Failed to read body of {}: {}", url, e))
            .ok()
    }

    fn fetch_bytes(&self, url: &str) -> Option<Vec<u8>> {
        let response = self.get(url)?;
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|e| warn!("Failed to read body of {}: {}", url, e))
            .ok()
    }
}

/// In-memory fetcher serving fixed responses. Unknown URLs are absent.
#[derive(Default)]
pub struct StaticFetcher {
    responses: HashMap<String, Vec<u8>>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(url.into(), body.into());
        self
    }

    /// Number of requests served or refused so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

impl Fetcher for StaticFetcher {
    fn fetch_text(&self, url: &str) -> Option<String> {
        self.fetch_bytes(url)
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    fn fetch_bytes(&self, url: &str) -> Option<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let body = self.responses.get(url).cloned();
        if body.is_none() {
            debug!("No static response for {}", url);
        }
        body
    }
}

#[derive(Serialize)]
struct CodeRequestKey<'a> {
    url: &'a str,
    unformatted: bool,
}

/// Download text through the cache. Unless `unformatted`, the body is run
/// through the code formatter before it is stored.
pub fn fetch_code(cache: &Cache, fetcher: &dyn Fetcher, url: &str, unformatted: bool) -> Option<String> {
    let key = match Cache::hash(&CodeRequestKey { url, unformatted }) {
        Ok(key) => key,
        Err(e) => {
            warn!("Cannot derive cache key for {}: {}", url, e);
            return fetcher.fetch_text(url);
        }
    };
    let result = cache.get(CODE_NAMESPACE, &key, || {
        let body = fetcher.fetch_text(url)?;
        Some(if unformatted { body } else { format(&body, Dialect::Code) })
    });
    match result {
        Ok(body) => body,
        Err(e) => {
            warn!("Cache failure while fetching {}: {}", url, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL_SECS;
    use tempfile::TempDir;

    #[test]
    fn test_fetch_code_is_cached() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let fetcher = StaticFetcher::new().with("https://cdn.test/a.js", "var a=1");

        let first = fetch_code(&cache, &fetcher, "https://cdn.test/a.js", true);
        let second = fetch_code(&cache, &fetcher, "https://cdn.test/a.js", true);
        assert_eq!(first.as_deref(), Some("var a=1"));
        assert_eq!(first, second);
        assert_eq!(fetcher.request_count(), 1);
    }

    #[test]
    fn test_formatted_and_raw_are_cached_separately() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let fetcher = StaticFetcher::new().with("https://cdn.test/a.js", "var a=1");

        let raw = fetch_code(&cache, &fetcher, "https://cdn.test/a.js", true).unwrap();
        let formatted = fetch_code(&cache, &fetcher, "https://cdn.test/a.js", false).unwrap();
        assert_eq!(raw, "var a=1");
        assert!(formatted.contains("var a = 1;"));
        assert_eq!(fetcher.request_count(), 2);
    }

    #[test]
    fn test_missing_url_is_absent_and_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_TTL_SECS).unwrap();
        let fetcher = StaticFetcher::new();

        assert!(fetch_code(&cache, &fetcher, "https://cdn.test/missing.js", true).is_none());
        assert!(cache.is_empty());
    }
}
