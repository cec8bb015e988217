//! Fetching snippets, scripts, and archives by URL or path.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, ShallowFlowError};

/// Source of external resources.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>>;

    async fn fetch_text(&self, location: &str) -> Result<String> {
        let bytes = self.fetch_bytes(location).await?;
        String::from_utf8(bytes).map_err(|e| ShallowFlowError::fetch(location, e))
    }
}

/// Fetches `http(s)://` URLs with reqwest and everything else from disk.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            debug!(url = location, "Fetching over HTTP");
            let resp = self
                .client
                .get(location)
                .send()
                .await
                .map_err(|e| ShallowFlowError::fetch(location, e))?;
            if !resp.status().is_success() {
                return Err(ShallowFlowError::fetch(
                    location,
                    format!("HTTP {}", resp.status()),
                ));
            }
            let body = resp
                .bytes()
                .await
                .map_err(|e| ShallowFlowError::fetch(location, e))?;
            Ok(body.to_vec())
        } else {
            let path = location.strip_prefix("file://").unwrap_or(location);
            debug!(path, "Reading from disk");
            tokio::fs::read(path)
                .await
                .map_err(|e| ShallowFlowError::fetch(location, e))
        }
    }
}
