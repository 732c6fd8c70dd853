//! Rate-limited HTTP client
//!
//! Every outgoing request, whether to the catalog REST API or to a product
//! feed, waits on one shared `governor` quota so a large sync cannot flood
//! the store.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client, Method, RequestBuilder, Response,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("catalog-sync/{}", env!("CARGO_PKG_VERSION")),
            timeout_seconds: 60,
            max_requests_per_second: 5,
        }
    }
}

/// reqwest client behind a direct (unkeyed) rate limiter
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second).context("Rate limit must be greater than 0")?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Sends after the rate limiter admits the request
    pub async fn send(&self, request: RequestBuilder) -> reqwest::Result<Response> {
        self.rate_limiter.until_ready().await;
        request.send().await
    }

    /// GET a URL and return the body, failing on non-2xx
    pub async fn get_text(&self, url: &str) -> Result<String> {
        tracing::info!("🌐 Fetching {}", url);
        let response = self
            .send(self.client.get(url))
            .await
            .with_context(|| format!("Failed to fetch URL: {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP request failed with status {}: {}", response.status(), url);
        }

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from: {url}"))?;
        tracing::debug!("Fetched {} ({} bytes)", url, text.len());
        Ok(text)
    }

    /// Same as [`HttpClient::get_text`], abandoned as soon as `cancel` fires
    pub async fn get_text_with_cancellation(&self, url: &str, cancel: &CancellationToken) -> Result<String> {
        tokio::select! {
            result = self.get_text(url) => result,
            () = cancel.cancelled() => {
                tracing::warn!("🛑 Request cancelled for URL: {}", url);
                anyhow::bail!("HTTP request cancelled")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = HttpClient::new(HttpClientConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_zero_rate_is_rejected() {
        let config = HttpClientConfig {
            max_requests_per_second: 0,
            ..Default::default()
        };
        assert!(HttpClient::new(config).is_err());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_returns_error() {
        let client = HttpClient::new(HttpClientConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = client
            .get_text_with_cancellation("http://127.0.0.1:9/never", &cancel)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_config_deserializes_partial() {
        let config: HttpClientConfig = serde_json::from_str(r#"{"max_requests_per_second":2}"#).unwrap();
        assert_eq!(config.max_requests_per_second, 2);
        assert_eq!(config.timeout_seconds, 60);
    }
}
