//! Optional news context for decision prompts, fetched from SerpAPI's
//! Google News engine.
//!
//! News is slow-moving relative to trading cycles, and SerpAPI quotas are
//! tight, so fetches are rate limited per asset: inside the configured
//! window the provider returns an empty context rather than an error.

use async_trait::async_trait;
use auto_trade_core::config::NewsConfig;
use auto_trade_core::error::ApiError;
use auto_trade_core::events::NewsItem;
use auto_trade_core::traits::NewsProvider;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SERPAPI_URL: &str = "https://serpapi.com/search.json";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news_results: Vec<WireNewsItem>,
}

#[derive(Debug, Deserialize)]
struct WireNewsItem {
    title: Option<String>,
    date: Option<String>,
    link: Option<String>,
}

pub struct SerpApiNewsClient {
    http: Client,
    api_key: String,
    min_interval: Duration,
    last_fetch: Mutex<HashMap<String, Instant>>,
}

impl SerpApiNewsClient {
    /// Creates a news client from config, reading `SERPAPI_API_KEY` from the
    /// environment. Returns `None` when news is disabled or no key is set,
    /// so the engine degrades to empty context instead of failing.
    #[must_use]
    pub fn from_env(config: &NewsConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let Ok(api_key) = std::env::var("SERPAPI_API_KEY") else {
            tracing::warn!("news enabled but SERPAPI_API_KEY not set, skipping news context");
            return None;
        };

        Some(Self {
            http: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            api_key,
            min_interval: Duration::from_secs(config.min_interval_secs),
            last_fetch: Mutex::new(HashMap::new()),
        })
    }

    #[cfg(test)]
    fn for_tests(min_interval: Duration) -> Self {
        Self {
            http: Client::new(),
            api_key: "test-key".to_string(),
            min_interval,
            last_fetch: Mutex::new(HashMap::new()),
        }
    }

    /// Records the fetch time for `asset_id` and reports whether the rate
    /// window currently suppresses a fetch.
    async fn should_skip(&self, asset_id: &str) -> bool {
        let mut last_fetch = self.last_fetch.lock().await;
        let now = Instant::now();

        if let Some(last) = last_fetch.get(asset_id) {
            if now.duration_since(*last) < self.min_interval {
                return true;
            }
        }
        last_fetch.insert(asset_id.to_string(), now);
        false
    }
}

#[async_trait]
impl NewsProvider for SerpApiNewsClient {
    async fn latest(&self, asset_id: &str, limit: usize) -> Result<Vec<NewsItem>, ApiError> {
        if self.should_skip(asset_id).await {
            tracing::debug!(%asset_id, "news fetch inside rate window, returning empty context");
            return Ok(Vec::new());
        }

        let response = self
            .http
            .get(SERPAPI_URL)
            .query(&[
                ("engine", "google_news"),
                ("q", &format!("{asset_id} cryptocurrency news")),
                ("gl", "us"),
                ("hl", "en"),
                ("api_key", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                } else {
                    ApiError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(ApiError::Unavailable(format!("HTTP {status}")));
        }

        let search: SearchResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        Ok(search
            .news_results
            .into_iter()
            .take(limit)
            .filter_map(|item| {
                item.title.map(|title| NewsItem {
                    title,
                    date: item.date,
                    link: item.link,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_fetch_inside_window_is_suppressed() {
        let client = SerpApiNewsClient::for_tests(Duration::from_secs(3600));

        assert!(!client.should_skip("BTC").await);
        assert!(client.should_skip("BTC").await);
        // A different asset has its own window.
        assert!(!client.should_skip("ETH").await);
    }

    #[tokio::test]
    async fn zero_window_never_suppresses() {
        let client = SerpApiNewsClient::for_tests(Duration::ZERO);

        assert!(!client.should_skip("BTC").await);
        assert!(!client.should_skip("BTC").await);
    }

    #[test]
    fn response_parsing_tolerates_missing_fields() {
        let json = r#"{"news_results": [
            {"title": "Bitcoin rallies", "date": "today", "link": "https://example.com"},
            {"date": "yesterday"}
        ]}"#;

        let search: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(search.news_results.len(), 2);
        assert!(search.news_results[1].title.is_none());
    }
}
