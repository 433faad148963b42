//! HTTP client for the catalog search service

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::models::{SearchError, SearchResponse};
use crate::config::SearchSettings;

/// The external search service
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Look up `keyword`. Logical "not found" answers are `Ok`.
    async fn search(&self, keyword: &str) -> Result<SearchResponse, SearchError>;
}

/// `GET <api_url>?keyword=<keyword>` over HTTP
pub struct HttpSearchClient {
    client: reqwest::Client,
    api_url: String,
}

impl HttpSearchClient {
    pub fn new(settings: &SearchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
        })
    }
}

#[async_trait]
impl SearchService for HttpSearchClient {
    async fn search(&self, keyword: &str) -> Result<SearchResponse, SearchError> {
        debug!("GET {}?keyword={}", self.api_url, keyword);

        let response = self
            .client
            .get(&self.api_url)
            .query(&[("keyword", keyword)])
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        match serde_json::from_slice::<SearchResponse>(&body) {
            Ok(parsed) => {
                if !status.is_success() {
                    debug!("HTTP {} with a search body, status {:?}", status, parsed.status);
                }
                Ok(parsed)
            }
            // Gateway error pages and the like
            Err(_) if !status.is_success() => Err(SearchError::HttpStatus(status.as_u16())),
            Err(e) => Err(SearchError::Malformed(e.to_string())),
        }
    }
}
