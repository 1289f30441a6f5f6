// Native HTTP client implementation using reqwest.

use crate::error::CoreError;
use crate::http::{HttpClient, HttpResult};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::time::Duration;

pub struct NativeHttpClient {
    client: Client,
}

impl NativeHttpClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for NativeHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for NativeHttpClient {
    async fn fetch_text(&self, url: &str) -> HttpResult<String> {
        debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::Http(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(CoreError::RateLimited(format!("HTTP 429 from {}", url)));
        }
        if !status.is_success() {
            return Err(CoreError::Http(format!("HTTP {} from {}", status.as_u16(), url)));
        }

        response
            .text()
            .await
            .map_err(|e| CoreError::Http(format!("Failed to read response body: {}", e)))
    }
}
