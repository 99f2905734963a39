//! Azure Computer Vision analyze endpoint

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::error::{TagError, TagResult};
use super::models::ProviderKind;
use super::provider::{confident_names, TagProvider};
use crate::config::ProviderConfig;

const ANALYZE_PATH: &str = "vision/v3.0/analyze";
const ANALYZE_PARAMS: &str = "visualFeatures=Categories,Tags,Description&details=Landmarks";

pub struct AzureTagProvider {
    client: Client,
    base_url: String,
    api_key: String,
    min_interval: Duration,
    min_confidence: f64,
}

impl AzureTagProvider {
    pub fn new(config: &ProviderConfig, api_key: impl Into<String>, min_confidence: f64) -> TagResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TagError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            min_interval: Duration::from_secs_f64(config.min_seconds_between_calls),
            min_confidence,
        })
    }

    fn url(&self) -> String {
        format!("{}/{}?{}", self.base_url, ANALYZE_PATH, ANALYZE_PARAMS)
    }
}

#[async_trait]
impl TagProvider for AzureTagProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }

    async fn classify(&self, image: &[u8]) -> TagResult<Value> {
        debug!(bytes = image.len(), "Calling Azure analyze");
        let response = self
            .client
            .post(self.url())
            .header("Content-Type", "application/octet-stream")
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .body(image.to_vec())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TagError::from_status(status.as_u16(), body));
        }
        serde_json::from_str(&body).map_err(|e| TagError::Http {
            status: status.as_u16(),
            body: format!("Invalid JSON: {}", e),
        })
    }

    fn extract_tags(&self, response: &Value) -> Vec<String> {
        confident_names(response.get("tags"), "confidence", self.min_confidence)
    }
}
