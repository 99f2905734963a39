//! Clarifai general model predictions

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::error::{TagError, TagResult};
use super::models::ProviderKind;
use super::provider::{confident_names, TagProvider};
use crate::config::ProviderConfig;

/// Clarifai's general image recognition model
pub const GENERAL_MODEL_ID: &str = "aaa03c23b3724a16a56b629203edc62c";

pub struct ClarifaiTagProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model_id: String,
    min_interval: Duration,
    min_confidence: f64,
}

impl ClarifaiTagProvider {
    pub fn new(config: &ProviderConfig, api_key: impl Into<String>, min_confidence: f64) -> TagResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TagError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model_id: GENERAL_MODEL_ID.to_string(),
            min_interval: Duration::from_secs_f64(config.min_seconds_between_calls),
            min_confidence,
        })
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Predict request carrying the image inline
    pub fn request_body(image: &[u8]) -> Value {
        json!({
            "inputs": [
                {"data": {"image": {"base64": Base64::encode_string(image)}}}
            ]
        })
    }
}

#[async_trait]
impl TagProvider for ClarifaiTagProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Clarifai
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }

    async fn classify(&self, image: &[u8]) -> TagResult<Value> {
        debug!(bytes = image.len(), model = %self.model_id, "Calling Clarifai predict");
        let url = format!("{}/v2/models/{}/outputs", self.base_url, self.model_id);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&Self::request_body(image))
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
        let concepts = response
            .get("outputs")
            .and_then(|outputs| outputs.get(0))
            .and_then(|output| output.get("data"))
            .and_then(|data| data.get("concepts"));
        confident_names(concepts, "value", self.min_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_is_base64() {
        let body = ClarifaiTagProvider::request_body(b"hello");
        assert_eq!(body["inputs"][0]["data"]["image"]["base64"], "aGVsbG8=");
    }
}
