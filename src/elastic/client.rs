use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::error::{EngineError, EngineResult};
use super::models::{status_error, BulkResponse, PutOptions, SearchResponse, StoredDocument, VersionGuard};
use super::SearchEngine;

/// HTTP client for an Elasticsearch-compatible engine
#[derive(Clone)]
pub struct ElasticClient {
    pub(crate) client: Client,
    base_url: String,
}

impl ElasticClient {
    /// Create a client with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EngineError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one request and return the status with the raw body
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> EngineResult<(StatusCode, String)> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(method = %method, url = %url, "Search engine request");

        let mut request = self.client.request(method, &url);
        request = match body {
            Some(RequestBody::Json(value)) => request.json(&value),
            Some(RequestBody::NdJson(text)) => request
                .header("Content-Type", "application/x-ndjson")
                .body(text),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// Execute and decode a JSON body, turning non-2xx into [`EngineError::Status`]
    async fn execute_json(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> EngineResult<Value> {
        let (status, text) = self.execute(method, path, body).await?;
        if !status.is_success() {
            let err = status_error(status.as_u16(), &text);
            warn!(path = %path, error = %err, "Search engine request failed");
            return Err(err);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Body of a request
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    NdJson(String),
}

fn doc_path(index: &str, id: &str) -> String {
    format!("{}/_doc/{}", index, urlencoding::encode(id))
}

#[async_trait]
impl SearchEngine for ElasticClient {
    async fn search(&self, index: &str, body: &Value) -> EngineResult<SearchResponse> {
        let json = self
            .execute_json(
                Method::POST,
                &format!("{}/_search", index),
                Some(RequestBody::Json(body.clone())),
            )
            .await?;
        SearchResponse::from_json(&json)
    }

    async fn bulk_index(&self, index: &str, documents: &[(String, Value)]) -> EngineResult<BulkResponse> {
        if documents.is_empty() {
            return Ok(BulkResponse::default());
        }

        let mut body = String::new();
        for (id, source) in documents {
            body.push_str(&json!({"index": {"_index": index, "_id": id}}).to_string());
            body.push('\n');
            body.push_str(&serde_json::to_string(source)?);
            body.push('\n');
        }

        let json = self
            .execute_json(Method::POST, "_bulk", Some(RequestBody::NdJson(body)))
            .await?;
        BulkResponse::from_json(&json)
    }

    async fn multi_get(
        &self,
        index: &str,
        ids: &[String],
        source_fields: &[&str],
    ) -> EngineResult<HashMap<String, Value>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut path = format!("{}/_mget", index);
        if !source_fields.is_empty() {
            path.push_str("?_source_includes=");
            path.push_str(&source_fields.join(","));
        }

        let json = self
            .execute_json(Method::POST, &path, Some(RequestBody::Json(json!({"ids": ids}))))
            .await?;

        let docs = json
            .get("docs")
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::Decode("mget response without docs".to_string()))?;

        Ok(docs
            .iter()
            .filter(|doc| doc.get("found").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|doc| {
                let id = doc.get("_id")?.as_str()?.to_string();
                let source = doc.get("_source").cloned().unwrap_or_else(|| json!({}));
                Some((id, source))
            })
            .collect())
    }

    async fn get_document(&self, index: &str, id: &str) -> EngineResult<Option<StoredDocument>> {
        let (status, text) = self.execute(Method::GET, &doc_path(index, id), None).await?;

        if status == StatusCode::NOT_FOUND {
            // A missing document answers {"found": false}; a missing index is an error
            let found_false = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|json| json.get("found").and_then(Value::as_bool))
                == Some(false);
            if found_false {
                return Ok(None);
            }
            return Err(status_error(status.as_u16(), &text));
        }
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }

        let json: Value = serde_json::from_str(&text)?;
        if !json.get("found").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(None);
        }

        let version = match (
            json.get("_seq_no").and_then(Value::as_i64),
            json.get("_primary_term").and_then(Value::as_i64),
        ) {
            (Some(seq_no), Some(primary_term)) => Some(VersionGuard {
                seq_no,
                primary_term,
            }),
            _ => None,
        };

        Ok(Some(StoredDocument {
            id: id.to_string(),
            source: json.get("_source").cloned().unwrap_or(Value::Null),
            version,
        }))
    }

    async fn put_document(
        &self,
        index: &str,
        id: &str,
        source: &Value,
        options: PutOptions,
    ) -> EngineResult<()> {
        let mut params = Vec::new();
        if options.refresh {
            params.push("refresh=true".to_string());
        }
        if let Some(guard) = options.guard {
            params.push(format!("if_seq_no={}", guard.seq_no));
            params.push(format!("if_primary_term={}", guard.primary_term));
        }

        let mut path = doc_path(index, id);
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params.join("&"));
        }

        let (status, text) = self
            .execute(Method::PUT, &path, Some(RequestBody::Json(source.clone())))
            .await?;

        if status == StatusCode::CONFLICT {
            return Err(EngineError::Conflict(id.to_string()));
        }
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> EngineResult<bool> {
        let (status, text) = self.execute(Method::HEAD, index, None).await?;
        match status {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(status_error(other.as_u16(), &text)),
        }
    }

    async fn create_index(&self, index: &str, body: &Value) -> EngineResult<()> {
        self.execute_json(Method::PUT, index, Some(RequestBody::Json(body.clone())))
            .await?;
        Ok(())
    }

    async fn version(&self) -> EngineResult<String> {
        let json = self.execute_json(Method::GET, "", None).await?;
        json.pointer("/version/number")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EngineError::Decode("missing version.number".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_path_encodes_backslashes() {
        assert_eq!(doc_path("fp-media", "1\\a b.jpg"), "fp-media/_doc/1%5Ca%20b.jpg");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ElasticClient::new("http://localhost:9200/", 5).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9200");
    }
}
