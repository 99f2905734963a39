//! Wire types exchanged with the search engine

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::EngineError;

/// Raw search response reduced to what callers consume
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Exact number of matches
    pub total: u64,
    pub hits: Vec<RawHit>,
    pub aggregations: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub id: String,
    pub score: Option<f64>,
    pub source: Value,
    /// Sort values, present when the request sorted on something other than score
    pub sort: Option<Vec<Value>>,
}

impl SearchResponse {
    /// Parse a `_search` response body
    pub fn from_json(body: &Value) -> Result<Self, EngineError> {
        let hits = body
            .get("hits")
            .ok_or_else(|| EngineError::Decode("search response without hits".to_string()))?;

        // Older engines return a bare number, newer ones {value, relation}
        let total = match hits.get("total") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(total) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
            None => 0,
        };

        let raw_hits = hits
            .get("hits")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(RawHit::from_json).collect())
            .unwrap_or_default();

        Ok(Self {
            total,
            hits: raw_hits,
            aggregations: body.get("aggregations").cloned(),
        })
    }
}

impl RawHit {
    fn from_json(hit: &Value) -> Self {
        Self {
            id: hit
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            score: hit.get("_score").and_then(Value::as_f64),
            source: hit.get("_source").cloned().unwrap_or(Value::Null),
            sort: hit.get("sort").and_then(Value::as_array).cloned(),
        }
    }
}

/// Outcome of a bulk upsert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    /// True when at least one item failed
    pub errors: bool,
    pub items: Vec<BulkItemResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    pub id: String,
    pub status: u16,
    pub error: Option<ErrorCause>,
}

impl BulkItemResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

impl BulkResponse {
    /// Parse a `_bulk` response body
    pub fn from_json(body: &Value) -> Result<Self, EngineError> {
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::Decode("bulk response without items".to_string()))?;

        let items = items
            .iter()
            .filter_map(|item| {
                // Each item is keyed by its action: {"index": {...}}
                let result = item.as_object()?.values().next()?;
                Some(BulkItemResult {
                    id: result
                        .get("_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    status: result.get("status").and_then(Value::as_u64).unwrap_or(0) as u16,
                    error: result.get("error").map(ErrorCause::from_json),
                })
            })
            .collect();

        Ok(Self {
            errors: body.get("errors").and_then(Value::as_bool).unwrap_or(false),
            items,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|item| !item.succeeded())
    }
}

/// `type`/`reason` pair from an engine error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCause {
    #[serde(rename = "type")]
    pub error_type: String,
    pub reason: String,
}

impl ErrorCause {
    pub fn from_json(error: &Value) -> Self {
        // The first root cause is more specific than the wrapper
        let cause = error
            .get("root_cause")
            .and_then(Value::as_array)
            .and_then(|causes| causes.first())
            .unwrap_or(error);

        Self {
            error_type: cause
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            reason: cause
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Build a typed error from a non-2xx response body
pub fn status_error(status: u16, body: &str) -> EngineError {
    let cause = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("error").cloned())
        .map(|error| match error {
            Value::String(reason) => ErrorCause {
                error_type: "error".to_string(),
                reason,
            },
            other => ErrorCause::from_json(&other),
        })
        .unwrap_or_else(|| ErrorCause {
            error_type: "http".to_string(),
            reason: body.chars().take(512).collect(),
        });

    EngineError::Status {
        status,
        error_type: cause.error_type,
        reason: cause.reason,
    }
}

/// A document read back with its concurrency tokens
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub source: Value,
    pub version: Option<VersionGuard>,
}

/// Optimistic concurrency tokens of a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionGuard {
    pub seq_no: i64,
    pub primary_term: i64,
}

/// Options for a single document write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Make the write visible to search before returning
    pub refresh: bool,
    /// Reject the write when the stored version moved on
    pub guard: Option<VersionGuard>,
}

impl PutOptions {
    pub fn refreshed() -> Self {
        Self {
            refresh: true,
            guard: None,
        }
    }

    pub fn guarded(guard: Option<VersionGuard>) -> Self {
        Self {
            refresh: false,
            guard,
        }
    }
}
