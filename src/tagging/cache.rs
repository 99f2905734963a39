//! Raw provider responses cached in a search engine index, keyed by document id

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::error::{TagError, TagResult};
use crate::elastic::{cache_index_body, ensure_index, PutOptions, SearchEngine};

/// Field stamped onto every stored response
pub const DATE_RETRIEVED_FIELD: &str = "date_retrieved";

#[derive(Clone)]
pub struct TagCache {
    engine: Arc<dyn SearchEngine>,
    index: String,
}

impl TagCache {
    pub fn new(engine: Arc<dyn SearchEngine>, index: impl Into<String>) -> Self {
        Self {
            engine,
            index: index.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Create the cache index when missing
    pub async fn ensure(&self) -> TagResult<bool> {
        Ok(ensure_index(self.engine.as_ref(), &self.index, &cache_index_body()).await?)
    }

    /// Cached response for `id`, if any
    pub async fn lookup(&self, id: &str) -> TagResult<Option<Value>> {
        let stored = self
            .engine
            .get_document(&self.index, id)
            .await
            .map_err(|e| TagError::Cache(format!("lookup {}: {}", id, e)))?;
        Ok(stored.map(|document| document.source))
    }

    /// Store a response, stamped with the retrieval time
    pub async fn store(&self, id: &str, response: &Value) -> TagResult<()> {
        let mut document = response.clone();
        if let Value::Object(fields) = &mut document {
            fields.insert(
                DATE_RETRIEVED_FIELD.to_string(),
                Value::String(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            );
        }
        self.engine
            .put_document(&self.index, id, &document, PutOptions::default())
            .await
            .map_err(|e| TagError::Cache(format!("store {}: {}", id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::InMemoryEngine;
    use serde_json::json;

    #[tokio::test]
    async fn test_store_stamps_and_lookup_returns() {
        let engine = InMemoryEngine::new();
        let cache = TagCache::new(Arc::new(engine.clone()), "azure-tag-cache");
        assert!(cache.ensure().await.unwrap());
        assert!(!cache.ensure().await.unwrap());

        assert!(cache.lookup("1\\a.jpg").await.unwrap().is_none());
        cache
            .store("1\\a.jpg", &json!({"tags": [{"name": "sky", "confidence": 0.9}]}))
            .await
            .unwrap();

        let cached = cache.lookup("1\\a.jpg").await.unwrap().unwrap();
        assert_eq!(cached["tags"][0]["name"], "sky");
        assert!(cached[DATE_RETRIEVED_FIELD].as_str().unwrap().ends_with('Z'));
    }
}
