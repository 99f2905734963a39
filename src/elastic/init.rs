//! Index bootstrap

use serde_json::{json, Value};
use tracing::info;

use super::error::EngineResult;
use super::SearchEngine;
use crate::config::IndexNames;

/// Settings and mappings of the media index
pub fn media_index_body() -> Value {
    json!({
        "settings": {
            "index": {
                "max_result_window": 100000,
                "number_of_shards": 1,
                "number_of_replicas": 0
            }
        },
        "mappings": {
            "properties": {
                "aperture": {"type": "float"},
                "dateTime": {"type": "date"},
                "dateYear": {"type": "integer"},
                "dateDay": {"type": "integer"},
                "dayOfYear": {"type": "integer"},
                "durationSeconds": {"type": "float"},
                "exposureTime": {"type": "float"},
                "fNumber": {"type": "float"},
                "focalLengthMm": {"type": "float"},
                "height": {"type": "integer"},
                "iso": {"type": "integer"},
                "lengthInBytes": {"type": "long"},
                "location": {"type": "geo_point"},
                "width": {"type": "integer"}
            }
        }
    })
}

/// Settings and mappings of the alias index
pub fn alias_index_body() -> Value {
    json!({
        "settings": {
            "index": {
                "number_of_shards": 1,
                "number_of_replicas": 0
            }
        },
        "mappings": {
            "properties": {
                "alias": {"type": "keyword"},
                "path": {"type": "keyword"},
                "dateAdded": {"type": "date"},
                "dateLastIndexed": {"type": "date"}
            }
        }
    })
}

/// Settings of a provider cache index; responses are stored unmapped
pub fn cache_index_body() -> Value {
    json!({
        "settings": {
            "index": {
                "number_of_shards": 1,
                "number_of_replicas": 0
            }
        },
        "mappings": {
            "dynamic": false,
            "properties": {
                "date_retrieved": {"type": "date"}
            }
        }
    })
}

/// Create `index` with `body` unless it already exists. Returns true when created.
pub async fn ensure_index(engine: &dyn SearchEngine, index: &str, body: &Value) -> EngineResult<bool> {
    if engine.index_exists(index).await? {
        return Ok(false);
    }
    engine.create_index(index, body).await?;
    info!(index = %index, "Created index");
    Ok(true)
}

/// Make sure the media and alias indices exist
pub async fn ensure_indices(engine: &dyn SearchEngine, names: &IndexNames) -> EngineResult<()> {
    let version = engine.version().await?;
    info!(version = %version, "Connected to search engine");

    ensure_index(engine, &names.media, &media_index_body()).await?;
    ensure_index(engine, &names.alias, &alias_index_body()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::InMemoryEngine;

    #[test]
    fn test_media_mapping_types() {
        let body = media_index_body();
        let props = &body["mappings"]["properties"];
        assert_eq!(props["location"]["type"], "geo_point");
        assert_eq!(props["dateTime"]["type"], "date");
        assert_eq!(props["iso"]["type"], "integer");
        assert_eq!(props["lengthInBytes"]["type"], "long");
        assert_eq!(body["settings"]["index"]["max_result_window"], 100000);
    }

    #[tokio::test]
    async fn test_ensure_indices_is_idempotent() {
        let engine = InMemoryEngine::new();
        let names = IndexNames::with_prefix("t-");

        ensure_indices(&engine, &names).await.unwrap();
        assert!(engine.index_exists("t-fp-media").await.unwrap());
        assert!(engine.index_exists("t-fp-alias").await.unwrap());

        assert!(!ensure_index(&engine, "t-fp-media", &media_index_body()).await.unwrap());
    }
}
