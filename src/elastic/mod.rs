//! Search engine access.
//!
//! Everything above this module talks to the engine through [`SearchEngine`]:
//! build a request body, get a typed response back. [`ElasticClient`] is the
//! HTTP implementation; [`InMemoryEngine`] is a fake used by tests.

mod client;
mod error;
mod init;
mod memory;
mod models;

pub use client::{ElasticClient, RequestBody};
pub use error::{EngineError, EngineResult};
pub use init::{alias_index_body, cache_index_body, ensure_index, ensure_indices, media_index_body};
pub use memory::InMemoryEngine;
pub use models::{
    status_error, BulkItemResult, BulkResponse, ErrorCause, PutOptions, RawHit, SearchResponse,
    StoredDocument, VersionGuard,
};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Operations the indexer and the search service need from the engine
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Run a `_search` request body against an index
    async fn search(&self, index: &str, body: &Value) -> EngineResult<SearchResponse>;

    /// Create-or-replace every `(id, source)` pair in one request
    async fn bulk_index(&self, index: &str, documents: &[(String, Value)]) -> EngineResult<BulkResponse>;

    /// Fetch several documents by id, restricted to `source_fields`.
    ///
    /// Ids that do not exist are absent from the returned map.
    async fn multi_get(
        &self,
        index: &str,
        ids: &[String],
        source_fields: &[&str],
    ) -> EngineResult<HashMap<String, Value>>;

    /// Fetch one document with its version tokens; `None` when it does not exist
    async fn get_document(&self, index: &str, id: &str) -> EngineResult<Option<StoredDocument>>;

    /// Create or replace one document
    async fn put_document(
        &self,
        index: &str,
        id: &str,
        source: &Value,
        options: PutOptions,
    ) -> EngineResult<()>;

    async fn index_exists(&self, index: &str) -> EngineResult<bool>;

    /// Create an index with the given settings and mappings
    async fn create_index(&self, index: &str, body: &Value) -> EngineResult<()>;

    /// Engine version number, e.g. `7.17.9`
    async fn version(&self) -> EngineResult<String>;
}
