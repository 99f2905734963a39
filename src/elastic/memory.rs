use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::error::{EngineError, EngineResult};
use super::models::{
    BulkItemResult, BulkResponse, ErrorCause, PutOptions, RawHit, SearchResponse, StoredDocument,
    VersionGuard,
};
use super::SearchEngine;

const PRIMARY_TERM: i64 = 1;

#[derive(Debug, Clone)]
struct Entry {
    source: Value,
    seq_no: i64,
}

/// In-memory engine (for testing).
///
/// Understands `match_all`, `term`, `terms`, `range`, `query_string`,
/// `geo_distance` and `bool` queries plus field sorts and paging. Aggregations
/// are not computed.
#[derive(Clone)]
pub struct InMemoryEngine {
    indices: Arc<DashMap<String, Value>>,
    documents: Arc<DashMap<(String, String), Entry>>,
    seq_no: Arc<AtomicI64>,
    bulk_calls: Arc<AtomicUsize>,
    search_calls: Arc<AtomicUsize>,
    put_calls: Arc<AtomicUsize>,
    pending_conflicts: Arc<AtomicUsize>,
    rejected_ids: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            indices: Arc::new(DashMap::new()),
            documents: Arc::new(DashMap::new()),
            seq_no: Arc::new(AtomicI64::new(0)),
            bulk_calls: Arc::new(AtomicUsize::new(0)),
            search_calls: Arc::new(AtomicUsize::new(0)),
            put_calls: Arc::new(AtomicUsize::new(0)),
            pending_conflicts: Arc::new(AtomicUsize::new(0)),
            rejected_ids: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Number of bulk requests received
    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(AtomicOrdering::SeqCst)
    }

    /// Number of single document writes received
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(AtomicOrdering::SeqCst)
    }

    /// Stored source of a document
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.documents
            .get(&(index.to_string(), id.to_string()))
            .map(|entry| entry.source.clone())
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.documents.iter().filter(|entry| entry.key().0 == index).count()
    }

    /// Store a document directly, bypassing call counters
    pub fn insert(&self, index: &str, id: &str, source: Value) {
        self.indices.entry(index.to_string()).or_insert_with(|| json!({}));
        let seq_no = self.next_seq_no();
        self.documents
            .insert((index.to_string(), id.to_string()), Entry { source, seq_no });
    }

    /// Make the next `count` guarded writes fail with a version conflict
    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, AtomicOrdering::SeqCst);
    }

    /// Reject these ids inside bulk requests
    pub fn reject_ids<I: IntoIterator<Item = String>>(&self, ids: I) {
        self.rejected_ids.lock().extend(ids);
    }

    fn next_seq_no(&self) -> i64 {
        self.seq_no.fetch_add(1, AtomicOrdering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    async fn search(&self, index: &str, body: &Value) -> EngineResult<SearchResponse> {
        self.search_calls.fetch_add(1, AtomicOrdering::SeqCst);

        let query = body.get("query").cloned().unwrap_or_else(|| json!({"match_all": {}}));
        let mut matches: Vec<(String, Value)> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == index)
            .filter(|entry| matches_query(&query, &entry.source))
            .map(|entry| (entry.key().1.clone(), entry.source.clone()))
            .collect();

        matches.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(sort) = body.get("sort").and_then(Value::as_array) {
            matches.sort_by(|a, b| compare_by_sort(sort, &a.1, &b.1));
        }

        let total = matches.len() as u64;
        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;

        let hits = matches
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(id, source)| RawHit {
                id,
                score: Some(1.0),
                source,
                sort: None,
            })
            .collect();

        Ok(SearchResponse {
            total,
            hits,
            aggregations: None,
        })
    }

    async fn bulk_index(&self, index: &str, documents: &[(String, Value)]) -> EngineResult<BulkResponse> {
        self.bulk_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let rejected = self.rejected_ids.lock().clone();

        let mut response = BulkResponse::default();
        for (id, source) in documents {
            if rejected.contains(id) {
                response.errors = true;
                response.items.push(BulkItemResult {
                    id: id.clone(),
                    status: 400,
                    error: Some(ErrorCause {
                        error_type: "mapper_parsing_exception".to_string(),
                        reason: format!("rejected document [{}]", id),
                    }),
                });
                continue;
            }

            let existed = self
                .documents
                .contains_key(&(index.to_string(), id.clone()));
            self.insert(index, id, source.clone());
            response.items.push(BulkItemResult {
                id: id.clone(),
                status: if existed { 200 } else { 201 },
                error: None,
            });
        }
        Ok(response)
    }

    async fn multi_get(
        &self,
        index: &str,
        ids: &[String],
        source_fields: &[&str],
    ) -> EngineResult<HashMap<String, Value>> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                let source = self.document(index, id)?;
                let projected = if source_fields.is_empty() {
                    source
                } else {
                    let fields = source_fields
                        .iter()
                        .filter_map(|field| {
                            source.get(*field).map(|value| (field.to_string(), value.clone()))
                        })
                        .collect::<serde_json::Map<_, _>>();
                    Value::Object(fields)
                };
                Some((id.clone(), projected))
            })
            .collect())
    }

    async fn get_document(&self, index: &str, id: &str) -> EngineResult<Option<StoredDocument>> {
        Ok(self
            .documents
            .get(&(index.to_string(), id.to_string()))
            .map(|entry| StoredDocument {
                id: id.to_string(),
                source: entry.source.clone(),
                version: Some(VersionGuard {
                    seq_no: entry.seq_no,
                    primary_term: PRIMARY_TERM,
                }),
            }))
    }

    async fn put_document(
        &self,
        index: &str,
        id: &str,
        source: &Value,
        options: PutOptions,
    ) -> EngineResult<()> {
        self.put_calls.fetch_add(1, AtomicOrdering::SeqCst);

        if let Some(guard) = options.guard {
            if self.take_conflict() {
                return Err(EngineError::Conflict(id.to_string()));
            }
            let current = self
                .documents
                .get(&(index.to_string(), id.to_string()))
                .map(|entry| entry.seq_no);
            if current != Some(guard.seq_no) || guard.primary_term != PRIMARY_TERM {
                return Err(EngineError::Conflict(id.to_string()));
            }
        }

        self.insert(index, id, source.clone());
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> EngineResult<bool> {
        Ok(self.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> EngineResult<()> {
        if self.indices.contains_key(index) {
            return Err(EngineError::Status {
                status: 400,
                error_type: "resource_already_exists_exception".to_string(),
                reason: format!("index [{}] already exists", index),
            });
        }
        self.indices.insert(index.to_string(), body.clone());
        Ok(())
    }

    async fn version(&self) -> EngineResult<String> {
        Ok("7.17.0-memory".to_string())
    }
}

fn field_value<'a>(source: &'a Value, field: &str) -> Option<&'a Value> {
    source.get(field.trim_end_matches(".keyword"))
}

fn values_equal(stored: &Value, wanted: &Value) -> bool {
    match (stored, wanted) {
        (Value::Array(items), _) => items.iter().any(|item| values_equal(item, wanted)),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(a), Value::String(b)) => b.parse::<f64>().ok() == a.as_f64(),
        (Value::String(a), Value::Number(b)) => a.parse::<f64>().ok() == b.as_f64(),
        _ => stored == wanted,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(a.as_str()?.cmp(b.as_str()?)),
    }
}

/// The single `{field: spec}` pair of a leaf query
fn single_field(clause: &Value) -> Option<(&String, &Value)> {
    clause.as_object()?.iter().next()
}

fn matches_query(query: &Value, source: &Value) -> bool {
    let Some((kind, clause)) = query.as_object().and_then(|map| map.iter().next()) else {
        return false;
    };

    match kind.as_str() {
        "match_all" => true,
        "term" => single_field(clause)
            .map(|(field, spec)| {
                let wanted = spec.get("value").unwrap_or(spec);
                field_value(source, field)
                    .map(|stored| values_equal(stored, wanted))
                    .unwrap_or(false)
            })
            .unwrap_or(false),
        "terms" => single_field(clause)
            .map(|(field, wanted)| {
                let stored = field_value(source, field);
                wanted.as_array().into_iter().flatten().any(|value| {
                    stored.map(|stored| values_equal(stored, value)).unwrap_or(false)
                })
            })
            .unwrap_or(false),
        "range" => single_field(clause)
            .map(|(field, bounds)| {
                let Some(stored) = field_value(source, field) else {
                    return false;
                };
                let check = |op: &str, accept: &[Ordering]| {
                    bounds
                        .get(op)
                        .map(|bound| {
                            compare_values(stored, bound)
                                .map(|ord| accept.contains(&ord))
                                .unwrap_or(false)
                        })
                        .unwrap_or(true)
                };
                check("gt", &[Ordering::Greater])
                    && check("gte", &[Ordering::Greater, Ordering::Equal])
                    && check("lt", &[Ordering::Less])
                    && check("lte", &[Ordering::Less, Ordering::Equal])
            })
            .unwrap_or(false),
        "query_string" => {
            let text = clause
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase();
            let haystack = source.to_string().to_lowercase();
            text.split_whitespace().all(|token| haystack.contains(token))
        }
        "geo_distance" => {
            let distance_km = clause
                .get("distance")
                .and_then(Value::as_str)
                .and_then(|d| d.trim_end_matches("km").trim().parse::<f64>().ok());
            let center = clause.get("location");
            let stored = source.get("location");
            match (distance_km, center, stored) {
                (Some(limit), Some(center), Some(stored)) => {
                    haversine_km(center, stored).map(|d| d <= limit).unwrap_or(false)
                }
                _ => false,
            }
        }
        "bool" => {
            let list = |key: &str| -> Vec<Value> {
                clause
                    .get(key)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            };
            let must = list("must");
            let filter = list("filter");
            let should = list("should");

            let required = must
                .iter()
                .chain(filter.iter())
                .all(|q| matches_query(q, source));
            let optional = if should.is_empty() || !(must.is_empty() && filter.is_empty()) {
                true
            } else {
                should.iter().any(|q| matches_query(q, source))
            };
            required && optional
        }
        _ => false,
    }
}

fn haversine_km(a: &Value, b: &Value) -> Option<f64> {
    let (lat1, lon1) = (a.get("lat")?.as_f64()?, a.get("lon")?.as_f64()?);
    let (lat2, lon2) = (b.get("lat")?.as_f64()?, b.get("lon")?.as_f64()?);
    let (dlat, dlon) = ((lat2 - lat1).to_radians(), (lon2 - lon1).to_radians());
    let h = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    Some(2.0 * 6371.0 * h.sqrt().asin())
}

fn compare_by_sort(sort: &[Value], a: &Value, b: &Value) -> Ordering {
    for key in sort {
        let Some((field, spec)) = key.as_object().and_then(|map| map.iter().next()) else {
            continue;
        };
        if field.starts_with('_') {
            continue;
        }
        let descending = spec
            .get("order")
            .or(Some(spec))
            .and_then(Value::as_str)
            .map(|order| order == "desc")
            .unwrap_or(false);

        let ordering = match (field_value(a, field), field_value(b, field)) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> InMemoryEngine {
        let engine = InMemoryEngine::new();
        engine.insert("m", "1\\a.jpg", json!({"path": "1\\a.jpg", "tags": ["beach", "sunset"], "dayOfYear": 10}));
        engine.insert("m", "1\\b.jpg", json!({"path": "1\\b.jpg", "tags": ["snow"], "dayOfYear": 200}));
        engine.insert("m", "1\\c.jpg", json!({"path": "1\\c.jpg", "dayOfYear": 300}));
        engine
    }

    #[tokio::test]
    async fn test_term_matches_array_members() {
        let engine = seeded().await;
        let response = engine
            .search("m", &json!({"query": {"term": {"tags.keyword": {"value": "beach"}}}}))
            .await
            .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.hits[0].id, "1\\a.jpg");
    }

    #[tokio::test]
    async fn test_range_and_sort() {
        let engine = seeded().await;
        let response = engine
            .search(
                "m",
                &json!({
                    "query": {"range": {"dayOfYear": {"gt": 10}}},
                    "sort": [{"dayOfYear": {"order": "desc"}}],
                    "size": 1
                }),
            )
            .await
            .unwrap();
        assert_eq!(response.total, 2);
        assert_eq!(response.hits[0].id, "1\\c.jpg");
    }

    #[tokio::test]
    async fn test_bool_should_requires_one_when_alone() {
        let engine = seeded().await;
        let query = json!({"query": {"bool": {"must": [
            {"match_all": {}},
            {"bool": {"should": [
                {"term": {"tags.keyword": {"value": "snow"}}},
                {"term": {"tags.keyword": {"value": "beach"}}}
            ]}}
        ]}}});
        assert_eq!(engine.search("m", &query).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_guarded_put_detects_stale_version() {
        let engine = seeded().await;
        let stored = engine.get_document("m", "1\\a.jpg").await.unwrap().unwrap();
        engine.insert("m", "1\\a.jpg", json!({"path": "1\\a.jpg"}));

        let result = engine
            .put_document("m", "1\\a.jpg", &json!({}), PutOptions::guarded(stored.version))
            .await;
        assert!(matches!(result, Err(EngineError::Conflict(_))));
    }
}
