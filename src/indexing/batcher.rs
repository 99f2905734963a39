//! Ingest batcher: collects prepared documents and writes them in bulk

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use super::aliases::AliasRegistry;
use super::failures::FailureLog;
use super::statistics::Statistics;
use crate::elastic::SearchEngine;
use crate::metrics::{BULK_ITEM_FAILURES_TOTAL, DOCUMENTS_INDEXED_TOTAL};
use crate::models::MediaDocument;
use crate::tagging::{TagQueue, TagWorkItem};

/// Pending documents tolerated before a flush
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Result of one bulk write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub indexed: usize,
    pub failed: usize,
}

struct TagHandoff {
    queue: TagQueue,
    aliases: Arc<AliasRegistry>,
}

pub struct IngestBatcher {
    engine: Arc<dyn SearchEngine>,
    index: String,
    batch_size: usize,
    pending: RwLock<Vec<MediaDocument>>,
    statistics: Arc<Statistics>,
    failures: Arc<FailureLog>,
    tagging: Option<TagHandoff>,
}

impl IngestBatcher {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        index: impl Into<String>,
        batch_size: usize,
        statistics: Arc<Statistics>,
        failures: Arc<FailureLog>,
    ) -> Self {
        Self {
            engine,
            index: index.into(),
            batch_size,
            pending: RwLock::new(Vec::new()),
            statistics,
            failures,
            tagging: None,
        }
    }

    /// Hand every successfully indexed document to the tag worker
    pub fn with_tagging(mut self, queue: TagQueue, aliases: Arc<AliasRegistry>) -> Self {
        self.tagging = Some(TagHandoff { queue, aliases });
        self
    }

    pub fn pending_len(&self) -> usize {
        self.pending.read().len()
    }

    /// Append documents; once more than `batch_size` are pending the whole
    /// queue is swapped out and written in one bulk request
    pub async fn add(&self, documents: Vec<MediaDocument>) -> Option<FlushOutcome> {
        if documents.is_empty() {
            return None;
        }

        let batch = {
            let mut pending = self.pending.write();
            pending.extend(documents);
            if pending.len() > self.batch_size {
                Some(std::mem::take(&mut *pending))
            } else {
                None
            }
        };

        match batch {
            Some(batch) => Some(self.flush(batch).await),
            None => None,
        }
    }

    /// Write whatever is still pending, regardless of size
    pub async fn finish(&self) -> FlushOutcome {
        let batch = std::mem::take(&mut *self.pending.write());
        if batch.is_empty() {
            return FlushOutcome::default();
        }
        self.flush(batch).await
    }

    async fn flush(&self, batch: Vec<MediaDocument>) -> FlushOutcome {
        let mut documents: Vec<(String, Value)> = Vec::with_capacity(batch.len());
        let mut outcome = FlushOutcome::default();
        for media in &batch {
            match serde_json::to_value(media) {
                Ok(source) => documents.push((media.path.clone(), source)),
                Err(e) => {
                    outcome.failed += 1;
                    self.failures
                        .append(format!("FAILED indexing: {}; type=serialization; cause={}", media.path, e));
                }
            }
        }
        if documents.is_empty() {
            return outcome;
        }

        debug!(index = %self.index, count = documents.len(), "Bulk indexing");
        let response = match self.engine.bulk_index(&self.index, &documents).await {
            Ok(response) => response,
            Err(e) => {
                outcome.failed += documents.len();
                self.failures
                    .append(format!("Failed indexing {} documents: {}", documents.len(), e));
                return outcome;
            }
        };

        let mut rejected = HashSet::new();
        for item in response.failures() {
            let (error_type, reason) = item
                .error
                .as_ref()
                .map(|cause| (cause.error_type.as_str(), cause.reason.as_str()))
                .unwrap_or(("unknown", ""));
            self.failures.append(format!(
                "FAILED indexing: {}; type={}; cause={}",
                item.id, error_type, reason
            ));
            rejected.insert(item.id.clone());
        }
        BULK_ITEM_FAILURES_TOTAL.inc_by(rejected.len() as u64);

        let accepted: Vec<&String> = documents
            .iter()
            .map(|(id, _)| id)
            .filter(|id| !rejected.contains(*id))
            .collect();
        outcome.indexed = accepted.len();
        outcome.failed += rejected.len();

        DOCUMENTS_INDEXED_TOTAL.inc_by(accepted.len() as u64);
        self.statistics.add_indexed(accepted.len() as u64);
        info!(indexed = outcome.indexed, failed = rejected.len(), "Bulk indexed batch");

        if let Some(tagging) = &self.tagging {
            self.enqueue_tagging(tagging, &accepted);
        }
        outcome
    }

    /// Indexed documents were rewritten without provider tags, so both providers run
    fn enqueue_tagging(&self, tagging: &TagHandoff, ids: &[&String]) {
        let items: Vec<TagWorkItem> = ids
            .iter()
            .filter_map(|id| match tagging.aliases.to_full_path(id) {
                Ok(full_path) => Some(TagWorkItem::new(id.as_str(), full_path, false, false)),
                Err(e) => {
                    self.failures
                        .append(format!("Failed enqueuing {} for tagging: {}", id, e));
                    None
                }
            })
            .collect();
        tagging.queue.enqueue(items);
    }
}
