//! Tag enrichment: one background consumer tagging queued documents

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cache::TagCache;
use super::error::{TagError, TagResult};
use super::image::ImageReducer;
use super::models::{ProviderKind, TagWorkItem};
use super::provider::{QuotaBreaker, TagProvider, Throttle};
use crate::elastic::{EngineError, PutOptions, SearchEngine};
use crate::indexing::{FailureLog, Statistics};
use crate::metrics::TAG_REQUESTS_TOTAL;

/// Read-merge-write attempts before a version conflict is reported
pub const MAX_MERGE_ATTEMPTS: usize = 3;

/// Document field mirroring the Azure tags
const GENERIC_TAGS_FIELD: &str = "tags";

/// A provider with its cache, throttle and breaker
pub struct ProviderSlot {
    provider: Arc<dyn TagProvider>,
    cache: TagCache,
    throttle: Throttle,
    breaker: QuotaBreaker,
}

impl ProviderSlot {
    pub fn new(provider: Arc<dyn TagProvider>, cache: TagCache) -> Self {
        let kind = provider.kind();
        Self {
            throttle: Throttle::new(provider.min_interval()),
            breaker: QuotaBreaker::new(kind),
            provider,
            cache,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn breaker(&self) -> &QuotaBreaker {
        &self.breaker
    }
}

fn record(kind: ProviderKind, outcome: &str) {
    let provider = kind.to_string();
    TAG_REQUESTS_TOTAL
        .with_label_values(&[provider.as_str(), outcome])
        .inc();
}

/// Tags one work item against every configured provider
pub struct TagEnricher {
    engine: Arc<dyn SearchEngine>,
    media_index: String,
    providers: Vec<ProviderSlot>,
    reducer: Arc<dyn ImageReducer>,
    statistics: Arc<Statistics>,
}

impl TagEnricher {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        media_index: impl Into<String>,
        reducer: Arc<dyn ImageReducer>,
        statistics: Arc<Statistics>,
    ) -> Self {
        Self {
            engine,
            media_index: media_index.into(),
            providers: Vec::new(),
            reducer,
            statistics,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn TagProvider>, cache: TagCache) -> Self {
        self.providers.push(ProviderSlot::new(provider, cache));
        self
    }

    pub fn providers(&self) -> &[ProviderSlot] {
        &self.providers
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderSlot> {
        self.providers.iter().find(|slot| slot.kind() == kind)
    }

    /// Create every provider cache index that is missing
    pub async fn ensure_caches(&self) -> TagResult<()> {
        for slot in &self.providers {
            slot.cache.ensure().await?;
        }
        Ok(())
    }

    /// Run all providers for one item and merge what they found.
    ///
    /// Providers fail independently; only a failed merge is an error. Returns
    /// the providers whose tags were written.
    pub async fn process(&self, item: &TagWorkItem) -> TagResult<Vec<ProviderKind>> {
        let mut found: Vec<(ProviderKind, Vec<String>)> = Vec::new();
        let mut image: Option<Vec<u8>> = None;

        for slot in &self.providers {
            let kind = slot.kind();
            if item.has_tags(kind) {
                record(kind, "skipped");
                continue;
            }

            match self.provider_tags(slot, item, &mut image).await {
                Ok(Some(tags)) => found.push((kind, tags)),
                Ok(None) => {}
                Err(e) if e.is_quota() => {
                    record(kind, "quota");
                    warn!(provider = %kind, path = %item.id, "Exceeded requests");
                }
                Err(e) => {
                    record(kind, "error");
                    warn!(provider = %kind, path = %item.id, error = %e, "Tag provider failed");
                }
            }
        }

        if found.is_empty() {
            return Ok(Vec::new());
        }
        self.merge(item, &found).await?;
        Ok(found.into_iter().map(|(kind, _)| kind).collect())
    }

    /// Cached tags, or `None` when the breaker is open, or a fresh provider call
    async fn provider_tags(
        &self,
        slot: &ProviderSlot,
        item: &TagWorkItem,
        image: &mut Option<Vec<u8>>,
    ) -> TagResult<Option<Vec<String>>> {
        let kind = slot.kind();
        match slot.cache.lookup(&item.id).await {
            Ok(Some(cached)) => {
                record(kind, "cached");
                self.statistics.add_cached_tags(1);
                return Ok(Some(slot.provider.extract_tags(&cached)));
            }
            Ok(None) => {}
            Err(e) => warn!(provider = %kind, path = %item.id, error = %e, "Tag cache lookup failed"),
        }

        if !slot.breaker.allows_requests() {
            record(kind, "quota");
            return Ok(None);
        }

        if image.is_none() {
            *image = Some(self.reducer.reduce(&item.full_path, item.is_video()).await?);
        }
        let bytes: &[u8] = image.as_deref().unwrap_or(&[]);

        let slept = slot.throttle.wait().await;
        if slept > Duration::ZERO {
            debug!(provider = %kind, slept_ms = slept.as_millis() as u64, "Throttled provider call");
        }

        let response = match slot.provider.classify(bytes).await {
            Ok(response) => response,
            Err(e) => {
                if let TagError::QuotaExceeded { status } = e {
                    slot.breaker.trip(status);
                }
                return Err(e);
            }
        };

        if let Err(e) = slot.cache.store(&item.id, &response).await {
            error!(provider = %kind, path = %item.id, error = %e, "Failed caching provider response");
        }
        record(kind, "tagged");
        self.statistics.add_provider_tags(1);
        Ok(Some(slot.provider.extract_tags(&response)))
    }

    /// Write the new provider fields into the stored document.
    ///
    /// The write is guarded by the version read; a concurrent re-index makes
    /// it conflict, and the merge is redone on the fresh document.
    async fn merge(&self, item: &TagWorkItem, found: &[(ProviderKind, Vec<String>)]) -> TagResult<()> {
        let mut attempt = 1;
        loop {
            let stored = self
                .engine
                .get_document(&self.media_index, &item.id)
                .await?
                .ok_or_else(|| TagError::DocumentNotFound(item.id.clone()))?;

            let mut source = stored.source;
            {
                let fields = source.as_object_mut().ok_or_else(|| {
                    TagError::Engine(EngineError::Decode(format!("{} is not an object", item.id)))
                })?;
                for (kind, tags) in found {
                    fields.insert(kind.document_field().to_string(), json!(tags));
                    if *kind == ProviderKind::Azure {
                        fields.insert(GENERIC_TAGS_FIELD.to_string(), json!(tags));
                    }
                }
            }

            match self
                .engine
                .put_document(&self.media_index, &item.id, &source, PutOptions::guarded(stored.version))
                .await
            {
                Ok(()) => {
                    debug!(path = %item.id, providers = found.len(), "Merged provider tags");
                    return Ok(());
                }
                Err(EngineError::Conflict(_)) if attempt < MAX_MERGE_ATTEMPTS => {
                    debug!(path = %item.id, attempt, "Version conflict merging tags, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Producer side of the tag queue; cheap to clone
#[derive(Clone)]
pub struct TagQueue {
    tx: mpsc::UnboundedSender<TagWorkItem>,
    outstanding: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    statistics: Arc<Statistics>,
}

impl TagQueue {
    pub fn enqueue(&self, items: Vec<TagWorkItem>) {
        if items.is_empty() {
            return;
        }
        self.statistics.add_missing_tags(items.len() as u64);

        for item in items {
            self.outstanding.fetch_add(1, Ordering::SeqCst);
            if let Err(rejected) = self.tx.send(item) {
                warn!(path = %rejected.0.id, "Tag worker stopped, dropping item");
                self.complete_one();
            }
        }
    }

    /// Items queued or being processed
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Block until the queue is empty and no item is in flight
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            idle.await;
        }
    }

    fn complete_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Handle to the running consumer task
pub struct TagWorker {
    queue: TagQueue,
    enricher: Arc<TagEnricher>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl TagWorker {
    /// Spawn the single consumer
    pub fn start(enricher: TagEnricher, failures: Arc<FailureLog>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<TagWorkItem>();
        let enricher = Arc::new(enricher);
        let shutdown = Arc::new(Notify::new());
        let queue = TagQueue {
            tx,
            outstanding: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            statistics: enricher.statistics.clone(),
        };

        let worker_enricher = enricher.clone();
        let worker_queue = queue.clone();
        let worker_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            info!(providers = worker_enricher.providers.len(), "Tag worker started");
            loop {
                let item = tokio::select! {
                    item = rx.recv() => item,
                    _ = worker_shutdown.notified() => None,
                };
                let Some(item) = item else { break };

                match worker_enricher.process(&item).await {
                    Ok(tagged) if !tagged.is_empty() => {
                        debug!(path = %item.id, providers = ?tagged, "Tagged media");
                    }
                    Ok(_) => {}
                    Err(e) => failures.append(format!("Failed tagging {}: {}", item.id, e)),
                }
                worker_queue.complete_one();
            }
            info!("Tag worker stopped");
        });

        Self {
            queue,
            enricher,
            shutdown,
            handle,
        }
    }

    pub fn queue(&self) -> TagQueue {
        self.queue.clone()
    }

    pub fn enricher(&self) -> &TagEnricher {
        &self.enricher
    }

    /// Drain the queue, then stop the consumer
    pub async fn finish(self) {
        self.queue.wait_idle().await;
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Tag worker task failed");
        }
    }
}

/// Current stored value of a provider field, if present
pub fn stored_tags(source: &Value, kind: ProviderKind) -> Option<Vec<String>> {
    source
        .get(kind.document_field())
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
}
