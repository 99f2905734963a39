//! The indexing run: enumerate a tree, then sign, check, prepare, geocode
//! and batch every folder on a bounded number of concurrent tasks

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::aliases::AliasRegistry;
use super::batcher::IngestBatcher;
use super::dedup::check_existing;
use super::enumerate::{enumerate_media, MediaFolder};
use super::error::{IndexingError, IndexingResult};
use super::failures::FailureLog;
use super::geocode::{lookup_names, HttpGeocoder, ReverseGeocoder};
use super::prepare::{FileMetadataPreparer, MediaPreparer};
use super::signature::calculate_signatures;
use super::statistics::{StageTimings, Statistics, StatisticsSnapshot};
use crate::config::{Config, IndexNames};
use crate::elastic::{ensure_indices, SearchEngine};
use crate::error::Result;
use crate::models::{FileStatus, MediaFile};
use crate::tagging::{enricher_from_config, TagEnricher, TagQueue, TagWorkItem, TagWorker};

/// Shared state of one indexing run
pub struct IndexerContext {
    pub config: Config,
    pub engine: Arc<dyn SearchEngine>,
    pub names: IndexNames,
    pub statistics: Arc<Statistics>,
    pub failures: Arc<FailureLog>,
    pub aliases: Arc<AliasRegistry>,
}

impl IndexerContext {
    pub fn new(config: Config, engine: Arc<dyn SearchEngine>) -> Self {
        let names = config.index_names();
        let statistics = Arc::new(Statistics::new(config.indexer.progress_interval));
        let aliases = Arc::new(AliasRegistry::new(engine.clone(), names.alias.clone()));
        Self {
            config,
            engine,
            names,
            statistics,
            failures: Arc::new(FailureLog::new()),
            aliases,
        }
    }
}

/// What a finished run did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub alias: String,
    pub statistics: StatisticsSnapshot,
    pub failures: Vec<String>,
    pub elapsed: Duration,
}

pub struct Indexer {
    context: Arc<IndexerContext>,
    preparer: Arc<dyn MediaPreparer>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    enricher: Option<TagEnricher>,
}

impl Indexer {
    /// Indexer with file metadata preparation only: no geocoding, no tagging
    pub fn new(context: IndexerContext) -> Self {
        Self {
            context: Arc::new(context),
            preparer: Arc::new(FileMetadataPreparer),
            geocoder: None,
            enricher: None,
        }
    }

    /// Indexer with the geocoder and tag providers enabled in the configuration
    pub fn from_config(context: IndexerContext) -> Result<Self> {
        let geocoder: Option<Arc<dyn ReverseGeocoder>> = if context.config.geocode.enabled {
            let geocode = &context.config.geocode;
            Some(Arc::new(HttpGeocoder::new(geocode.url.clone(), geocode.timeout_secs)?))
        } else {
            None
        };

        let enricher = enricher_from_config(
            &context.config.tagging,
            &context.names,
            context.engine.clone(),
            context.statistics.clone(),
        )?;

        let mut indexer = Self::new(context);
        indexer.geocoder = geocoder;
        if !enricher.providers().is_empty() {
            indexer.enricher = Some(enricher);
        }
        Ok(indexer)
    }

    pub fn with_preparer(mut self, preparer: Arc<dyn MediaPreparer>) -> Self {
        self.preparer = preparer;
        self
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_enricher(mut self, enricher: TagEnricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn context(&self) -> &IndexerContext {
        &self.context
    }

    /// Index everything under `root`, wait for tagging to drain, and report
    pub async fn run(self, root: &Path) -> IndexingResult<RunReport> {
        let ctx = self.context.clone();
        let indexer_config = &ctx.config.indexer;

        // Nothing is registered for a root that does not exist
        if !root.is_dir() {
            return Err(IndexingError::FolderNotFound(root.display().to_string()));
        }
        ensure_indices(ctx.engine.as_ref(), &ctx.names).await?;
        ctx.aliases.load().await?;
        let alias = ctx.aliases.add_or_create(root).await?;
        info!(
            path = %root.display(),
            alias = %alias,
            concurrent = indexer_config.concurrent,
            media_index = %ctx.names.media,
            alias_index = %ctx.names.alias,
            "Indexing"
        );
        if indexer_config.reindex {
            info!("Re-indexing all media");
        }

        let worker = match self.enricher {
            Some(enricher) => {
                if let Err(e) = enricher.ensure_caches().await {
                    ctx.failures.append(format!("Failed creating tag cache indices: {}", e));
                }
                Some(TagWorker::start(enricher, ctx.failures.clone()))
            }
            None => None,
        };

        let mut batcher = IngestBatcher::new(
            ctx.engine.clone(),
            ctx.names.media.clone(),
            indexer_config.batch_size,
            ctx.statistics.clone(),
            ctx.failures.clone(),
        );
        if let Some(worker) = &worker {
            batcher = batcher.with_tagging(worker.queue(), ctx.aliases.clone());
        }
        let batcher = Arc::new(batcher);

        ctx.statistics.start();
        let folders = {
            let (walk_root, alias) = (root.to_path_buf(), alias.clone());
            let (statistics, failures) = (ctx.statistics.clone(), ctx.failures.clone());
            tokio::task::spawn_blocking(move || enumerate_media(&walk_root, &alias, &statistics, &failures))
                .await
                .map_err(|e| IndexingError::Enumeration {
                    path: root.display().to_string(),
                    reason: e.to_string(),
                })??
        };

        let stage = Arc::new(FolderStage {
            ctx: ctx.clone(),
            preparer: self.preparer.clone(),
            geocoder: self.geocoder.clone(),
            batcher: batcher.clone(),
            tag_queue: worker.as_ref().map(TagWorker::queue),
            root: root.to_path_buf(),
        });

        let semaphore = Arc::new(Semaphore::new(indexer_config.concurrent));
        let mut tasks = JoinSet::new();
        for folder in folders {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let stage = stage.clone();
            tasks.spawn(async move {
                let _permit = permit;
                stage.run(folder).await;
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                ctx.failures.append(format!("Folder task failed: {}", e));
            }
        }

        let flushed = batcher.finish().await;
        debug!(indexed = flushed.indexed, failed = flushed.failed, "Flushed remaining documents");

        if let Some(worker) = worker {
            info!(outstanding = worker.queue().outstanding(), "Waiting for tagging to finish");
            worker.finish().await;
        }

        ctx.statistics.stop(ctx.failures.len());
        let statistics = ctx.statistics.snapshot();
        if indexer_config.show_timings {
            let timings = &statistics.timings;
            info!(
                signature_secs = timings.signature.as_secs_f64(),
                check_secs = timings.check.as_secs_f64(),
                prepare_secs = timings.prepare.as_secs_f64(),
                lookup_secs = timings.lookup.as_secs_f64(),
                "Stage timings"
            );
            debug!(metrics = %crate::metrics::gather_text(), "Metrics at end of run");
        }

        Ok(RunReport {
            alias,
            statistics,
            failures: ctx.failures.drain(),
            elapsed: ctx.statistics.elapsed(),
        })
    }
}

/// Per-folder work shared by every folder task
struct FolderStage {
    ctx: Arc<IndexerContext>,
    preparer: Arc<dyn MediaPreparer>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    batcher: Arc<IngestBatcher>,
    tag_queue: Option<TagQueue>,
    root: PathBuf,
}

impl FolderStage {
    async fn run(&self, folder: MediaFolder) {
        let started = Instant::now();
        let MediaFolder { path, files } = folder;
        let failures = self.ctx.failures.clone();

        let mut files = match tokio::task::spawn_blocking(move || {
            let mut files = files;
            calculate_signatures(&mut files, &failures);
            files
        })
        .await
        {
            Ok(files) => files,
            Err(e) => {
                self.ctx
                    .failures
                    .append(format!("Signature task failed for {}: {}", path.display(), e));
                return;
            }
        };
        let signed = Instant::now();

        // Pending files are treated as new
        if let Err(e) = check_existing(self.ctx.engine.as_ref(), &self.ctx.names.media, &mut files).await {
            self.ctx.failures.append(format!("Check failed: {}", e));
        }
        let checked = Instant::now();

        let reindex = self.ctx.config.indexer.reindex;
        let (to_index, unchanged): (Vec<MediaFile>, Vec<MediaFile>) = files
            .into_iter()
            .partition(|file| reindex || file.status.needs_indexing());
        self.enqueue_untagged(&unchanged);

        let mut timings = StageTimings {
            signature: signed - started,
            check: checked - signed,
            ..StageTimings::default()
        };

        if !to_index.is_empty() {
            match self.preparer.prepare(&path, &to_index).await {
                Ok(mut media) => {
                    let prepared = Instant::now();
                    timings.prepare = prepared - checked;

                    if !media.is_empty() {
                        if let Some(geocoder) = &self.geocoder {
                            lookup_names(&mut media, geocoder.as_ref(), &self.ctx.failures).await;
                            timings.lookup = prepared.elapsed();
                        }
                        self.batcher.add(media).await;
                    }
                }
                Err(e) => self
                    .ctx
                    .failures
                    .append(format!("Failed preparing {}: {}", path.display(), e)),
            }
            self.ctx.statistics.completed_folder(self.relative_name(&path));
        }

        debug!(
            folder = %path.display(),
            indexed = to_index.len(),
            unchanged = unchanged.len(),
            "Folder done"
        );
        self.ctx.statistics.add_timings(&timings);
    }

    /// Unchanged documents still missing a provider's tags go straight to the tag worker
    fn enqueue_untagged(&self, unchanged: &[MediaFile]) {
        let Some(queue) = &self.tag_queue else {
            return;
        };
        let items: Vec<TagWorkItem> = unchanged
            .iter()
            .filter(|file| file.status == FileStatus::Unchanged && file.needs_tags())
            .map(|file| {
                TagWorkItem::new(
                    file.aliased_path.as_str(),
                    file.full_path.clone(),
                    file.has_azure_tags,
                    file.has_clarifai_tags,
                )
            })
            .collect();
        if !items.is_empty() {
            debug!(count = items.len(), "Queueing unchanged media for tagging");
        }
        queue.enqueue(items);
    }

    /// Folder name relative to the parent of the indexed root, for progress lines
    fn relative_name(&self, folder: &Path) -> String {
        let base = self
            .root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match folder.strip_prefix(&self.root) {
            Ok(rest) if rest.as_os_str().is_empty() => base,
            Ok(rest) => format!("{}/{}", base, rest.display()),
            Err(_) => {
                warn!(folder = %folder.display(), root = %self.root.display(), "Folder outside indexed root");
                folder.display().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::InMemoryEngine;
    use std::fs;
    use tempfile::tempdir;

    fn context(engine: &InMemoryEngine) -> IndexerContext {
        let mut config = Config::embedded().unwrap();
        config.indexer.batch_size = 2;
        IndexerContext::new(config, Arc::new(engine.clone()))
    }

    #[tokio::test]
    async fn test_run_indexes_tree_and_registers_alias() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2019/trip")).unwrap();
        fs::write(dir.path().join("a.jpg"), b"one").unwrap();
        fs::write(dir.path().join("2019/b.PNG"), b"two").unwrap();
        fs::write(dir.path().join("2019/trip/c.mp4"), b"three").unwrap();
        fs::write(dir.path().join("2019/notes.txt"), b"skip").unwrap();

        let engine = InMemoryEngine::new();
        let report = Indexer::new(context(&engine)).run(dir.path()).await.unwrap();

        assert_eq!(report.alias, "1");
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(report.statistics.indexed, 3);
        assert_eq!(report.statistics.files, 3);
        assert_eq!(engine.document_count("fp-media"), 3);
        assert!(engine.document("fp-media", "1\\2019\\trip\\c.mp4").is_some());
        assert!(engine.document("fp-alias", "1").is_some());
    }

    #[tokio::test]
    async fn test_missing_root_is_error() {
        let dir = tempdir().unwrap();
        let engine = InMemoryEngine::new();
        let err = Indexer::new(context(&engine))
            .run(&dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexingError::FolderNotFound(_)));
        assert_eq!(engine.document_count("fp-alias"), 0);
    }

    #[test]
    fn test_relative_name_includes_root_folder() {
        let engine = InMemoryEngine::new();
        let ctx = Arc::new(context(&engine));
        let stage = FolderStage {
            batcher: Arc::new(IngestBatcher::new(
                ctx.engine.clone(),
                "fp-media",
                10,
                ctx.statistics.clone(),
                ctx.failures.clone(),
            )),
            ctx,
            preparer: Arc::new(FileMetadataPreparer),
            geocoder: None,
            tag_queue: None,
            root: PathBuf::from("/photos/family"),
        };

        assert_eq!(stage.relative_name(Path::new("/photos/family")), "family");
        assert_eq!(stage.relative_name(Path::new("/photos/family/2019/trip")), "family/2019/trip");
    }
}
