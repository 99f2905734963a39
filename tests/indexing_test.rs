//! End-to-end indexing runs against the in-memory engine

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use findaphoto::config::Config;
use findaphoto::elastic::{InMemoryEngine, SearchEngine};
use findaphoto::indexing::{
    Indexer, IndexerContext, IndexingResult, MediaPreparer, PlaceLookup, Placename, ReverseGeocoder,
};
use findaphoto::models::{GeoLocation, MediaDocument, MediaFile};
use findaphoto::tagging::{
    confident_names, ImageReducer, ProviderKind, TagCache, TagEnricher, TagProvider, TagResult,
};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Provider answering every image with the same tag
struct CountingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl TagProvider for CountingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn min_interval(&self) -> Duration {
        Duration::ZERO
    }

    async fn classify(&self, _image: &[u8]) -> TagResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"tags": [{"name": "beach", "confidence": 0.95}]}))
    }

    fn extract_tags(&self, response: &Value) -> Vec<String> {
        confident_names(response.get("tags"), "confidence", 0.8)
    }
}

struct PassThroughReducer;

#[async_trait]
impl ImageReducer for PassThroughReducer {
    async fn reduce(&self, source: &Path, _is_video: bool) -> TagResult<Vec<u8>> {
        Ok(tokio::fs::read(source).await?)
    }
}

/// Create a media tree: `folders` folders holding `per_folder` photos each
fn media_tree(folders: usize, per_folder: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    for folder in 0..folders {
        let path = dir.path().join(format!("album-{}", folder));
        fs::create_dir_all(&path).unwrap();
        for file in 0..per_folder {
            fs::write(path.join(format!("img-{}.jpg", file)), format!("{}-{}", folder, file)).unwrap();
        }
    }
    dir
}

fn context(engine: &InMemoryEngine, configure: impl FnOnce(&mut Config)) -> IndexerContext {
    let mut config = Config::embedded().unwrap();
    config.indexer.batch_size = 4;
    config.indexer.concurrent = 3;
    configure(&mut config);
    IndexerContext::new(config, Arc::new(engine.clone()))
}

fn tagging_indexer(engine: &InMemoryEngine, provider: &Arc<CountingProvider>) -> Indexer {
    let context = context(engine, |_| {});
    let shared: Arc<dyn SearchEngine> = Arc::new(engine.clone());
    let enricher = TagEnricher::new(
        shared.clone(),
        context.names.media.clone(),
        Arc::new(PassThroughReducer),
        context.statistics.clone(),
    )
    .with_provider(provider.clone(), TagCache::new(shared, "azure-tag-cache"));
    Indexer::new(context).with_enricher(enricher)
}

#[tokio::test]
async fn test_concurrent_folders_all_indexed() {
    let tree = media_tree(5, 3);
    let engine = InMemoryEngine::new();

    let report = Indexer::new(context(&engine, |_| {})).run(tree.path()).await.unwrap();

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.statistics.folders, 5);
    assert_eq!(report.statistics.files, 15);
    assert_eq!(report.statistics.indexed, 15);
    assert_eq!(engine.document_count("fp-media"), 15);

    let doc = engine.document("fp-media", "1\\album-3\\img-2.jpg").unwrap();
    assert_eq!(doc["filename"], "img-2.jpg");
    assert_eq!(doc["mimeType"], "image/jpeg");
    assert_eq!(doc["signature"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_second_run_skips_unchanged_but_tags_them() {
    let tree = media_tree(2, 3);
    let engine = InMemoryEngine::new();

    Indexer::new(context(&engine, |_| {})).run(tree.path()).await.unwrap();
    let bulk_after_first = engine.bulk_calls();
    assert!(bulk_after_first > 0);

    let provider = Arc::new(CountingProvider {
        calls: AtomicUsize::new(0),
    });
    let report = tagging_indexer(&engine, &provider).run(tree.path()).await.unwrap();

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(engine.bulk_calls(), bulk_after_first);
    assert_eq!(report.statistics.indexed, 0);
    assert_eq!(report.statistics.missing_tags, 6);
    assert_eq!(report.statistics.provider_tags, 6);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 6);

    let doc = engine.document("fp-media", "1\\album-0\\img-0.jpg").unwrap();
    assert_eq!(doc["azureTags"], json!(["beach"]));
    assert_eq!(doc["tags"], json!(["beach"]));
    assert_eq!(engine.document_count("azure-tag-cache"), 6);

    // Already tagged by the only provider: nothing new goes out
    let report = tagging_indexer(&engine, &provider).run(tree.path()).await.unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(engine.bulk_calls(), bulk_after_first);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_new_documents_are_tagged_after_indexing() {
    let tree = media_tree(1, 2);
    let engine = InMemoryEngine::new();
    let provider = Arc::new(CountingProvider {
        calls: AtomicUsize::new(0),
    });

    let report = tagging_indexer(&engine, &provider).run(tree.path()).await.unwrap();

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.statistics.indexed, 2);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    let doc = engine.document("fp-media", "1\\album-0\\img-1.jpg").unwrap();
    assert_eq!(doc["azureTags"], json!(["beach"]));
}

#[tokio::test]
async fn test_changed_file_is_reindexed() {
    let tree = media_tree(1, 3);
    let engine = InMemoryEngine::new();
    Indexer::new(context(&engine, |_| {})).run(tree.path()).await.unwrap();

    fs::write(tree.path().join("album-0/img-1.jpg"), b"edited").unwrap();
    let report = Indexer::new(context(&engine, |_| {})).run(tree.path()).await.unwrap();

    assert_eq!(report.statistics.indexed, 1);
    let root_name = tree.path().file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(report.statistics.last_folder, format!("{}/album-0", root_name));
}

#[tokio::test]
async fn test_reindex_forces_every_file() {
    let tree = media_tree(2, 2);
    let engine = InMemoryEngine::new();
    Indexer::new(context(&engine, |_| {})).run(tree.path()).await.unwrap();

    let report = Indexer::new(context(&engine, |config| config.indexer.reindex = true))
        .run(tree.path())
        .await
        .unwrap();
    assert_eq!(report.statistics.indexed, 4);
}

#[tokio::test]
async fn test_same_root_reuses_alias() {
    let first = media_tree(1, 1);
    let second = media_tree(1, 1);
    let engine = InMemoryEngine::new();

    let a = Indexer::new(context(&engine, |_| {})).run(first.path()).await.unwrap();
    let b = Indexer::new(context(&engine, |_| {})).run(second.path()).await.unwrap();
    let again = Indexer::new(context(&engine, |_| {})).run(first.path()).await.unwrap();

    assert_eq!(a.alias, "1");
    assert_eq!(b.alias, "2");
    assert_eq!(again.alias, "1");
    assert!(engine.document("fp-media", "2\\album-0\\img-0.jpg").is_some());
}

/// Preparer placing every file in Seattle
struct LocatedPreparer;

#[async_trait]
impl MediaPreparer for LocatedPreparer {
    async fn prepare(&self, _folder: &Path, files: &[MediaFile]) -> IndexingResult<Vec<MediaDocument>> {
        Ok(files
            .iter()
            .map(|file| {
                let mut media = MediaDocument::new(&file.aliased_path, &file.signature);
                media.location = Some(GeoLocation::new(47.6, -122.3));
                media
            })
            .collect())
    }
}

struct SeattleGeocoder;

#[async_trait]
impl ReverseGeocoder for SeattleGeocoder {
    async fn lookup(&self, locations: &[GeoLocation]) -> IndexingResult<Vec<PlaceLookup>> {
        Ok(locations
            .iter()
            .map(|_| {
                Ok(Placename {
                    city: Some("Seattle".into()),
                    state: Some("Washington".into()),
                    country_name: Some("United States".into()),
                    country_code: Some("US".into()),
                    ..Default::default()
                })
            })
            .collect())
    }
}

#[tokio::test]
async fn test_placenames_filled_before_indexing() {
    let tree = media_tree(1, 2);
    let engine = InMemoryEngine::new();

    let report = Indexer::new(context(&engine, |config| config.indexer.show_timings = true))
        .with_preparer(Arc::new(LocatedPreparer))
        .with_geocoder(Arc::new(SeattleGeocoder))
        .run(tree.path())
        .await
        .unwrap();

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    let doc = engine.document("fp-media", "1\\album-0\\img-0.jpg").unwrap();
    assert_eq!(doc["locationCityName"], "Seattle");
    assert_eq!(doc["locationHierarchicalName"], "Seattle, Washington, United States");
}
