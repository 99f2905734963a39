//! Rate-limited tag enrichment.
//!
//! Indexed documents are queued as [`TagWorkItem`]s and tagged by a single
//! background [`TagWorker`]. Each provider answer is cached in its own index
//! so the same file is never classified twice; a provider that reports an
//! exhausted quota is disabled for the rest of the run.

mod azure;
mod cache;
mod clarifai;
mod error;
mod image;
mod models;
mod provider;
mod worker;

pub use azure::AzureTagProvider;
pub use cache::{TagCache, DATE_RETRIEVED_FIELD};
pub use clarifai::{ClarifaiTagProvider, GENERAL_MODEL_ID};
pub use error::{TagError, TagResult};
pub use image::{ExternalToolReducer, ImageReducer};
pub use models::{ProviderKind, TagWorkItem};
pub use provider::{confident_names, BreakerState, QuotaBreaker, TagProvider, Throttle};
pub use worker::{stored_tags, ProviderSlot, TagEnricher, TagQueue, TagWorker, MAX_MERGE_ATTEMPTS};

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{IndexNames, ProviderConfig, TaggingConfig};
use crate::elastic::SearchEngine;
use crate::indexing::Statistics;

/// Build an enricher with every enabled provider whose API key is available
pub fn enricher_from_config(
    config: &TaggingConfig,
    names: &IndexNames,
    engine: Arc<dyn SearchEngine>,
    statistics: Arc<Statistics>,
) -> TagResult<TagEnricher> {
    let reducer: Arc<dyn ImageReducer> = Arc::new(ExternalToolReducer::from_config(config));
    let mut enricher = TagEnricher::new(engine.clone(), names.media.clone(), reducer, statistics);
    if !config.enabled {
        info!("Tagging disabled");
        return Ok(enricher);
    }

    if let Some(key) = provider_key(ProviderKind::Azure, &config.azure) {
        let provider = AzureTagProvider::new(&config.azure, key, config.min_confidence)?;
        let cache = TagCache::new(engine.clone(), names.cache(&config.azure.cache_index));
        enricher = enricher.with_provider(Arc::new(provider), cache);
    }
    if let Some(key) = provider_key(ProviderKind::Clarifai, &config.clarifai) {
        let provider = ClarifaiTagProvider::new(&config.clarifai, key, config.min_confidence)?;
        let cache = TagCache::new(engine, names.cache(&config.clarifai.cache_index));
        enricher = enricher.with_provider(Arc::new(provider), cache);
    }

    info!(providers = enricher.providers().len(), "Tag providers configured");
    Ok(enricher)
}

fn provider_key(kind: ProviderKind, config: &ProviderConfig) -> Option<String> {
    if !config.enabled {
        return None;
    }
    let key = config.api_key();
    if key.is_none() {
        warn!(provider = %kind, env = %config.api_key_env, "No API key set, provider disabled");
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::elastic::InMemoryEngine;

    #[test]
    fn test_providers_without_keys_are_skipped() {
        let mut config = Config::embedded().unwrap().tagging;
        config.azure.api_key_env = "FP_TEST_UNSET_AZURE_KEY".to_string();
        config.clarifai.api_key_env = "FP_TEST_UNSET_CLARIFAI_KEY".to_string();

        let enricher = enricher_from_config(
            &config,
            &IndexNames::default(),
            Arc::new(InMemoryEngine::new()),
            Arc::new(Statistics::new(0)),
        )
        .unwrap();
        assert!(enricher.providers().is_empty());
    }

    #[test]
    fn test_disabled_provider_ignored_even_with_key() {
        std::env::set_var("FP_TEST_CLARIFAI_KEY_SET", "secret");
        let mut config = Config::embedded().unwrap().tagging;
        config.azure.api_key_env = "FP_TEST_UNSET_AZURE_KEY".to_string();
        config.clarifai.api_key_env = "FP_TEST_CLARIFAI_KEY_SET".to_string();

        let enricher = enricher_from_config(
            &config,
            &IndexNames::with_prefix("t-"),
            Arc::new(InMemoryEngine::new()),
            Arc::new(Statistics::new(0)),
        )
        .unwrap();
        assert_eq!(enricher.providers().len(), 1);
        assert_eq!(enricher.providers()[0].kind(), ProviderKind::Clarifai);

        config.clarifai.enabled = false;
        let enricher = enricher_from_config(
            &config,
            &IndexNames::default(),
            Arc::new(InMemoryEngine::new()),
            Arc::new(Statistics::new(0)),
        )
        .unwrap();
        assert!(enricher.providers().is_empty());
    }
}
