use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use findaphoto::{
    config::Config,
    elastic::ElasticClient,
    indexing::{Indexer, IndexerContext},
};
use validator::Validate;

#[derive(Parser)]
#[command(name = "fp-indexer")]
#[command(about = "Index a folder of photos and videos into FindAPhoto", version)]
struct Cli {
    /// The path to scan for photos & videos
    #[arg(short, long)]
    path: PathBuf,

    /// The URL of the search engine
    #[arg(short, long, env = "FP_ELASTIC_URL")]
    elastic: Option<String>,

    /// The number of concurrent folder tasks
    #[arg(long)]
    concurrent: Option<usize>,

    /// The prefix for the indices (for development)
    #[arg(short, long)]
    index: Option<String>,

    /// Re-index every file, even when its signature is unchanged
    #[arg(long)]
    reindex: bool,

    /// The URL of the reverse geocoding service; enables place name lookups
    #[arg(short, long)]
    reverse: Option<String>,

    /// Report per-stage timings
    #[arg(long)]
    timings: bool,

    /// Configuration file
    #[arg(short, long, env = "FP_CONFIG_PATH")]
    config: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.elastic {
            config.elastic.url = url.clone();
        }
        if let Some(concurrent) = self.concurrent {
            config.indexer.concurrent = concurrent;
        }
        if let Some(prefix) = &self.index {
            config.elastic.index_prefix = prefix.clone();
        }
        if let Some(url) = &self.reverse {
            config.geocode.url = url.clone();
            config.geocode.enabled = true;
        }
        config.indexer.reindex |= self.reindex;
        config.indexer.show_timings |= self.timings;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    findaphoto::init_tracing(&config.observability)?;
    tracing::info!("Starting FindAPhoto indexer v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = findaphoto::metrics::init_metrics() {
        tracing::warn!("Failed to initialize metrics: {}", e);
    }

    let engine = ElasticClient::new(config.elastic.url.clone(), config.elastic.timeout_secs)?;
    tracing::info!("✅ Search engine client created for {}", config.elastic.url);

    let context = IndexerContext::new(config, Arc::new(engine));
    let indexer = Indexer::from_config(context)?;
    tracing::info!("✅ Indexer initialized");

    let report = indexer.run(&cli.path).await?;

    tracing::info!(
        "✅ Indexed {} of {} files in {} folders in {:.1}s",
        report.statistics.indexed,
        report.statistics.files,
        report.statistics.folders,
        report.elapsed.as_secs_f64()
    );
    if !report.failures.is_empty() {
        eprintln!("{} failures:", report.failures.len());
        for failure in &report.failures {
            eprintln!(" -> {}", failure);
        }
    }
    Ok(())
}
