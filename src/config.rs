use serde::{Deserialize, Serialize};
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Search engine connection
    #[validate(nested)]
    pub elastic: ElasticConfig,

    /// Ingestion pipeline
    #[validate(nested)]
    pub indexer: IndexerConfig,

    /// Reverse geocoding service
    #[serde(default)]
    pub geocode: GeocodeConfig,

    /// Tag enrichment
    #[validate(nested)]
    pub tagging: TaggingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let config_path = path
            .map(str::to_string)
            .or_else(|| std::env::var("FP_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/findaphoto.toml".to_string());

        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: FP_)
            .add_source(
                config::Environment::with_prefix("FP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only, ignoring files and the environment
    pub fn embedded() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()?
            .try_deserialize()
    }

    /// Names of every index this process touches
    pub fn index_names(&self) -> IndexNames {
        IndexNames::with_prefix(&self.elastic.index_prefix)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ElasticConfig {
    /// Base URL of the search engine
    #[serde(default = "default_elastic_url")]
    #[validate(length(min = 1))]
    pub url: String,

    /// Prefix prepended to every index name
    #[serde(default)]
    pub index_prefix: String,

    /// Timeout applied to every request (seconds)
    #[serde(default = "default_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IndexerConfig {
    /// Folder tasks allowed in flight
    #[serde(default = "default_concurrent")]
    #[validate(range(min = 1, max = 64))]
    pub concurrent: usize,

    /// Pending documents tolerated before a bulk flush
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Re-prepare and re-index files whose signature is unchanged
    #[serde(default)]
    pub reindex: bool,

    /// Report per-stage durations at the end of a run
    #[serde(default)]
    pub show_timings: bool,

    /// Indexed documents between progress reports
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the reverse geocoding service
    #[serde(default = "default_geocode_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_geocode_url(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TaggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tags at or below this confidence are discarded
    #[serde(default = "default_min_confidence")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: f64,

    /// Starting height of the reduced image sent to providers
    #[serde(default = "default_max_image_height")]
    #[validate(range(min = 64))]
    pub max_image_height: u32,

    /// Height removed on every retry while the reduced image is too large
    #[serde(default = "default_height_step")]
    #[validate(range(min = 1))]
    pub height_step: u32,

    /// Largest payload accepted by the providers
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,

    #[serde(default = "default_vips_path")]
    pub vips_path: String,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Longest a single vipsthumbnail/ffmpeg run may take
    #[serde(default = "default_tool_timeout")]
    #[validate(range(min = 1))]
    pub tool_timeout_secs: u64,

    #[validate(nested)]
    pub azure: ProviderConfig,

    #[validate(nested)]
    pub clarifai: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[validate(length(min = 1))]
    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Minimum spacing between two outbound calls
    #[validate(range(min = 0.0))]
    pub min_seconds_between_calls: f64,

    /// Unprefixed name of the response cache index
    pub cache_index: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Resolve the API key from the environment
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Fully qualified index names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    pub prefix: String,
    pub media: String,
    pub alias: String,
}

impl IndexNames {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            media: format!("{}fp-media", prefix),
            alias: format!("{}fp-alias", prefix),
        }
    }

    /// Prefixed name of a provider cache index
    pub fn cache(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

impl Default for IndexNames {
    fn default() -> Self {
        Self::with_prefix("")
    }
}

fn default_elastic_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_geocode_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_concurrent() -> usize {
    2
}

fn default_batch_size() -> usize {
    100
}

fn default_progress_interval() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_min_confidence() -> f64 {
    0.80
}

fn default_max_image_height() -> u32 {
    1436
}

fn default_height_step() -> u32 {
    512
}

fn default_max_file_size() -> u64 {
    3 * 1024 * 1024
}

fn default_vips_path() -> String {
    "vipsthumbnail".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_tool_timeout() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}
