//! Photo and video indexing with faceted, geo-aware search.
//!
//! - [`indexing`] walks a media tree and writes one document per file,
//!   skipping files whose content signature is unchanged.
//! - [`tagging`] enriches indexed documents with provider tags on a single
//!   rate-limited background worker.
//! - [`search`] compiles search parameters into engine queries and turns the
//!   responses into hits, groups and facet trees.

pub mod config;
pub mod elastic;
pub mod error;
pub mod indexing;
pub mod metrics;
pub mod models;
pub mod search;
pub mod tagging;

pub use error::{AppError, Result};

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Install the global subscriber for a binary. Logs go to stderr so command
/// output on stdout stays machine readable.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &config::ObservabilityConfig) -> std::result::Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("findaphoto={}", config.log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).try_init()
    }
}
