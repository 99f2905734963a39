//! Ingestion pipeline.
//!
//! A run walks a media tree folder by folder. Each folder's files are
//! signed, compared against the stored documents, and only new or changed
//! files are prepared and handed to the [`IngestBatcher`]. Indexed documents
//! (and unchanged ones still missing tags) flow on to the tag worker.

mod aliases;
mod batcher;
mod dedup;
mod enumerate;
mod error;
mod failures;
mod geocode;
mod pipeline;
mod prepare;
mod signature;
mod statistics;

pub use aliases::{normalize_path, AliasRegistry, MAX_ALIAS_COUNT};
pub use batcher::{FlushOutcome, IngestBatcher, DEFAULT_BATCH_SIZE};
pub use dedup::{check_existing, DEDUP_SOURCE_FIELDS};
pub use enumerate::{enumerate_media, is_supported, MediaFolder, SUPPORTED_EXTENSIONS};
pub use error::{IndexingError, IndexingResult};
pub use failures::FailureLog;
pub use geocode::{apply_placename, lookup_names, HttpGeocoder, PlaceLookup, Placename, ReverseGeocoder};
pub use pipeline::{Indexer, IndexerContext, RunReport};
pub use prepare::{mime_type_for, FileMetadataPreparer, MediaPreparer};
pub use signature::{calculate_signatures, file_signature, SIGNATURE_BLOCK_BYTES};
pub use statistics::{StageTimings, Statistics, StatisticsSnapshot};
