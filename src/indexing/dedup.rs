//! Dedup gate: compare fresh signatures against stored documents

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::elastic::{EngineResult, SearchEngine};
use crate::models::{FileStatus, MediaFile};

/// Stored fields needed to decide whether a file changed or lacks tags
pub const DEDUP_SOURCE_FIELDS: &[&str] = &["signature", "azureTags", "clarifaiTags"];

fn has_field(source: &Value, field: &str) -> bool {
    source.get(field).map(|value| !value.is_null()).unwrap_or(false)
}

/// Set the status and provider-presence flags of each file from one multi-get
pub async fn check_existing(
    engine: &dyn SearchEngine,
    index: &str,
    files: &mut [MediaFile],
) -> EngineResult<()> {
    if files.is_empty() {
        return Ok(());
    }

    let ids: Vec<String> = files.iter().map(|f| f.aliased_path.clone()).collect();
    let stored: HashMap<String, Value> = engine.multi_get(index, &ids, DEDUP_SOURCE_FIELDS).await?;

    for file in files.iter_mut() {
        match stored.get(&file.aliased_path) {
            None => file.status = FileStatus::New,
            Some(source) => {
                let signature = source.get("signature").and_then(Value::as_str);
                file.status = if file.signature_matches(signature) {
                    FileStatus::Unchanged
                } else {
                    FileStatus::Changed
                };
                file.has_azure_tags = has_field(source, "azureTags");
                file.has_clarifai_tags = has_field(source, "clarifaiTags");
            }
        }
    }

    debug!(
        files = files.len(),
        unchanged = files.iter().filter(|f| f.status == FileStatus::Unchanged).count(),
        "Checked existing media"
    );
    Ok(())
}
