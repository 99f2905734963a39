//! Alias registry: short numeric tokens standing in for filesystem roots

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use tracing::{info, warn};

use super::error::{IndexingError, IndexingResult};
use crate::elastic::{PutOptions, SearchEngine};
use crate::models::{split_aliased_path, AliasDocument};

/// Most aliases read back from the alias index
pub const MAX_ALIAS_COUNT: usize = 100;

/// Absolute, lexically normalized form of `path` (`.` and `..` removed, no symlink resolution)
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

pub struct AliasRegistry {
    engine: Arc<dyn SearchEngine>,
    index: String,
    aliases: RwLock<Vec<AliasDocument>>,
    path_override: Option<String>,
}

impl AliasRegistry {
    pub fn new(engine: Arc<dyn SearchEngine>, index: impl Into<String>) -> Self {
        Self {
            engine,
            index: index.into(),
            aliases: RwLock::new(Vec::new()),
            path_override: None,
        }
    }

    /// Resolve every alias to `root` instead of its stored path (for development copies)
    pub fn with_path_override(mut self, root: impl Into<String>) -> Self {
        self.path_override = Some(root.into());
        self
    }

    /// Reload all aliases from the alias index
    pub async fn load(&self) -> IndexingResult<()> {
        let body = json!({
            "query": {"match_all": {}},
            "size": MAX_ALIAS_COUNT
        });
        let response = self.engine.search(&self.index, &body).await?;

        let mut aliases = Vec::with_capacity(response.hits.len());
        for hit in response.hits {
            match serde_json::from_value::<AliasDocument>(hit.source) {
                Ok(mut alias) => {
                    if let Some(root) = &self.path_override {
                        info!(alias = %alias.alias, from = %alias.path, to = %root, "Overriding alias path");
                        alias.path = root.clone();
                    }
                    aliases.push(alias);
                }
                Err(e) => warn!(id = %hit.id, error = %e, "Skipping malformed alias"),
            }
        }

        *self.aliases.write() = aliases;
        Ok(())
    }

    pub fn aliases(&self) -> Vec<AliasDocument> {
        self.aliases.read().clone()
    }

    /// Alias registered for `path`, compared case-insensitively
    pub fn alias_for(&self, path: &Path) -> Option<String> {
        let wanted = normalize_path(path).to_string_lossy().to_lowercase();
        self.aliases
            .read()
            .iter()
            .find(|a| a.path.to_lowercase() == wanted)
            .map(|a| a.alias.clone())
    }

    /// Root path registered for `alias`
    pub fn path_for(&self, alias: &str) -> Option<String> {
        self.aliases
            .read()
            .iter()
            .find(|a| a.alias.eq_ignore_ascii_case(alias))
            .map(|a| a.path.clone())
    }

    /// Existing alias for `path`, or register the next number for it
    pub async fn add_or_create(&self, path: &Path) -> IndexingResult<String> {
        if let Some(alias) = self.alias_for(path) {
            return Ok(alias);
        }

        let normalized = normalize_path(path).to_string_lossy().into_owned();
        let next = self.aliases.read().len() + 1;
        let document = AliasDocument::new(next.to_string(), normalized.clone());
        info!(alias = %document.alias, path = %normalized, "Adding alias");

        let source = serde_json::to_value(&document)
            .map_err(|e| IndexingError::Alias(format!("Failed encoding alias: {}", e)))?;
        self.engine
            .put_document(&self.index, &document.alias, &source, PutOptions::refreshed())
            .await?;
        self.load().await?;

        self.alias_for(path).ok_or_else(|| {
            IndexingError::Alias(format!("Failed finding just added alias for '{}'", normalized))
        })
    }

    /// Absolute filesystem path of a document id
    pub fn to_full_path(&self, aliased: &str) -> IndexingResult<PathBuf> {
        let (alias, rest) = split_aliased_path(aliased)
            .ok_or_else(|| IndexingError::Alias(format!("Can't find alias token: '{}'", aliased)))?;
        let root = self
            .path_for(alias)
            .ok_or_else(|| IndexingError::Alias(format!("Unknown alias '{}' in '{}'", alias, aliased)))?;

        Ok(rest
            .split('\\')
            .filter(|part| !part.is_empty())
            .fold(PathBuf::from(root), |path, part| path.join(part)))
    }
}
