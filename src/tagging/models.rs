use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// External classification service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Azure,
    Clarifai,
}

impl ProviderKind {
    /// Media document field holding this provider's tags
    pub fn document_field(&self) -> &'static str {
        match self {
            ProviderKind::Azure => "azureTags",
            ProviderKind::Clarifai => "clarifaiTags",
        }
    }
}

/// One document waiting for provider tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagWorkItem {
    /// Media document id
    pub id: String,

    /// Source file on disk
    pub full_path: PathBuf,

    pub has_azure_tags: bool,

    pub has_clarifai_tags: bool,
}

impl TagWorkItem {
    pub fn new(
        id: impl Into<String>,
        full_path: impl Into<PathBuf>,
        has_azure_tags: bool,
        has_clarifai_tags: bool,
    ) -> Self {
        Self {
            id: id.into(),
            full_path: full_path.into(),
            has_azure_tags,
            has_clarifai_tags,
        }
    }

    /// Whether the stored document already carries this provider's field
    pub fn has_tags(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Azure => self.has_azure_tags,
            ProviderKind::Clarifai => self.has_clarifai_tags,
        }
    }

    pub fn is_video(&self) -> bool {
        self.full_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "mp4" | "m4v"))
            .unwrap_or(false)
    }
}
