use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maps a short numeric alias to an absolute filesystem root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasDocument {
    pub alias: String,

    pub path: String,

    pub date_added: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_last_indexed: Option<DateTime<Utc>>,
}

impl AliasDocument {
    pub fn new(alias: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            path: path.into(),
            date_added: Utc::now(),
            date_last_indexed: None,
        }
    }
}

/// Document id for a file below an alias root.
///
/// Separators are always stored as `\` so ids are identical across platforms.
pub fn aliased_path(alias: &str, relative_path: &str) -> String {
    let relative = relative_path
        .trim_start_matches(['/', '\\'])
        .replace('/', "\\");
    format!("{}\\{}", alias, relative)
}

/// Split an id into its alias and the `\`-separated remainder
pub fn split_aliased_path(aliased: &str) -> Option<(&str, &str)> {
    let (alias, rest) = aliased.split_once('\\')?;
    if alias.is_empty() || rest.is_empty() {
        return None;
    }
    Some((alias, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliased_path_uses_backslashes() {
        assert_eq!(aliased_path("1", "2016/12/beach.jpg"), "1\\2016\\12\\beach.jpg");
        assert_eq!(aliased_path("3", "/a.jpg"), "3\\a.jpg");
    }

    #[test]
    fn test_split_aliased_path() {
        assert_eq!(
            split_aliased_path("1\\2016\\beach.jpg"),
            Some(("1", "2016\\beach.jpg"))
        );
        assert_eq!(split_aliased_path("noalias"), None);
        assert_eq!(split_aliased_path("\\x.jpg"), None);
    }
}
