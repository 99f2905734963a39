//! Per-request search options

use serde::{Deserialize, Serialize};

use super::drilldown::DrilldownFilter;
use super::error::{SearchError, SearchResult};
use super::facets::{CategoryOptions, DEFAULT_CATEGORY_LIMIT};
use super::results::is_known_property;

pub const DEFAULT_SEARCH_COUNT: usize = 20;
pub const MAX_SEARCH_COUNT: usize = 100;

/// Raw request parameters as they arrive from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    /// 1-based index of the first result
    pub first: Option<i64>,
    pub count: Option<i64>,
    /// Comma separated output properties
    pub properties: Option<String>,
    /// Comma separated facet categories
    pub categories: Option<String>,
    /// `_`-separated drilldown selections
    pub drilldown: Option<String>,
    /// Comma separated fields to return value counts for
    pub field_values: Option<String>,
    /// Bucket count per field-value picker
    pub field_values_count: Option<usize>,
}

/// Validated options of one search request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Zero-based offset of the first hit
    pub first: usize,
    pub count: usize,
    pub properties: Vec<String>,
    pub categories: CategoryOptions,
    pub drilldown: DrilldownFilter,
    pub field_values: Vec<String>,
    pub field_values_count: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            first: 0,
            count: DEFAULT_SEARCH_COUNT,
            properties: vec!["id".to_string()],
            categories: CategoryOptions::default(),
            drilldown: DrilldownFilter::default(),
            field_values: Vec::new(),
            field_values_count: DEFAULT_CATEGORY_LIMIT,
        }
    }
}

fn comma_list(text: Option<&str>) -> Vec<String> {
    text.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl SearchOptions {
    /// Validate raw parameters; every failure is a compile error raised before any I/O
    pub fn parse(params: &SearchParams) -> SearchResult<Self> {
        let first = params.first.unwrap_or(1);
        if first < 1 {
            return Err(SearchError::invalid_parameter("first", "must be at least 1"));
        }

        let count = params.count.unwrap_or(DEFAULT_SEARCH_COUNT as i64);
        if count < 1 || count > MAX_SEARCH_COUNT as i64 {
            return Err(SearchError::invalid_parameter(
                "count",
                format!("must be between 1 and {}", MAX_SEARCH_COUNT),
            ));
        }

        let mut properties = comma_list(params.properties.as_deref());
        if properties.is_empty() {
            properties.push("id".to_string());
        }
        if let Some(unknown) = properties.iter().find(|p| !is_known_property(p)) {
            return Err(SearchError::UnknownProperty(unknown.clone()));
        }

        let mut categories = CategoryOptions::default();
        for category in comma_list(params.categories.as_deref()) {
            match category.as_str() {
                "keywords" => categories.keywords = DEFAULT_CATEGORY_LIMIT,
                "tags" => categories.tags = DEFAULT_CATEGORY_LIMIT,
                "placename" => categories.placename = DEFAULT_CATEGORY_LIMIT,
                "date" => categories.date = DEFAULT_CATEGORY_LIMIT,
                _ => return Err(SearchError::UnsupportedCategory(category)),
            }
        }

        let drilldown = match params.drilldown.as_deref() {
            Some(text) => DrilldownFilter::parse(text)?,
            None => DrilldownFilter::default(),
        };

        Ok(Self {
            first: (first - 1) as usize,
            count: count as usize,
            properties,
            categories,
            drilldown,
            field_values: comma_list(params.field_values.as_deref()),
            field_values_count: params.field_values_count.unwrap_or(DEFAULT_CATEGORY_LIMIT),
        })
    }
}
