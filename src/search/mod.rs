//! Query and facet compilation plus the search orchestrator.
//!
//! ```text
//! SearchParams ──parse──▶ SearchOptions
//!                              │
//!          QueryNode ◀── apply_drilldown ── DrilldownFilter
//!              │
//!          SearchRequest (+ Aggregations, sort, paging, exact totals)
//!              │
//!          SearchEngine::search
//!              │
//!          SearchResults (hits, total, categories, field values)
//! ```

mod drilldown;
mod error;
mod facets;
mod fields;
mod options;
mod query;
mod results;
mod service;

pub use drilldown::{apply_drilldown, DrilldownField, DrilldownFilter};
pub use error::{SearchError, SearchResult};
pub use facets::{
    build_aggregations, parse_categories, parse_field_values, Aggregation, CategoryDetail,
    CategoryOptions, CategoryResult, FieldValues, ValueCount, DEFAULT_CATEGORY_LIMIT,
};
pub use fields::{index_field, Hierarchy, DEFAULT_SEARCH_FIELDS, LOCATION_FIELD};
pub use options::{SearchOptions, SearchParams, DEFAULT_SEARCH_COUNT, MAX_SEARCH_COUNT};
pub use query::{BoolQuery, QueryNode, RangeOp, SearchRequest, SortClause, SortOrder};
pub use results::{
    group_hits, is_known_property, AvailableDay, ByDayResults, GroupBy, HitGroup, SearchHit,
    SearchResults,
};
pub use service::{SearchService, DEFAULT_NEARBY_RADIUS_KM, MAX_NEARBY_RADIUS_KM};
