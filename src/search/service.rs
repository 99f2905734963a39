//! Search orchestration: compile, execute one round trip, map back

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, instrument};

use super::drilldown::apply_drilldown;
use super::error::{SearchError, SearchResult};
use super::facets::{build_aggregations, parse_categories, parse_field_values};
use super::fields::{index_field, DEFAULT_SEARCH_FIELDS, LOCATION_FIELD};
use super::options::SearchOptions;
use super::query::{QueryNode, RangeOp, SearchRequest, SortClause, SortOrder};
use super::results::{AvailableDay, ByDayResults, SearchHit, SearchResults};
use crate::config::IndexNames;
use crate::elastic::{EngineError, SearchEngine, SearchResponse};
use crate::metrics::{SEARCH_DURATION_SECONDS, SEARCH_REQUESTS_TOTAL};
use crate::models::{day_of_year, month_day, MediaDocument};

pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 100.0;
pub const MAX_NEARBY_RADIUS_KM: f64 = 20_000.0;

/// Runs every search variant against the media index
#[derive(Clone)]
pub struct SearchService {
    engine: Arc<dyn SearchEngine>,
    media_index: String,
}

impl SearchService {
    pub fn new(engine: Arc<dyn SearchEngine>, names: &IndexNames) -> Self {
        Self {
            engine,
            media_index: names.media.clone(),
        }
    }

    /// Free-text search with facets and drilldown; empty text matches everything
    #[instrument(skip(self, options), fields(first = options.first, count = options.count))]
    pub async fn search(&self, text: Option<&str>, options: &SearchOptions) -> SearchResult<SearchResults> {
        let base = QueryNode::text(text, &DEFAULT_SEARCH_FIELDS);
        let request = self
            .faceted_request(base, options)
            .with_sort(SortClause::Score)
            .with_sort(SortClause::Field {
                field: "dateTime".to_string(),
                order: SortOrder::Desc,
            });
        self.run("search", request).await
    }

    /// Single range comparison sorted on `sort_field`; no facets or drilldown
    pub async fn range_search(
        &self,
        field: &str,
        op: RangeOp,
        value: impl Into<Value>,
        sort_field: &str,
        order: SortOrder,
        first: usize,
        count: usize,
    ) -> SearchResult<SearchResults> {
        let request = SearchRequest::new(QueryNode::range(field, op, value), first, count).with_sort(
            SortClause::Field {
                field: sort_field.to_string(),
                order,
            },
        );
        self.run("range", request).await
    }

    /// Single field/value match; no facets or drilldown
    pub async fn term(
        &self,
        field: &str,
        value: impl Into<Value>,
        first: usize,
        count: usize,
    ) -> SearchResult<SearchResults> {
        let request = SearchRequest::new(QueryNode::term(index_field(field), value), first, count);
        self.run("term", request).await
    }

    /// Media within `radius_km` of a point, closest first.
    ///
    /// Each hit's `sort` carries its distance in km.
    pub async fn nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_km: Option<f64>,
        options: &SearchOptions,
    ) -> SearchResult<SearchResults> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(SearchError::invalid_parameter("lat", "must be between -90 and 90"));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(SearchError::invalid_parameter("lon", "must be between -180 and 180"));
        }
        let radius_km = radius_km.unwrap_or(DEFAULT_NEARBY_RADIUS_KM);
        if !(1.0..=MAX_NEARBY_RADIUS_KM).contains(&radius_km) {
            return Err(SearchError::invalid_parameter(
                "radius",
                format!("must be between 1 and {}", MAX_NEARBY_RADIUS_KM),
            ));
        }

        let base = QueryNode::GeoDistance {
            field: LOCATION_FIELD.to_string(),
            lat,
            lon,
            distance_km: radius_km,
        };
        let request = self
            .faceted_request(base, options)
            .with_sort(SortClause::GeoDistance {
                field: LOCATION_FIELD.to_string(),
                lat,
                lon,
            });
        self.run("nearby", request).await
    }

    /// Media taken on a calendar day of any year, plus the closest days before
    /// and after that have media. Both neighbours wrap around the year end.
    pub async fn by_day(&self, month: u32, day: u32, options: &SearchOptions) -> SearchResult<ByDayResults> {
        let target = day_of_year(month, day).ok_or_else(|| {
            SearchError::invalid_parameter("day", format!("{}/{} is not a calendar day", month, day))
        })?;

        let base = QueryNode::term("dayOfYear", target);
        let request = self.faceted_request(base, options).with_sort(SortClause::Field {
            field: "dateTime".to_string(),
            order: SortOrder::Desc,
        });
        let results = self.run("by_day", request).await?;

        let previous = self
            .neighbour(&[(RangeOp::Lt, SortOrder::Desc), (RangeOp::Gt, SortOrder::Desc)], target)
            .await?;
        let next = self
            .neighbour(&[(RangeOp::Gt, SortOrder::Asc), (RangeOp::Lt, SortOrder::Asc)], target)
            .await?;

        Ok(ByDayResults {
            results,
            previous_available_by_day: previous,
            next_available_by_day: next,
        })
    }

    /// Look up a single document by id
    pub async fn get_by_id(&self, id: &str) -> SearchResult<Option<MediaDocument>> {
        match self.engine.get_document(&self.media_index, id).await? {
            Some(stored) => Ok(Some(decode_media(stored.source)?)),
            None => Ok(None),
        }
    }

    /// First day found by trying each (comparison, order) in turn
    async fn neighbour(&self, attempts: &[(RangeOp, SortOrder)], target: u32) -> SearchResult<Option<AvailableDay>> {
        for (op, order) in attempts {
            let found = self
                .range_search("dayOfYear", *op, target, "dayOfYear", *order, 0, 1)
                .await?;
            let day = found
                .hits
                .first()
                .and_then(|hit| hit.media.day_of_year)
                .and_then(month_day);
            if let Some((month, day)) = day {
                return Ok(Some(AvailableDay { month, day }));
            }
        }
        Ok(None)
    }

    fn faceted_request(&self, base: QueryNode, options: &SearchOptions) -> SearchRequest {
        let query = apply_drilldown(base, &options.drilldown);
        let aggregations =
            build_aggregations(&options.categories, &options.field_values, options.field_values_count);
        SearchRequest::new(query, options.first, options.count).with_aggregations(aggregations)
    }

    async fn run(&self, kind: &str, request: SearchRequest) -> SearchResult<SearchResults> {
        SEARCH_REQUESTS_TOTAL.with_label_values(&[kind]).inc();
        let started = Instant::now();

        let body = request.to_json();
        debug!(kind = kind, request = %body, "Executing search");
        let response = self.engine.search(&self.media_index, &body).await;
        SEARCH_DURATION_SECONDS
            .with_label_values(&[kind])
            .observe(started.elapsed().as_secs_f64());

        map_response(&request, response?)
    }
}

fn decode_media(source: Value) -> Result<MediaDocument, EngineError> {
    serde_json::from_value(source).map_err(|e| EngineError::Decode(format!("media document: {}", e)))
}

fn map_response(request: &SearchRequest, response: SearchResponse) -> SearchResult<SearchResults> {
    let hits = response
        .hits
        .into_iter()
        .map(|hit| {
            Ok(SearchHit {
                media: decode_media(hit.source)?,
                sort: hit.sort.and_then(|values| values.into_iter().next()),
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let (categories, field_values) = match &response.aggregations {
        Some(aggs) => (
            parse_categories(&request.aggregations, aggs),
            parse_field_values(&request.aggregations, aggs),
        ),
        None => (Vec::new(), Vec::new()),
    };

    Ok(SearchResults {
        total: response.total,
        hits,
        categories,
        field_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::InMemoryEngine;
    use serde_json::json;

    fn service_with(docs: &[(&str, u32)]) -> (SearchService, InMemoryEngine) {
        let engine = InMemoryEngine::new();
        for (path, doy) in docs {
            engine.insert("fp-media", path, json!({"path": path, "signature": "s", "dayOfYear": doy}));
        }
        let service = SearchService::new(Arc::new(engine.clone()), &IndexNames::default());
        (service, engine)
    }

    #[tokio::test]
    async fn test_search_total_is_exact() {
        let docs: Vec<(String, u32)> = (0..37).map(|i| (format!("1\\{}.jpg", i), 1)).collect();
        let refs: Vec<(&str, u32)> = docs.iter().map(|(p, d)| (p.as_str(), *d)).collect();
        let (service, _) = service_with(&refs);

        let results = service.search(None, &SearchOptions::default()).await.unwrap();
        assert_eq!(results.total, 37);
        assert_eq!(results.hits.len(), 20);
    }

    #[tokio::test]
    async fn test_by_day_finds_neighbours() {
        let (service, _) = service_with(&[("1\\a.jpg", 50), ("1\\b.jpg", 61), ("1\\c.jpg", 100)]);

        let results = service.by_day(3, 1, &SearchOptions::default()).await.unwrap();
        assert_eq!(results.results.total, 1);
        assert_eq!(results.previous_available_by_day, Some(AvailableDay { month: 2, day: 19 }));
        assert_eq!(results.next_available_by_day, Some(AvailableDay { month: 4, day: 9 }));
    }

    #[tokio::test]
    async fn test_by_day_wraps_around_year_end() {
        let (service, _) = service_with(&[("1\\a.jpg", 1), ("1\\b.jpg", 360)]);

        let results = service.by_day(12, 25, &SearchOptions::default()).await.unwrap();
        assert_eq!(results.previous_available_by_day, Some(AvailableDay { month: 1, day: 1 }));
        assert_eq!(results.next_available_by_day, Some(AvailableDay { month: 1, day: 1 }));
    }

    #[tokio::test]
    async fn test_by_day_rejects_impossible_date() {
        let (service, engine) = service_with(&[]);
        let err = service.by_day(2, 30, &SearchOptions::default()).await.unwrap_err();
        assert!(err.is_compile_error());
        assert_eq!(engine.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_nearby_radius_validated_before_io() {
        let (service, engine) = service_with(&[]);
        let err = service
            .nearby(47.6, -122.3, Some(20_001.0), &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidParameter { .. }));
        assert_eq!(engine.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let (service, _) = service_with(&[("1\\a.jpg", 5)]);
        let media = service.get_by_id("1\\a.jpg").await.unwrap().unwrap();
        assert_eq!(media.day_of_year, Some(5));
        assert!(service.get_by_id("1\\missing.jpg").await.unwrap().is_none());
    }
}
