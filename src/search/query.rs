//! Query tree and request body model

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{json, Value};
use strum::{Display, EnumString};

use super::facets::Aggregation;

/// One node of a search query tree.
///
/// Serialized as the engine's `{"<operator>": {...}}` form.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    MatchAll,
    Term {
        field: String,
        value: Value,
    },
    QueryString {
        query: String,
        fields: Vec<String>,
    },
    Range {
        field: String,
        bounds: Vec<(RangeOp, Value)>,
    },
    GeoDistance {
        field: String,
        lat: f64,
        lon: f64,
        distance_km: f64,
    },
    Bool(BoolQuery),
}

/// Boolean combination; empty clause lists are omitted when serialized
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<QueryNode>,
    pub should: Vec<QueryNode>,
}

/// Range comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum RangeOp {
    #[strum(serialize = "gt", serialize = ">")]
    Gt,
    #[strum(serialize = "gte", serialize = ">=")]
    Gte,
    #[strum(serialize = "lt", serialize = "<")]
    Lt,
    #[strum(serialize = "lte", serialize = "<=")]
    Lte,
}

impl RangeOp {
    pub fn key(&self) -> &'static str {
        match self {
            RangeOp::Gt => "gt",
            RangeOp::Gte => "gte",
            RangeOp::Lt => "lt",
            RangeOp::Lte => "lte",
        }
    }
}

impl QueryNode {
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        QueryNode::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn range(field: impl Into<String>, op: RangeOp, value: impl Into<Value>) -> Self {
        QueryNode::Range {
            field: field.into(),
            bounds: vec![(op, value.into())],
        }
    }

    pub fn must(nodes: Vec<QueryNode>) -> Self {
        QueryNode::Bool(BoolQuery {
            must: nodes,
            should: Vec::new(),
        })
    }

    pub fn should(nodes: Vec<QueryNode>) -> Self {
        QueryNode::Bool(BoolQuery {
            must: Vec::new(),
            should: nodes,
        })
    }

    /// Free-text query; empty or missing text matches everything
    pub fn text(text: Option<&str>, fields: &[&str]) -> Self {
        match text.map(str::trim).filter(|t| !t.is_empty()) {
            Some(query) => QueryNode::QueryString {
                query: query.to_string(),
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
            None => QueryNode::MatchAll,
        }
    }

    pub fn to_json(&self) -> Value {
        // Serializing a QueryNode into a Value cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for QueryNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            QueryNode::MatchAll => map.serialize_entry("match_all", &json!({}))?,
            QueryNode::Term { field, value } => {
                map.serialize_entry("term", &json!({ field: { "value": value } }))?
            }
            QueryNode::QueryString { query, fields } => map.serialize_entry(
                "query_string",
                &json!({ "query": query, "fields": fields }),
            )?,
            QueryNode::Range { field, bounds } => {
                let bounds: serde_json::Map<String, Value> = bounds
                    .iter()
                    .map(|(op, value)| (op.key().to_string(), value.clone()))
                    .collect();
                map.serialize_entry("range", &json!({ field: bounds }))?
            }
            QueryNode::GeoDistance {
                field,
                lat,
                lon,
                distance_km,
            } => map.serialize_entry(
                "geo_distance",
                &json!({
                    "distance": format!("{} km", distance_km),
                    field: { "lat": lat, "lon": lon }
                }),
            )?,
            QueryNode::Bool(bool_query) => map.serialize_entry("bool", bool_query)?,
        }
        map.end()
    }
}

impl Serialize for BoolQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.must.is_empty() {
            map.serialize_entry("must", &self.must)?;
        }
        if !self.should.is_empty() {
            map.serialize_entry("should", &self.should)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One sort key
#[derive(Debug, Clone, PartialEq)]
pub enum SortClause {
    Score,
    Field { field: String, order: SortOrder },
    GeoDistance { field: String, lat: f64, lon: f64 },
}

impl Serialize for SortClause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            SortClause::Score => map.serialize_entry("_score", &json!({"order": "desc"}))?,
            SortClause::Field { field, order } => {
                map.serialize_entry(field, &json!({"order": order.to_string()}))?
            }
            SortClause::GeoDistance { field, lat, lon } => map.serialize_entry(
                "_geo_distance",
                &json!({
                    field: { "lat": lat, "lon": lon },
                    "order": "asc",
                    "unit": "km",
                    "mode": "min"
                }),
            )?,
        }
        map.end()
    }
}

/// A complete `_search` request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: QueryNode,

    /// Always true: totals are exact, never a lower bound
    pub track_total_hits: bool,

    pub from: usize,

    pub size: usize,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortClause>,

    #[serde(rename = "aggs", skip_serializing_if = "Vec::is_empty", serialize_with = "serialize_aggs")]
    pub aggregations: Vec<Aggregation>,
}

fn serialize_aggs<S: Serializer>(aggs: &[Aggregation], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(aggs.len()))?;
    for agg in aggs {
        map.serialize_entry(&agg.name, agg)?;
    }
    map.end()
}

impl SearchRequest {
    pub fn new(query: QueryNode, from: usize, size: usize) -> Self {
        Self {
            query,
            track_total_hits: true,
            from,
            size,
            sort: Vec::new(),
            aggregations: Vec::new(),
        }
    }

    pub fn with_sort(mut self, sort: SortClause) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_aggregations(mut self, aggregations: Vec<Aggregation>) -> Self {
        self.aggregations = aggregations;
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
