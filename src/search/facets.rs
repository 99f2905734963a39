//! Facet compilation: nested terms aggregations out, facet trees back in

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::fields::{index_field, Hierarchy};

/// Prefix of aggregation names that carry field-value pickers
const FIELD_VALUES_PREFIX: &str = "fieldvalues:";

/// Default bucket count for a requested category
pub const DEFAULT_CATEGORY_LIMIT: usize = 10;

/// Bucket limits per facet category; zero omits the category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOptions {
    pub keywords: usize,
    pub tags: usize,
    pub placename: usize,
    pub date: usize,
}

impl CategoryOptions {
    pub fn is_empty(&self) -> bool {
        self.keywords == 0 && self.tags == 0 && self.placename == 0 && self.date == 0
    }
}

/// One terms aggregation, optionally with a single nested level
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Name in the request and response
    pub name: String,
    /// User-facing field the buckets belong to
    pub label: String,
    /// Indexed field the buckets are computed on
    pub field: String,
    pub size: usize,
    pub child: Option<Box<Aggregation>>,
}

impl Aggregation {
    pub fn terms(name: impl Into<String>, label: impl Into<String>, size: usize) -> Self {
        let label = label.into();
        Self {
            name: name.into(),
            field: index_field(&label),
            label,
            size,
            child: None,
        }
    }

    /// Nested aggregation mirroring a hierarchy, outermost level first
    pub fn hierarchy(hierarchy: Hierarchy, size: usize) -> Self {
        let levels = hierarchy.levels();
        let mut child: Option<Box<Aggregation>> = None;
        for level in levels.iter().skip(1).rev() {
            let mut agg = Aggregation::terms(*level, *level, size);
            agg.child = child.take();
            child = Some(Box::new(agg));
        }

        let mut root = Aggregation::terms(hierarchy.to_string(), levels[0], size);
        root.child = child;
        root
    }

    /// Flat aggregation backing a field-value picker
    pub fn field_values(field: &str, size: usize) -> Self {
        Aggregation::terms(format!("{}{}", FIELD_VALUES_PREFIX, field), field, size)
    }

    pub fn depth(&self) -> usize {
        1 + self.child.as_ref().map(|c| c.depth()).unwrap_or(0)
    }

    fn is_field_values(&self) -> bool {
        self.name.starts_with(FIELD_VALUES_PREFIX)
    }
}

impl Serialize for Aggregation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("terms", &json!({"field": self.field, "size": self.size}))?;
        if let Some(child) = &self.child {
            let aggs: BTreeMap<&str, &Aggregation> =
                [(child.name.as_str(), child.as_ref())].into_iter().collect();
            map.serialize_entry("aggs", &aggs)?;
        }
        map.end()
    }
}

/// Aggregations for the requested categories and field-value pickers
pub fn build_aggregations(
    categories: &CategoryOptions,
    field_values: &[String],
    field_values_size: usize,
) -> Vec<Aggregation> {
    let mut aggs = Vec::new();
    if categories.keywords > 0 {
        aggs.push(Aggregation::terms("keywords", "keywords", categories.keywords));
    }
    if categories.tags > 0 {
        aggs.push(Aggregation::terms("tags", "tags", categories.tags));
    }
    if categories.placename > 0 {
        aggs.push(Aggregation::hierarchy(Hierarchy::Location, categories.placename));
    }
    if categories.date > 0 {
        aggs.push(Aggregation::hierarchy(Hierarchy::Date, categories.date));
    }
    for field in field_values {
        aggs.push(Aggregation::field_values(field, field_values_size));
    }
    aggs
}

/// One facet category in a search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResult {
    /// Category name: keywords, tags, placename or date
    pub field: String,
    pub details: Vec<CategoryDetail>,
}

/// A counted value, possibly with the next hierarchy level below it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDetail {
    pub value: String,
    pub count: u64,
    /// User-facing field that produced this level
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<CategoryDetail>>,
}

/// Values and counts of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValues {
    pub name: String,
    pub values: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

fn bucket_key(bucket: &Value) -> Option<String> {
    if let Some(text) = bucket.get("key_as_string").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    match bucket.get("key")? {
        Value::String(key) => Some(key.clone()),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn buckets<'a>(response: &'a Value, name: &str) -> impl Iterator<Item = &'a Value> {
    response
        .get(name)
        .and_then(|agg| agg.get("buckets"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Parse the buckets of `agg` found under `response`, dropping zero-count nodes
fn parse_level(agg: &Aggregation, response: &Value) -> Vec<CategoryDetail> {
    buckets(response, &agg.name)
        .filter_map(|bucket| {
            let count = bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0);
            if count == 0 {
                return None;
            }
            let value = bucket_key(bucket)?;
            let details = agg
                .child
                .as_ref()
                .map(|child| parse_level(child, bucket))
                .filter(|children| !children.is_empty());

            Some(CategoryDetail {
                value,
                count,
                field: agg.label.clone(),
                details,
            })
        })
        .collect()
}

/// Map an aggregation response back onto the requested categories
pub fn parse_categories(requested: &[Aggregation], response: &Value) -> Vec<CategoryResult> {
    requested
        .iter()
        .filter(|agg| !agg.is_field_values())
        .filter(|agg| response.get(&agg.name).is_some())
        .map(|agg| CategoryResult {
            field: agg.name.clone(),
            details: parse_level(agg, response),
        })
        .filter(|category| !category.details.is_empty())
        .collect()
}

/// Map field-value aggregations back, sorted by field name
pub fn parse_field_values(requested: &[Aggregation], response: &Value) -> Vec<FieldValues> {
    let mut fields: Vec<FieldValues> = requested
        .iter()
        .filter(|agg| agg.is_field_values())
        .map(|agg| FieldValues {
            name: agg.label.clone(),
            values: parse_level(agg, response)
                .into_iter()
                .map(|detail| ValueCount {
                    value: detail.value,
                    count: detail.count,
                })
                .collect(),
        })
        .collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_hierarchy_nests_four_levels() {
        let agg = Aggregation::hierarchy(Hierarchy::Location, 10);
        assert_eq!(agg.depth(), 4);

        let json = serde_json::to_value(&agg).unwrap();
        assert_eq!(json["terms"]["field"], "locationCountryName.keyword");
        assert_eq!(json["aggs"]["stateName"]["terms"]["field"], "locationStateName.keyword");
        assert_eq!(
            json["aggs"]["stateName"]["aggs"]["cityName"]["aggs"]["siteName"]["terms"]["size"],
            10
        );
    }

    #[test]
    fn test_zero_limit_category_omitted() {
        let options = CategoryOptions {
            keywords: 0,
            tags: 5,
            placename: 0,
            date: 10,
        };
        let aggs = build_aggregations(&options, &[], 0);
        let names: Vec<_> = aggs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["tags", "date"]);
    }

    #[test]
    fn test_zero_count_buckets_pruned() {
        let requested = vec![Aggregation::hierarchy(Hierarchy::Location, 10)];
        let response = json!({
            "placename": {"buckets": [
                {"key": "Canada", "doc_count": 0, "stateName": {"buckets": [
                    {"key": "BC", "doc_count": 0}
                ]}},
                {"key": "USA", "doc_count": 5, "stateName": {"buckets": [
                    {"key": "WA", "doc_count": 5},
                    {"key": "OR", "doc_count": 0}
                ]}}
            ]}
        });

        let categories = parse_categories(&requested, &response);
        assert_eq!(categories.len(), 1);
        let details = &categories[0].details;
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].value, "USA");
        assert_eq!(details[0].field, "countryName");

        let states = details[0].details.as_ref().unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].value, "WA");
        assert_eq!(states[0].field, "stateName");
        assert!(states[0].details.is_none());
    }

    #[test]
    fn test_numeric_keys_become_strings() {
        let requested = vec![Aggregation::hierarchy(Hierarchy::Date, 10)];
        let response = json!({
            "date": {"buckets": [
                {"key": 2016, "doc_count": 3, "dateMonth": {"buckets": [
                    {"key": "December", "doc_count": 3}
                ]}}
            ]}
        });
        let categories = parse_categories(&requested, &response);
        assert_eq!(categories[0].field, "date");
        assert_eq!(categories[0].details[0].value, "2016");
        assert_eq!(
            categories[0].details[0].details.as_ref().unwrap()[0].field,
            "dateMonth"
        );
    }

    #[test]
    fn test_field_values_sorted_by_name() {
        let requested = build_aggregations(
            &CategoryOptions::default(),
            &["tags".to_string(), "cameraMake".to_string()],
            20,
        );
        let response = json!({
            "fieldvalues:tags": {"buckets": [{"key": "sky", "doc_count": 2}]},
            "fieldvalues:cameraMake": {"buckets": [
                {"key": "Canon", "doc_count": 4},
                {"key": "Nikon", "doc_count": 0}
            ]}
        });
        let values = parse_field_values(&requested, &response);
        assert_eq!(values[0].name, "cameraMake");
        assert_eq!(values[0].values.len(), 1);
        assert_eq!(values[1].name, "tags");
        assert!(parse_categories(&requested, &response).is_empty());
    }
}
