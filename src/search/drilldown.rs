//! Drilldown filters and their compilation into the query tree.
//!
//! Text form: entries separated by `_`. A plain entry selects values of one
//! field (`tags:sunset,beach`); a hierarchical entry selects one path through
//! a hierarchy (`countryName:USA+stateName:WA`). Repeating a chain adds
//! another accepted path.

use super::error::{SearchError, SearchResult};
use super::fields::{index_field, Hierarchy};
use super::query::QueryNode;

const ENTRY_SEPARATOR: char = '_';
const CHAIN_SEPARATOR: char = '+';
const VALUE_SEPARATOR: char = ',';

/// Selected values of one field or hierarchy chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrilldownField {
    /// User-facing field names; more than one for a hierarchy chain
    pub fields: Vec<String>,
    /// Accepted value tuples, one value per field
    pub values: Vec<Vec<String>>,
}

impl DrilldownField {
    pub fn hierarchy(&self) -> Option<Hierarchy> {
        self.fields
            .first()
            .and_then(|field| Hierarchy::of_field(field))
            .map(|(hierarchy, _)| hierarchy)
    }

    fn key(&self) -> String {
        self.fields.join("+")
    }
}

/// Map of field (or chain) to accepted values, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrilldownFilter {
    entries: Vec<DrilldownField>,
}

impl DrilldownFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|entry| entry.values.is_empty())
    }

    pub fn entries(&self) -> &[DrilldownField] {
        &self.entries
    }

    /// Parse the `_`-separated text form
    pub fn parse(text: &str) -> SearchResult<Self> {
        let mut filter = Self::new();
        for entry in text.split(ENTRY_SEPARATOR).filter(|e| !e.trim().is_empty()) {
            if entry.contains(CHAIN_SEPARATOR) {
                let mut fields = Vec::new();
                let mut tuple = Vec::new();
                for link in entry.split(CHAIN_SEPARATOR) {
                    let (field, value) = split_pair(entry, link)?;
                    fields.push(field.to_string());
                    tuple.push(value.to_string());
                }
                filter.add_tuple(fields, tuple)?;
            } else {
                let (field, values) = split_pair(entry, entry)?;
                let values = values
                    .split(VALUE_SEPARATOR)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect();
                filter.add(field, values)?;
            }
        }
        Ok(filter)
    }

    /// Select values of one field. A field of a hierarchy is a one-level chain.
    pub fn add(&mut self, field: &str, values: Vec<String>) -> SearchResult<()> {
        for value in values {
            self.add_tuple(vec![field.to_string()], vec![value])?;
        }
        Ok(())
    }

    /// Select one value tuple of a (possibly hierarchical) chain
    pub fn add_tuple(&mut self, fields: Vec<String>, tuple: Vec<String>) -> SearchResult<()> {
        validate_chain(&fields)?;
        if fields.len() != tuple.len() {
            return Err(SearchError::InvalidHierarchy(
                fields.join("+"),
                format!("{} fields but {} values", fields.len(), tuple.len()),
            ));
        }

        let key = fields.join("+");
        match self.entries.iter_mut().find(|entry| entry.key() == key) {
            Some(entry) => {
                if !entry.values.contains(&tuple) {
                    entry.values.push(tuple);
                }
            }
            None => self.entries.push(DrilldownField {
                fields,
                values: vec![tuple],
            }),
        }
        Ok(())
    }
}

fn split_pair<'a>(entry: &str, pair: &'a str) -> SearchResult<(&'a str, &'a str)> {
    let invalid = |reason: &str| SearchError::InvalidDrilldown {
        entry: entry.to_string(),
        reason: reason.to_string(),
    };
    let (field, value) = pair.split_once(':').ok_or_else(|| invalid("missing ':'"))?;
    let (field, value) = (field.trim(), value.trim());
    if field.is_empty() {
        return Err(invalid("empty field name"));
    }
    if value.is_empty() {
        return Err(invalid("empty value"));
    }
    Ok((field, value))
}

/// A chain must walk consecutive levels of a single hierarchy
fn validate_chain(fields: &[String]) -> SearchResult<()> {
    if fields.len() <= 1 {
        return Ok(());
    }

    let chain = fields.join("+");
    let mut previous: Option<(Hierarchy, usize)> = None;
    for field in fields {
        let (hierarchy, level) = Hierarchy::of_field(field).ok_or_else(|| {
            SearchError::InvalidHierarchy(chain.clone(), format!("'{}' is not a hierarchy level", field))
        })?;
        if let Some((prev_hierarchy, prev_level)) = previous {
            if prev_hierarchy != hierarchy {
                return Err(SearchError::InvalidHierarchy(
                    chain,
                    "mixes location and date levels".to_string(),
                ));
            }
            if level != prev_level + 1 {
                return Err(SearchError::InvalidHierarchy(
                    chain,
                    format!("'{}' does not follow the previous level", field),
                ));
            }
        }
        previous = Some((hierarchy, level));
    }
    Ok(())
}

/// Wrap `base` with the drilldown selections.
///
/// Plain fields become one `should` clause each, ANDed with the base. All
/// selections of one hierarchy are collected into a single `should` of
/// per-tuple `must` clauses. An empty filter returns `base` untouched.
pub fn apply_drilldown(base: QueryNode, filter: &DrilldownFilter) -> QueryNode {
    if filter.is_empty() {
        return base;
    }

    let mut must = vec![base];
    // Position of each hierarchy's group clause inside `must`
    let mut groups: Vec<(Hierarchy, usize)> = Vec::new();

    for entry in filter.entries().iter().filter(|e| !e.values.is_empty()) {
        match entry.hierarchy() {
            None => {
                let field = entry.fields.first().map(String::as_str).unwrap_or_default();
                let terms = entry
                    .values
                    .iter()
                    .filter_map(|tuple| tuple.first())
                    .map(|value| QueryNode::term(index_field(field), value.as_str()))
                    .collect();
                must.push(QueryNode::should(terms));
            }
            Some(hierarchy) => {
                let tuples: Vec<QueryNode> = entry
                    .values
                    .iter()
                    .map(|tuple| {
                        QueryNode::must(
                            entry
                                .fields
                                .iter()
                                .zip(tuple)
                                .map(|(field, value)| QueryNode::term(index_field(field), value.as_str()))
                                .collect(),
                        )
                    })
                    .collect();

                let position = match groups.iter().find(|(h, _)| *h == hierarchy) {
                    Some((_, position)) => *position,
                    None => {
                        must.push(QueryNode::should(Vec::new()));
                        groups.push((hierarchy, must.len() - 1));
                        must.len() - 1
                    }
                };
                if let QueryNode::Bool(group) = &mut must[position] {
                    group.should.extend(tuples);
                }
            }
        }
    }

    QueryNode::must(must)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_and_chain_entries() {
        let filter =
            DrilldownFilter::parse("tags:sunset,beach_dateYear:2016+dateMonth:December").unwrap();
        let entries = filter.entries();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].fields, vec!["tags"]);
        assert_eq!(entries[0].values, vec![vec!["sunset"], vec!["beach"]]);
        assert_eq!(entries[1].fields, vec!["dateYear", "dateMonth"]);
        assert_eq!(entries[1].values, vec![vec!["2016", "December"]]);
    }

    #[test]
    fn test_repeated_chain_accumulates_tuples() {
        let filter = DrilldownFilter::parse(
            "countryName:USA+stateName:WA_countryName:USA+stateName:OR_countryName:USA+stateName:WA",
        )
        .unwrap();
        assert_eq!(filter.entries().len(), 1);
        assert_eq!(filter.entries()[0].values.len(), 2);
    }

    #[test]
    fn test_parse_rejects_malformed_entries() {
        assert!(matches!(
            DrilldownFilter::parse("tags"),
            Err(SearchError::InvalidDrilldown { .. })
        ));
        assert!(matches!(
            DrilldownFilter::parse(":beach"),
            Err(SearchError::InvalidDrilldown { .. })
        ));
        assert!(matches!(
            DrilldownFilter::parse("tags:"),
            Err(SearchError::InvalidDrilldown { .. })
        ));
    }

    #[test]
    fn test_invalid_chains_rejected() {
        // skips stateName
        assert!(matches!(
            DrilldownFilter::parse("countryName:USA+cityName:Seattle"),
            Err(SearchError::InvalidHierarchy(..))
        ));
        // mixes hierarchies
        assert!(matches!(
            DrilldownFilter::parse("countryName:USA+dateMonth:May"),
            Err(SearchError::InvalidHierarchy(..))
        ));
        // unknown fields cannot be chained
        assert!(matches!(
            DrilldownFilter::parse("tags:a+keywords:b"),
            Err(SearchError::InvalidHierarchy(..))
        ));
        // reversed order
        assert!(matches!(
            DrilldownFilter::parse("stateName:WA+countryName:USA"),
            Err(SearchError::InvalidHierarchy(..))
        ));
    }

    #[test]
    fn test_empty_filter_returns_base() {
        let filter = DrilldownFilter::new();
        assert_eq!(apply_drilldown(QueryNode::MatchAll, &filter), QueryNode::MatchAll);
    }

    #[test]
    fn test_plain_field_values_are_ored() {
        let mut filter = DrilldownFilter::new();
        filter
            .add("tags", vec!["sunset".into(), "beach".into()])
            .unwrap();

        let query = apply_drilldown(QueryNode::MatchAll, &filter).to_json();
        assert_eq!(
            query,
            json!({"bool": {"must": [
                {"match_all": {}},
                {"bool": {"should": [
                    {"term": {"tags.keyword": {"value": "sunset"}}},
                    {"term": {"tags.keyword": {"value": "beach"}}}
                ]}}
            ]}})
        );
    }

    #[test]
    fn test_distinct_fields_are_anded() {
        let filter = DrilldownFilter::parse("tags:a,b_keywords:c").unwrap();
        let query = apply_drilldown(QueryNode::MatchAll, &filter).to_json();

        let must = query["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 3);
        assert_eq!(must[1]["bool"]["should"].as_array().unwrap().len(), 2);
        assert_eq!(
            must[2],
            json!({"bool": {"should": [{"term": {"keywords.keyword": {"value": "c"}}}]}})
        );
    }

    #[test]
    fn test_location_levels_grouped_into_one_clause() {
        let mut filter = DrilldownFilter::new();
        filter.add("countryName", vec!["USA".into()]).unwrap();
        filter.add("stateName", vec!["WA".into()]).unwrap();

        let query = apply_drilldown(QueryNode::MatchAll, &filter).to_json();
        assert_eq!(
            query,
            json!({"bool": {"must": [
                {"match_all": {}},
                {"bool": {"should": [
                    {"bool": {"must": [{"term": {"locationCountryName.keyword": {"value": "USA"}}}]}},
                    {"bool": {"must": [{"term": {"locationStateName.keyword": {"value": "WA"}}}]}}
                ]}}
            ]}})
        );
    }

    #[test]
    fn test_sub_levels_without_country_still_grouped() {
        let filter = DrilldownFilter::parse("stateName:WA+cityName:Seattle_cityName:Portland_tags:x").unwrap();
        let query = apply_drilldown(QueryNode::MatchAll, &filter).to_json();

        assert_eq!(
            query,
            json!({"bool": {"must": [
                {"match_all": {}},
                {"bool": {"should": [
                    {"bool": {"must": [
                        {"term": {"locationStateName.keyword": {"value": "WA"}}},
                        {"term": {"locationCityName.keyword": {"value": "Seattle"}}}
                    ]}},
                    {"bool": {"must": [{"term": {"locationCityName.keyword": {"value": "Portland"}}}]}}
                ]}},
                {"bool": {"should": [{"term": {"tags.keyword": {"value": "x"}}}]}}
            ]}})
        );
    }

    #[test]
    fn test_location_and_date_groups_stay_separate() {
        let filter = DrilldownFilter::parse(
            "countryName:USA+stateName:WA_dateYear:2016_tags:snow_countryName:Canada",
        )
        .unwrap();
        let query = apply_drilldown(QueryNode::MatchAll, &filter).to_json();
        let must = query["bool"]["must"].as_array().unwrap();

        // base, location group, date group, tags
        assert_eq!(must.len(), 4);
        let location = must[1]["bool"]["should"].as_array().unwrap();
        assert_eq!(location.len(), 2);
        assert_eq!(location[0]["bool"]["must"].as_array().unwrap().len(), 2);
        assert_eq!(
            must[2]["bool"]["should"][0]["bool"]["must"][0],
            json!({"term": {"dateYear": {"value": "2016"}}})
        );
        assert_eq!(
            must[3]["bool"]["should"][0],
            json!({"term": {"tags.keyword": {"value": "snow"}}})
        );
    }

    #[test]
    fn test_unknown_single_field_is_plain_term() {
        let filter = DrilldownFilter::parse("Flavor:sweet").unwrap();
        let query = apply_drilldown(QueryNode::MatchAll, &filter).to_json();
        assert_eq!(
            query["bool"]["must"][1]["bool"]["should"][0],
            json!({"term": {"flavor": {"value": "sweet"}}})
        );
    }
}
