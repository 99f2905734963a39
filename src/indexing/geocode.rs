//! Reverse geocoding of document locations into placename fields

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{IndexingError, IndexingResult};
use super::failures::FailureLog;
use crate::models::{GeoLocation, MediaDocument};

/// Place returned for one location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placename {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub full_description: String,
    #[serde(default)]
    pub sites: Option<Vec<String>>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

/// Per-location result: a placename or the service's error message
pub type PlaceLookup = Result<Placename, String>;

/// Bulk reverse geocoder; answers one entry per requested location, in order
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn lookup(&self, locations: &[GeoLocation]) -> IndexingResult<Vec<PlaceLookup>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkRequest {
    items: Vec<BulkItemRequest>,
    cache_only: bool,
    country: bool,
}

#[derive(Debug, Serialize)]
struct BulkItemRequest {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkResponse {
    #[serde(default)]
    had_errors: bool,
    items: Vec<BulkItemResponse>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResponse {
    placename: Option<Placename>,
    error: Option<String>,
}

/// HTTP client for the reverse geocoding service's bulk endpoint
#[derive(Clone)]
pub struct HttpGeocoder {
    client: Client,
    base_url: String,
}

impl HttpGeocoder {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> IndexingResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for HttpGeocoder {
    async fn lookup(&self, locations: &[GeoLocation]) -> IndexingResult<Vec<PlaceLookup>> {
        let request = BulkRequest {
            items: locations
                .iter()
                .map(|l| BulkItemRequest { lat: l.lat, lon: l.lon })
                .collect(),
            cache_only: true,
            country: true,
        };

        let url = format!("{}/api/v1/bulk", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(IndexingError::Geocode(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let parsed: BulkResponse = serde_json::from_str(&body)
            .map_err(|e| IndexingError::Geocode(format!("Invalid response: {}", e)))?;
        if parsed.had_errors {
            debug!(url = %url, "Reverse geocoding reported item errors");
        }

        Ok(parsed
            .items
            .into_iter()
            .map(|item| match (item.placename, item.error) {
                (_, Some(error)) => Err(error),
                (Some(placename), None) => Ok(placename),
                (None, None) => Err("Neither error nor placename set".to_string()),
            })
            .collect())
    }
}

/// Copy a placename into the location fields of a document
pub fn apply_placename(media: &mut MediaDocument, place: &Placename) {
    media.location_country_name = place.country_name.clone();
    media.location_country_code = place.country_code.clone();
    media.location_state_name = place.state.clone();
    media.location_city_name = place.city.clone();
    media.location_site_name = place.sites.as_ref().map(|sites| sites.join(", "));

    let hierarchical = [
        &media.location_site_name,
        &media.location_city_name,
        &media.location_state_name,
        &media.location_country_name,
    ]
    .iter()
    .filter_map(|part| part.as_deref())
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ");

    media.location_hierarchical_name = Some(hierarchical.clone());
    media.location_place_name = Some(hierarchical.clone());
    media.location_display_name = Some(hierarchical);
}

/// Fill placename fields for every document with a location; failures are recorded, never fatal
pub async fn lookup_names(media: &mut [MediaDocument], geocoder: &dyn ReverseGeocoder, failures: &FailureLog) {
    let located: Vec<usize> = media
        .iter()
        .enumerate()
        .filter(|(_, m)| m.location.is_some())
        .map(|(i, _)| i)
        .collect();
    if located.is_empty() {
        return;
    }

    let locations: Vec<GeoLocation> = located.iter().filter_map(|i| media[*i].location).collect();
    let results = match geocoder.lookup(&locations).await {
        Ok(results) => results,
        Err(e) => {
            failures.append(format!("Reverse geocoding failed for {}: {}", media[located[0]].path, e));
            return;
        }
    };
    if results.len() != located.len() {
        warn!(expected = located.len(), received = results.len(), "Reverse geocoding item count mismatch");
    }

    for (index, result) in located.into_iter().zip(results) {
        match result {
            Ok(place) => apply_placename(&mut media[index], &place),
            Err(error) => failures.append(format!(
                "Reverse geocoding returned an error for {}: {}",
                media[index].path, error
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGeocoder(Vec<PlaceLookup>);

    #[async_trait]
    impl ReverseGeocoder for FixedGeocoder {
        async fn lookup(&self, _locations: &[GeoLocation]) -> IndexingResult<Vec<PlaceLookup>> {
            Ok(self.0.clone())
        }
    }

    fn located(path: &str) -> MediaDocument {
        let mut media = MediaDocument::new(path, "s");
        media.location = Some(GeoLocation::new(47.6, -122.3));
        media
    }

    #[test]
    fn test_hierarchical_name_skips_empty_parts() {
        let mut media = located("1\\a.jpg");
        apply_placename(
            &mut media,
            &Placename {
                sites: Some(vec!["Pike Place".into(), "Market".into()]),
                city: Some("Seattle".into()),
                state: Some(String::new()),
                country_name: Some("United States".into()),
                country_code: Some("US".into()),
                ..Default::default()
            },
        );

        assert_eq!(media.location_site_name.as_deref(), Some("Pike Place, Market"));
        assert_eq!(
            media.location_hierarchical_name.as_deref(),
            Some("Pike Place, Market, Seattle, United States")
        );
        assert_eq!(media.location_display_name, media.location_place_name);
    }

    #[tokio::test]
    async fn test_lookup_skips_unlocated_and_records_item_errors() {
        let mut media = vec![located("1\\a.jpg"), MediaDocument::new("1\\b.jpg", "s"), located("1\\c.jpg")];
        let geocoder = FixedGeocoder(vec![
            Ok(Placename {
                city: Some("Seattle".into()),
                ..Default::default()
            }),
            Err("no data".into()),
        ]);
        let failures = FailureLog::new();

        lookup_names(&mut media, &geocoder, &failures).await;

        assert_eq!(media[0].location_city_name.as_deref(), Some("Seattle"));
        assert!(media[1].location_hierarchical_name.is_none());
        assert!(media[2].location_city_name.is_none());
        let recorded = failures.drain();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].contains("1\\c.jpg"));
    }
}
