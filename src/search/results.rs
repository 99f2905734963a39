//! Domain search results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use super::facets::{CategoryResult, FieldValues};
use crate::models::MediaDocument;

/// Output properties a caller may request, lower-cased
const KNOWN_PROPERTIES: &[&str] = &[
    "aperture",
    "azuretags",
    "cameramake",
    "cameramodel",
    "city",
    "clarifaitags",
    "country",
    "createddate",
    "date",
    "distancekm",
    "durationseconds",
    "exposureprogram",
    "exposuretime",
    "exposuretimestring",
    "flash",
    "fnumber",
    "focallength",
    "height",
    "id",
    "imagename",
    "iso",
    "keywords",
    "latitude",
    "lensinfo",
    "lensmodel",
    "locationdisplayname",
    "locationname",
    "locationplacename",
    "longitude",
    "mediatype",
    "mimetype",
    "path",
    "signature",
    "tags",
    "warnings",
    "width",
];

pub fn is_known_property(name: &str) -> bool {
    KNOWN_PROPERTIES.contains(&name.to_lowercase().as_str())
}

/// One matching document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub media: MediaDocument,
    /// First sort value; the distance in km for nearby searches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
}

/// Result of any search variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    /// Exact number of matching documents
    pub total: u64,
    pub hits: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_values: Vec<FieldValues>,
}

/// Closest day with indexed media, for by-day navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableDay {
    pub month: u32,
    pub day: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByDayResults {
    #[serde(flatten)]
    pub results: SearchResults,
    pub previous_available_by_day: Option<AvailableDay>,
    pub next_available_by_day: Option<AvailableDay>,
}

fn opt<T: Serialize>(value: &Option<T>) -> Value {
    value
        .as_ref()
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}

impl SearchHit {
    pub fn media_type(&self) -> &'static str {
        match self.media.mime_type.as_deref() {
            Some(mime) if mime.starts_with("video/") => "video",
            Some(mime) if mime.starts_with("image/") => "image",
            _ => "unknown",
        }
    }

    /// Value of one output property, `Null` when unknown or absent
    pub fn property(&self, name: &str) -> Value {
        let m = &self.media;
        match name.to_lowercase().as_str() {
            "aperture" => opt(&m.aperture),
            "azuretags" => opt(&m.azure_tags),
            "cameramake" => opt(&m.camera_make),
            "cameramodel" => opt(&m.camera_model),
            "city" => opt(&m.location_city_name),
            "clarifaitags" => opt(&m.clarifai_tags),
            "country" => opt(&m.location_country_name),
            "createddate" => opt(&m.date_time),
            "date" => opt(&m.date_time.map(|dt| dt.format("%Y-%m-%d").to_string())),
            "distancekm" => self.sort.clone().unwrap_or(Value::Null),
            "durationseconds" => opt(&m.duration_seconds),
            "exposureprogram" => opt(&m.exposure_program),
            "exposuretime" => opt(&m.exposure_time),
            "exposuretimestring" => opt(&m.exposure_time_string),
            "flash" => opt(&m.flash),
            "fnumber" => opt(&m.f_number),
            "focallength" => opt(&m.focal_length_mm),
            "height" => opt(&m.height),
            "id" | "path" => Value::String(m.path.clone()),
            "imagename" => opt(&m.filename),
            "iso" => opt(&m.iso),
            "keywords" => serde_json::to_value(&m.keywords).unwrap_or(Value::Null),
            "latitude" => opt(&m.location.map(|l| l.lat)),
            "lensinfo" => opt(&m.lens_info),
            "lensmodel" => opt(&m.lens_model),
            "locationdisplayname" => opt(&m.location_display_name),
            "locationname" => opt(&m.location_hierarchical_name),
            "locationplacename" => opt(&m.location_place_name),
            "longitude" => opt(&m.location.map(|l| l.lon)),
            "mediatype" => Value::String(self.media_type().to_string()),
            "mimetype" => opt(&m.mime_type),
            "signature" => Value::String(m.signature.clone()),
            "tags" => opt(&m.tags),
            "warnings" => serde_json::to_value(&m.warnings).unwrap_or(Value::Null),
            "width" => opt(&m.width),
            _ => Value::Null,
        }
    }

    /// The requested properties as a JSON object, absent values omitted
    pub fn project(&self, properties: &[String]) -> Map<String, Value> {
        properties
            .iter()
            .map(|name| (name.clone(), self.property(name)))
            .filter(|(_, value)| !value.is_null())
            .collect()
    }
}

/// How hits are grouped for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum GroupBy {
    #[default]
    All,
    Date,
    Path,
}

/// Consecutive hits sharing a group name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitGroup {
    pub name: String,
    pub items: Vec<Map<String, Value>>,
}

fn group_name(media: &MediaDocument, group_by: GroupBy) -> String {
    let date = || {
        media
            .date_time
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    };
    match group_by {
        GroupBy::All => "all".to_string(),
        GroupBy::Date => date(),
        GroupBy::Path => {
            // Folder between the alias and the filename
            let tokens: Vec<&str> = media.path.split('\\').collect();
            if tokens.len() > 2 {
                tokens[1..tokens.len() - 1].join("\\")
            } else {
                date()
            }
        }
    }
}

/// Group consecutive hits; hit order is preserved
pub fn group_hits(hits: &[SearchHit], group_by: GroupBy, properties: &[String]) -> Vec<HitGroup> {
    let mut groups: Vec<HitGroup> = Vec::new();
    for hit in hits {
        let name = group_name(&hit.media, group_by);
        let item = hit.project(properties);
        match groups.last_mut() {
            Some(group) if group.name == name => group.items.push(item),
            _ => groups.push(HitGroup {
                name,
                items: vec![item],
            }),
        }
    }
    groups
}
