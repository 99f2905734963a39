//! Index field names and the fixed facet hierarchies

use strum::{Display, EnumString};

/// Fields searched by free-text queries
pub const DEFAULT_SEARCH_FIELDS: [&str; 6] = [
    "dayName",
    "keywords",
    "locationPlaceName",
    "monthName",
    "path",
    "tags",
];

/// Geo point field
pub const LOCATION_FIELD: &str = "location";

/// User-facing name → indexed field, keyed by the lower-cased name
const FIELD_TABLE: &[(&str, &str)] = &[
    ("azuretags", "azureTags.keyword"),
    ("cameramake", "cameraMake.keyword"),
    ("cameramodel", "cameraModel.keyword"),
    ("cityname", "locationCityName.keyword"),
    ("clarifaitags", "clarifaiTags.keyword"),
    ("countrycode", "locationCountryCode.keyword"),
    ("countryname", "locationCountryName.keyword"),
    ("dateday", "dateDay"),
    ("datemonth", "dateMonth.keyword"),
    ("dateyear", "dateYear"),
    ("dayname", "dayName.keyword"),
    ("dayofyear", "dayOfYear"),
    ("displayname", "locationDisplayName.keyword"),
    ("exposureprogram", "exposureProgram.keyword"),
    ("exposuretimestring", "exposureTimeString.keyword"),
    ("filename", "filename.keyword"),
    ("flash", "flash.keyword"),
    ("hierarchicalname", "locationHierarchicalName.keyword"),
    ("keywords", "keywords.keyword"),
    ("lensinfo", "lensInfo.keyword"),
    ("lensmodel", "lensModel.keyword"),
    ("mimetype", "mimeType.keyword"),
    ("monthname", "monthName.keyword"),
    ("originalcameramake", "originalCameraMake.keyword"),
    ("originalcameramodel", "originalCameraModel.keyword"),
    ("path", "path.keyword"),
    ("placename", "locationPlaceName.keyword"),
    ("sitename", "locationSiteName.keyword"),
    ("statename", "locationStateName.keyword"),
    ("tags", "tags.keyword"),
    ("warnings", "warnings.keyword"),
    ("whitebalance", "whiteBalance.keyword"),
];

/// Indexed (keyword sub-field) form of a user-facing field name.
///
/// Unknown names pass through lower-cased.
pub fn index_field(name: &str) -> String {
    let key = name.to_lowercase();
    FIELD_TABLE
        .iter()
        .find(|(user, _)| *user == key)
        .map(|(_, indexed)| indexed.to_string())
        .unwrap_or(key)
}

/// The two fixed facet hierarchies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Hierarchy {
    /// country → state → city → site
    #[strum(serialize = "placename")]
    Location,
    /// year → month → day
    Date,
}

impl Hierarchy {
    pub const ALL: [Hierarchy; 2] = [Hierarchy::Location, Hierarchy::Date];

    /// User-facing field names of each level, outermost first
    pub fn levels(&self) -> &'static [&'static str] {
        match self {
            Hierarchy::Location => &["countryName", "stateName", "cityName", "siteName"],
            Hierarchy::Date => &["dateYear", "dateMonth", "dateDay"],
        }
    }

    /// Hierarchy and level index of a user-facing field, case-insensitively
    pub fn of_field(field: &str) -> Option<(Hierarchy, usize)> {
        Self::ALL.iter().find_map(|hierarchy| {
            hierarchy
                .levels()
                .iter()
                .position(|level| level.eq_ignore_ascii_case(field))
                .map(|index| (*hierarchy, index))
        })
    }

    pub fn depth(&self) -> usize {
        self.levels().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_field_normalizes_known_names() {
        assert_eq!(index_field("tags"), "tags.keyword");
        assert_eq!(index_field("countryName"), "locationCountryName.keyword");
        assert_eq!(index_field("CAMERAMAKE"), "cameraMake.keyword");
        assert_eq!(index_field("dateYear"), "dateYear");
    }

    #[test]
    fn test_index_field_passes_unknown_lowercased() {
        assert_eq!(index_field("SomeField"), "somefield");
    }

    #[test]
    fn test_hierarchy_lookup() {
        assert_eq!(Hierarchy::of_field("stateName"), Some((Hierarchy::Location, 1)));
        assert_eq!(Hierarchy::of_field("datemonth"), Some((Hierarchy::Date, 1)));
        assert_eq!(Hierarchy::of_field("tags"), None);
        assert_eq!(Hierarchy::Location.to_string(), "placename");
        assert_eq!(Hierarchy::Date.depth(), 3);
    }
}
