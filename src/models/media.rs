use chrono::{Datelike, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

/// Days before the first of each month, counting February 29 every year so a
/// calendar day maps to the same day-of-year regardless of leap years.
const DAYS_BEFORE_MONTH: [u32; 12] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];
const DAYS_IN_MONTH: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Highest day-of-year value
pub const MAX_DAY_OF_YEAR: u32 = 366;

/// One indexed photo or video. `path` is the document id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDocument {
    pub path: String,

    #[serde(default)]
    pub signature: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_in_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<NaiveDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_month: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_day: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_year: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    // EXIF
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_time_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_number: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_length_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_balance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_camera_make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_camera_model: Option<String>,

    // Enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifai_tags: Option<Vec<String>>,

    // Location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_country_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_state_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_city_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_place_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_hierarchical_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MediaDocument {
    pub fn new(path: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            signature: signature.into(),
            ..Default::default()
        }
    }

    /// Set `dateTime` and every field derived from it
    pub fn set_date_time(&mut self, date_time: NaiveDateTime) {
        let date = date_time.date();
        let month_name = month_name(date.month()).map(str::to_string);
        self.date_time = Some(date_time);
        self.date_year = Some(date.year());
        self.date_month = month_name.clone();
        self.month_name = month_name;
        self.date_day = Some(date.day());
        self.day_name = Some(day_name(date.weekday()).to_string());
        self.day_of_year = day_of_year(date.month(), date.day());
    }

    /// Record a non-fatal problem found while preparing the document
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lon: f64,
}

impl GeoLocation {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// English weekday name
pub fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// English month name for a 1-based month
pub fn month_name(month: u32) -> Option<&'static str> {
    const NAMES: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    NAMES.get(month.checked_sub(1)? as usize).copied()
}

/// Leap-inclusive day of year, `None` for an impossible date
pub fn day_of_year(month: u32, day: u32) -> Option<u32> {
    let index = month.checked_sub(1)? as usize;
    let days = *DAYS_IN_MONTH.get(index)?;
    if day == 0 || day > days {
        return None;
    }
    Some(DAYS_BEFORE_MONTH[index] + day)
}

/// Inverse of [`day_of_year`]
pub fn month_day(day_of_year: u32) -> Option<(u32, u32)> {
    if day_of_year == 0 || day_of_year > MAX_DAY_OF_YEAR {
        return None;
    }
    let index = DAYS_BEFORE_MONTH
        .iter()
        .rposition(|before| *before < day_of_year)?;
    Some((index as u32 + 1, day_of_year - DAYS_BEFORE_MONTH[index]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_day_of_year_counts_leap_day() {
        assert_eq!(day_of_year(1, 1), Some(1));
        assert_eq!(day_of_year(2, 29), Some(60));
        assert_eq!(day_of_year(3, 1), Some(61));
        assert_eq!(day_of_year(12, 31), Some(366));
        assert_eq!(day_of_year(2, 30), None);
        assert_eq!(day_of_year(13, 1), None);
        assert_eq!(day_of_year(0, 1), None);
    }

    #[test]
    fn test_month_day_inverts_day_of_year() {
        assert_eq!(month_day(61), Some((3, 1)));
        assert_eq!(month_day(60), Some((2, 29)));
        assert_eq!(month_day(1), Some((1, 1)));
        assert_eq!(month_day(366), Some((12, 31)));
        assert_eq!(month_day(367), None);
    }

    #[test]
    fn test_set_date_time_decomposes() {
        let mut doc = MediaDocument::new("1\\2016\\beach.jpg", "abc");
        let date_time = NaiveDate::from_ymd_opt(2016, 12, 25)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        doc.set_date_time(date_time);

        assert_eq!(doc.date_year, Some(2016));
        assert_eq!(doc.date_month.as_deref(), Some("December"));
        assert_eq!(doc.date_day, Some(25));
        assert_eq!(doc.day_name.as_deref(), Some("Sunday"));
        assert_eq!(doc.day_of_year, Some(360));
    }

    #[test]
    fn test_serializes_camel_case_and_skips_missing() {
        let mut doc = MediaDocument::new("1\\a.jpg", "sig");
        doc.location_country_name = Some("USA".into());
        doc.azure_tags = Some(vec!["sky".into()]);
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["locationCountryName"], "USA");
        assert_eq!(value["azureTags"][0], "sky");
        assert!(value.get("clarifaiTags").is_none());
        assert!(value.get("warnings").is_none());
    }
}
