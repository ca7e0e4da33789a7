use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A city name that is known to be non-empty.
///
/// Surrounding whitespace is trimmed on construction, so a query made of
/// whitespace only can never be built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeatherQuery(String);

impl WeatherQuery {
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() { None } else { Some(Self(trimmed.to_owned())) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WeatherQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current conditions for one location, normalized from the provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city_name: String,
    pub temperature_c: f64,
    pub description: String,

    // Not every response carries these.
    pub feels_like_c: Option<f64>,
    pub humidity_pct: Option<u8>,
    pub wind_kph: Option<f64>,
    /// US EPA air quality index (1 = good .. 6 = hazardous).
    pub us_epa_index: Option<u8>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl WeatherRecord {
    pub fn new(
        city_name: impl Into<String>,
        temperature_c: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            city_name: city_name.into(),
            temperature_c,
            description: description.into(),
            feels_like_c: None,
            humidity_pct: None,
            wind_kph: None,
            us_epa_index: None,
            observed_at: None,
        }
    }
}
