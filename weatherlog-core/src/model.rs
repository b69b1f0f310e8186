use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized weather reading for one city at one capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub city: String,
    pub temperature_c: f64,
    pub humidity: i64,
    pub description: String,
    /// When this system fetched the reading, not the source's observation time.
    pub captured_at: DateTime<Utc>,
}

/// Current-weather payload as returned by the source, before normalization.
///
/// Every field is optional so that an incomplete body deserializes and the
/// presence checks can name what is missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawObservation {
    pub main: Option<RawMain>,
    #[serde(default)]
    pub weather: Vec<RawWeather>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawMain {
    /// Kelvin.
    pub temp: Option<f64>,
    pub humidity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawWeather {
    pub description: Option<String>,
}

impl RawObservation {
    /// Name of the first required field absent from the payload, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        let Some(main) = &self.main else {
            return Some("main");
        };
        if main.temp.is_none() {
            return Some("main.temp");
        }
        if main.humidity.is_none() {
            return Some("main.humidity");
        }
        match self.weather.first() {
            None => Some("weather[0]"),
            Some(w) if w.description.is_none() => Some("weather[0].description"),
            Some(_) => None,
        }
    }
}
