use chrono::{DateTime, Utc};

use crate::{
    error::NormalizeError,
    model::{RawObservation, WeatherObservation},
};

/// Offset between Kelvin and degrees Celsius.
pub const KELVIN_OFFSET: f64 = 273.15;

/// Turns a raw source payload into a canonical observation.
///
/// The capture time is supplied by the caller. Every required field is checked
/// here as well as in the client, since payloads may come from elsewhere.
pub fn normalize(
    raw: &RawObservation,
    city: &str,
    now: DateTime<Utc>,
) -> Result<WeatherObservation, NormalizeError> {
    let malformed = |reason: String| NormalizeError::MalformedPayload {
        city: city.to_string(),
        reason,
    };

    let main = raw
        .main
        .as_ref()
        .ok_or_else(|| malformed("missing field `main`".into()))?;

    let kelvin = main
        .temp
        .ok_or_else(|| malformed("missing field `main.temp`".into()))?;
    if !kelvin.is_finite() {
        return Err(malformed(format!("temperature {kelvin} is not a number")));
    }

    let humidity = main
        .humidity
        .ok_or_else(|| malformed("missing field `main.humidity`".into()))?;

    let description = raw
        .weather
        .first()
        .and_then(|w| w.description.clone())
        .ok_or_else(|| malformed("missing field `weather[0].description`".into()))?;

    Ok(WeatherObservation {
        city: city.to_string(),
        temperature_c: kelvin - KELVIN_OFFSET,
        humidity,
        description,
        captured_at: now,
    })
}
