use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::{
    config::ApiConfig,
    error::{ApiCause, FetchError},
    model::RawObservation,
};

use super::WeatherSource;

/// Client for the OpenWeather current-weather endpoint.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherClient {
    pub fn new(config: &ApiConfig) -> reqwest::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            http,
        })
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn fetch(&self, city: &str) -> Result<RawObservation, FetchError> {
        log::debug!("requesting current weather for '{city}'");

        // No `units` parameter: the endpoint then reports temperatures in Kelvin.
        let res = self
            .http
            .get(self.base_url.as_str())
            .query(&[("q", city), ("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::new(city, e))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| FetchError::new(city, e))?;

        if !status.is_success() {
            return Err(FetchError::new(
                city,
                ApiCause::Status {
                    status: status.as_u16(),
                    body: truncate_body(&body),
                },
            ));
        }

        let parsed: RawObservation =
            serde_json::from_str(&body).map_err(|e| FetchError::new(city, e))?;

        if let Some(field) = parsed.missing_field() {
            return Err(FetchError::new(city, ApiCause::MissingField(field)));
        }

        Ok(parsed)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
