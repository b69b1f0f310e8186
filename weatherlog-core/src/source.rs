use async_trait::async_trait;
use std::fmt::Debug;

use crate::{error::FetchError, model::RawObservation};

pub mod openweather;

pub use openweather::OpenWeatherClient;

/// Something that can fetch the current weather payload for a city.
///
/// Implementations make exactly one attempt per call; retry policy belongs to
/// the caller.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch(&self, city: &str) -> Result<RawObservation, FetchError>;
}
