//! Read-only views over stored observations, for charting and CLI output.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::{error::StoreError, model::WeatherObservation, store::ObservationStore};

/// Temperature statistics for one city over one UTC calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub readings: usize,
    pub min_c: f64,
    pub max_c: f64,
    pub mean_c: f64,
}

/// All stored observations for a city, oldest first.
pub fn history<S: ObservationStore + ?Sized>(
    store: &S,
    city: &str,
) -> Result<Vec<WeatherObservation>, StoreError> {
    store.query_by_city(city)
}

/// Every stored observation across all cities, oldest first.
pub fn all_rows<S: ObservationStore + ?Sized>(
    store: &S,
) -> Result<Vec<WeatherObservation>, StoreError> {
    store.query_all()
}

/// Mean temperature of several cities for one UTC calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyComparison {
    pub date: NaiveDate,
    /// One entry per requested city, in request order; `None` when that city
    /// has no reading on this day.
    pub mean_c: Vec<Option<f64>>,
}

/// Date by city table of mean temperatures, in date order.
///
/// Rows for cities not listed are ignored. A date appears when at least one
/// listed city has a reading on it.
pub fn compare_daily<C: AsRef<str>>(
    rows: &[WeatherObservation],
    cities: &[C],
) -> Vec<DailyComparison> {
    let mut by_day: BTreeMap<NaiveDate, Vec<(f64, usize)>> = BTreeMap::new();
    for row in rows {
        let Some(idx) = cities.iter().position(|c| c.as_ref() == row.city) else {
            continue;
        };
        let sums = by_day
            .entry(row.captured_at.date_naive())
            .or_insert_with(|| vec![(0.0, 0); cities.len()]);
        sums[idx].0 += row.temperature_c;
        sums[idx].1 += 1;
    }

    by_day
        .into_iter()
        .map(|(date, sums)| DailyComparison {
            date,
            mean_c: sums
                .into_iter()
                .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
                .collect(),
        })
        .collect()
}

/// Group observations by UTC date, in date order.
pub fn daily_summaries(rows: &[WeatherObservation]) -> Vec<DailySummary> {
    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for row in rows {
        by_day
            .entry(row.captured_at.date_naive())
            .or_default()
            .push(row.temperature_c);
    }

    by_day
        .into_iter()
        .map(|(date, temps)| {
            let min_c = temps.iter().copied().fold(f64::INFINITY, f64::min);
            let max_c = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean_c = temps.iter().sum::<f64>() / temps.len() as f64;
            DailySummary {
                date,
                readings: temps.len(),
                min_c,
                max_c,
                mean_c,
            }
        })
        .collect()
}
