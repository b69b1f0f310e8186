//! Sequential multi-city ingestion.
//!
//! Each city is fetched, normalized and inserted before the next one starts.
//! A failure for one city is logged and recorded in the [`RunReport`]; it
//! never aborts the run. Successful inserts are committed one by one, so a
//! later failure cannot undo them.
//!
//! When an insert reports a lost connection the store is reconnected and the
//! run moves on to the next city. The observation for the city that hit the
//! lost connection is dropped for this run, not retried.

use chrono::{DateTime, Utc};

use crate::{
    error::{FailureKind, IngestError},
    normalize::normalize,
    source::WeatherSource,
    store::ObservationStore,
};

/// Where in the per-city pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CityStage {
    Fetching,
    Normalizing,
    Inserting,
}

impl std::fmt::Display for CityStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CityStage::Fetching => "fetching",
            CityStage::Normalizing => "normalizing",
            CityStage::Inserting => "inserting",
        })
    }
}

#[derive(Debug)]
pub struct CityFailure {
    pub city: String,
    pub stage: CityStage,
    pub error: IngestError,
}

impl CityFailure {
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Cities whose observation was committed, in processing order.
    pub stored: Vec<String>,
    /// Cities that were skipped, in processing order.
    pub failures: Vec<CityFailure>,
    pub reconnects: u32,
}

impl RunReport {
    pub fn attempted(&self) -> usize {
        self.stored.len() + self.failures.len()
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Drives one ingestion run over an owned source and store.
pub struct Ingestor<W, S> {
    source: W,
    store: S,
    clock: Clock,
}

impl<W, S> Ingestor<W, S>
where
    W: WeatherSource,
    S: ObservationStore,
{
    pub fn new(source: W, store: S) -> Self {
        Self {
            source,
            store,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the time source used to stamp `captured_at`.
    pub fn with_clock(
        mut self,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Process every city once, in order, then close the store.
    pub async fn run<C: AsRef<str>>(mut self, cities: &[C]) -> RunReport {
        let mut report = RunReport::default();

        for city in cities {
            let city = city.as_ref();

            match self.process_city(city).await {
                Ok(()) => {
                    log::info!("stored observation for '{city}'");
                    report.stored.push(city.to_string());
                }
                Err((stage, error)) => {
                    self.handle_failure(city, stage, &error, &mut report);
                    report.failures.push(CityFailure {
                        city: city.to_string(),
                        stage,
                        error,
                    });
                }
            }
        }

        if let Err(e) = self.store.close() {
            log::warn!("failed to close store after run: {e}");
        }

        log::info!(
            "ingestion run finished: {} stored, {} failed, {} reconnect(s)",
            report.stored.len(),
            report.failures.len(),
            report.reconnects
        );

        report
    }

    async fn process_city(&mut self, city: &str) -> Result<(), (CityStage, IngestError)> {
        let raw = self
            .source
            .fetch(city)
            .await
            .map_err(|e| (CityStage::Fetching, IngestError::from(e)))?;
        let captured_at = (self.clock)();

        let observation = normalize(&raw, city, captured_at)
            .map_err(|e| (CityStage::Normalizing, IngestError::from(e)))?;

        self.store
            .insert(&observation)
            .map_err(|e| (CityStage::Inserting, IngestError::from(e)))
    }

    fn handle_failure(
        &mut self,
        city: &str,
        stage: CityStage,
        error: &IngestError,
        report: &mut RunReport,
    ) {
        match error.kind() {
            FailureKind::NetworkOrApi | FailureKind::MalformedPayload => {
                log::warn!("skipping '{city}' ({}) while {stage}: {error}", error.kind());
            }
            FailureKind::StoreWrite => {
                log::warn!("insert for '{city}' rolled back, skipping: {error}");
            }
            FailureKind::StoreConnectionLost => {
                log::warn!(
                    "database connection lost while storing '{city}', reconnecting: {error}"
                );
                report.reconnects += 1;
                if let Err(e) = self.store.reconnect() {
                    log::error!("reconnect failed, next insert will retry: {e}");
                }
            }
        }
    }
}
