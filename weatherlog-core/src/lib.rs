//! Core library for the `weatherlog` CLI.
//!
//! This crate defines:
//! - Configuration loading and validation
//! - The weather source client and payload normalization
//! - SQLite persistence of observations
//! - The resilient multi-city ingestion loop
//! - Read-only reporting over stored rows
//!
//! It is used by `weatherlog-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod report;
pub mod source;
pub mod store;

pub use config::{ApiConfig, Config, DatabaseConfig};
pub use error::{ApiCause, FailureKind, FetchError, IngestError, NormalizeError, StoreError};
pub use ingest::{CityFailure, CityStage, Ingestor, RunReport};
pub use model::{RawObservation, WeatherObservation};
pub use normalize::normalize;
pub use source::{OpenWeatherClient, WeatherSource};
pub use store::{ObservationStore, SqliteStore};
