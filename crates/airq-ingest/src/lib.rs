//! Reading sources for the ingestion scheduler
//!
//! A [`DataSource`] turns one sensor into one reading. Two implementations
//! exist: a synthetic generator for demo deployments and a client for the
//! AirVisual `nearest_city` endpoint. The daemon picks one from config.

pub mod airvisual;
pub mod simulator;

pub use airvisual::*;
pub use simulator::*;

use airq_core::{NewReading, Sensor};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned status: {0}")]
    ProviderStatus(String),

    #[error("Invalid provider payload: {0}")]
    Decode(String),

    #[error("Missing provider API key")]
    MissingApiKey,

    #[error("Invalid provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Source of one reading per sensor per cycle
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Whether calls hit a rate-limited external provider
    fn is_external(&self) -> bool;

    /// Fetch a reading for `sensor`, stamped with `at`
    async fn fetch(&self, sensor: &Sensor, at: DateTime<Utc>) -> IngestResult<NewReading>;
}
