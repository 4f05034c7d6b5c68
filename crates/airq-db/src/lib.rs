//! Storage layer for the air quality pipeline
//!
//! Targets an existing PostgreSQL schema (sensors, sensor_readings,
//! aqi_calculations, forecasts, alerts, sensor_health). No migrations run
//! from here. [`MemoryStore`] implements the same traits for tests and
//! demo runs without a database.

pub mod client;
pub mod memory;
pub mod queries;
pub mod schema;

pub use client::*;
pub use memory::MemoryStore;
pub use schema::*;

use airq_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid column value: {0}")]
    Decode(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Decode(msg) => StoreError::Corrupt(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
