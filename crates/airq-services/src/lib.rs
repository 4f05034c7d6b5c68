//! Stateful pipeline services built on the storage traits
//!
//! The alert evaluator, sensor health monitor, forecast service, and AQI
//! recorder. Each holds an `Arc<dyn Store>` and takes `now` explicitly so
//! tests can drive time.

pub mod alerts;
pub mod aqi;
pub mod forecaster;
pub mod health;

pub use alerts::*;
pub use aqi::*;
pub use forecaster::*;
pub use health::*;

use airq_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
