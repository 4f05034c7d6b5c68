//! Storage and sensor-directory seams
//!
//! The pipeline treats storage as an external collaborator. Every record
//! crosses these traits by value; nothing holds references into storage
//! between calls.

use crate::types::{
    Alert, AlertKind, AqiRecord, ForecastRecord, HealthStatus, NewAlert, NewAqiRecord,
    NewForecast, NewReading, Reading, Sensor, SensorHealth, SensorId,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait::async_trait]
pub trait SensorDirectory: Send + Sync {
    async fn list_sensors(&self, active_only: bool) -> StoreResult<Vec<Sensor>>;
}

#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<Reading>;

    /// Newest first, at most `limit` rows recorded after `since`
    async fn recent_readings(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Reading>>;

    async fn latest_reading_at(&self, sensor_id: SensorId) -> StoreResult<Option<DateTime<Utc>>>;

    /// Readings after `since` that have no AQI record, oldest first
    async fn readings_without_aqi(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Reading>>;
}

#[async_trait::async_trait]
pub trait AqiStore: Send + Sync {
    async fn insert_aqi(&self, record: &NewAqiRecord) -> StoreResult<AqiRecord>;

    /// Newest first, at most `limit` rows computed after `since`
    async fn recent_aqi(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<AqiRecord>>;
}

#[async_trait::async_trait]
pub trait ForecastStore: Send + Sync {
    async fn insert_forecasts(&self, batch: &[NewForecast]) -> StoreResult<Vec<ForecastRecord>>;

    /// Rows of the most recent generation batch still valid after `now`,
    /// ordered by hour
    async fn latest_forecasts(
        &self,
        sensor_id: SensorId,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ForecastRecord>>;

    async fn delete_forecasts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait::async_trait]
pub trait AlertLedger: Send + Sync {
    async fn insert_alert(&self, alert: &NewAlert) -> StoreResult<Alert>;

    /// Active alerts, newest first, optionally narrowed by sensor and type
    async fn active_alerts(
        &self,
        sensor_id: Option<SensorId>,
        kind: Option<AlertKind>,
    ) -> StoreResult<Vec<Alert>>;

    /// Flip an active alert to resolved. Returns `None` when the alert was
    /// already resolved or does not exist.
    async fn resolve_alert(&self, alert_id: i64, at: DateTime<Utc>) -> StoreResult<Option<Alert>>;

    /// Alerts created after `since`, newest first
    async fn alerts_since(
        &self,
        sensor_id: Option<SensorId>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Alert>>;
}

#[async_trait::async_trait]
pub trait HealthStore: Send + Sync {
    async fn upsert_health(&self, health: &SensorHealth) -> StoreResult<()>;

    async fn get_health(&self, sensor_id: SensorId) -> StoreResult<Option<SensorHealth>>;

    async fn health_counts(&self) -> StoreResult<Vec<(HealthStatus, i64)>>;
}

/// Everything the pipeline needs from storage
pub trait Store:
    SensorDirectory + ReadingStore + AqiStore + ForecastStore + AlertLedger + HealthStore
{
}

impl<T> Store for T where
    T: SensorDirectory + ReadingStore + AqiStore + ForecastStore + AlertLedger + HealthStore
{
}
