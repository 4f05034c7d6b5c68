//! Forecast generation with history loading, persistence, and retention

use crate::ServiceResult;
use airq_core::{
    generate_forecast, ForecastHistory, ForecastParams, ForecastPoint, ForecastRecord,
    NewForecast, SensorId, Store,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Outcome of one forecast pass over all active sensors
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ForecastRunReport {
    pub attempted: usize,
    pub stored: usize,
    /// Sensors with too little history for a forecast
    pub insufficient: usize,
    pub failed: usize,
}

pub struct ForecastService {
    store: Arc<dyn Store>,
    params: ForecastParams,
}

impl ForecastService {
    pub fn new(store: Arc<dyn Store>, params: ForecastParams) -> Self {
        Self { store, params }
    }

    /// Oldest-first history: AQI records when there are enough, otherwise
    /// raw readings for the engine to map
    pub async fn load_history(
        &self,
        sensor_id: SensorId,
        now: DateTime<Utc>,
    ) -> ServiceResult<ForecastHistory> {
        let since = now - Duration::hours(self.params.history_hours);
        let limit = self.params.history_limit;

        let mut records = self.store.recent_aqi(sensor_id, since, limit).await?;
        if records.len() >= self.params.min_history {
            records.reverse();
            return Ok(ForecastHistory::Aqi(
                records.iter().map(|r| r.overall as f64).collect(),
            ));
        }

        let mut readings = self.store.recent_readings(sensor_id, since, limit).await?;
        readings.reverse();
        debug!(
            sensor_id,
            aqi_points = records.len(),
            readings = readings.len(),
            "Falling back to raw reading history"
        );
        Ok(ForecastHistory::Raw(
            readings.into_iter().map(|r| r.concentrations).collect(),
        ))
    }

    /// Forecast batch for a sensor without persisting it
    #[instrument(skip(self, now))]
    pub async fn generate_forecast(
        &self,
        sensor_id: SensorId,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<ForecastPoint>> {
        let history = self.load_history(sensor_id, now).await?;
        Ok(generate_forecast(&history, &self.params, now))
    }

    /// Generate and persist one batch sharing `now` as its generation time.
    /// Returns the number of rows written.
    #[instrument(skip(self, now))]
    pub async fn generate_and_store(
        &self,
        sensor_id: SensorId,
        now: DateTime<Utc>,
    ) -> ServiceResult<usize> {
        let points = self.generate_forecast(sensor_id, now).await?;
        if points.is_empty() {
            return Ok(0);
        }

        let batch: Vec<NewForecast> = points
            .into_iter()
            .map(|p| NewForecast {
                sensor_id,
                hour: p.hour,
                predicted_aqi: p.predicted_aqi,
                confidence: p.confidence,
                model_version: self.params.model_version.clone(),
                generated_at: now,
                valid_at: p.valid_at,
            })
            .collect();

        let stored = self.store.insert_forecasts(&batch).await?;
        Ok(stored.len())
    }

    pub async fn latest_forecasts(
        &self,
        sensor_id: SensorId,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<ForecastRecord>> {
        Ok(self.store.latest_forecasts(sensor_id, now).await?)
    }

    /// Drop batches generated before the retention window
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> ServiceResult<u64> {
        let cutoff = now - Duration::days(self.params.retention_days);
        let deleted = self.store.delete_forecasts_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, "Purged expired forecasts");
        }
        Ok(deleted)
    }

    /// Forecast every active sensor. A failing sensor is logged and does
    /// not stop the others.
    pub async fn generate_all(&self, now: DateTime<Utc>) -> ServiceResult<ForecastRunReport> {
        let sensors = self.store.list_sensors(true).await?;
        let mut report = ForecastRunReport::default();

        for sensor in &sensors {
            report.attempted += 1;
            match self.generate_and_store(sensor.id, now).await {
                Ok(0) => report.insufficient += 1,
                Ok(_) => report.stored += 1,
                Err(e) => {
                    warn!(sensor_id = sensor.id, error = %e, "Forecast generation failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            attempted = report.attempted,
            stored = report.stored,
            insufficient = report.insufficient,
            failed = report.failed,
            "Forecast pass complete"
        );
        Ok(report)
    }
}
