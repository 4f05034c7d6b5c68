//! Sensor health monitoring based on reading freshness

use crate::alerts::minutes_between;
use crate::ServiceResult;
use airq_core::{HealthStatus, SensorHealth, SensorId, Store};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Status and error count for a sensor whose last reading is `age_minutes`
/// old, or that has never reported
pub fn classify(age_minutes: Option<f64>, stale_minutes: i64) -> (HealthStatus, i32) {
    let stale = stale_minutes as f64;
    match age_minutes {
        None => (HealthStatus::Offline, 1),
        Some(age) if age > stale * 2.0 => (HealthStatus::Offline, 0),
        Some(age) if age > stale => (HealthStatus::Stale, 0),
        Some(_) => (HealthStatus::Active, 0),
    }
}

/// Sensor counts per health status
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub active: i64,
    pub stale: i64,
    pub offline: i64,
    pub error: i64,
}

impl HealthSummary {
    fn add(&mut self, status: HealthStatus, count: i64) {
        match status {
            HealthStatus::Active => self.active += count,
            HealthStatus::Stale => self.stale += count,
            HealthStatus::Offline => self.offline += count,
            HealthStatus::Error => self.error += count,
        }
    }
}

pub struct HealthMonitor {
    store: Arc<dyn Store>,
    stale_minutes: i64,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn Store>, stale_minutes: i64) -> Self {
        Self {
            store,
            stale_minutes,
        }
    }

    /// Derive and upsert one sensor's health. A storage failure while
    /// reading becomes an `error` status rather than an error return.
    #[instrument(skip(self, now))]
    pub async fn check_sensor(
        &self,
        sensor_id: SensorId,
        now: DateTime<Utc>,
    ) -> ServiceResult<SensorHealth> {
        let health = match self.store.latest_reading_at(sensor_id).await {
            Ok(last) => {
                let age = last.map(|at| minutes_between(at, now));
                let (status, error_count) = classify(age, self.stale_minutes);
                SensorHealth {
                    sensor_id,
                    status,
                    error_count,
                    last_reading_at: last,
                    updated_at: now,
                }
            }
            Err(e) => {
                warn!(sensor_id, error = %e, "Health check failed");
                SensorHealth {
                    sensor_id,
                    status: HealthStatus::Error,
                    error_count: 1,
                    last_reading_at: None,
                    updated_at: now,
                }
            }
        };

        self.store.upsert_health(&health).await?;
        Ok(health)
    }

    /// Check every active sensor
    pub async fn check_all(&self, now: DateTime<Utc>) -> ServiceResult<Vec<SensorHealth>> {
        let sensors = self.store.list_sensors(true).await?;
        let mut results = Vec::with_capacity(sensors.len());

        for sensor in &sensors {
            match self.check_sensor(sensor.id, now).await {
                Ok(health) => results.push(health),
                Err(e) => warn!(sensor_id = sensor.id, error = %e, "Could not store sensor health"),
            }
        }

        info!("Health check completed for {} sensors", sensors.len());
        Ok(results)
    }

    pub async fn summary(&self) -> ServiceResult<HealthSummary> {
        let mut summary = HealthSummary::default();
        for (status, count) in self.store.health_counts().await? {
            summary.add(status, count);
        }
        Ok(summary)
    }

    pub async fn get(&self, sensor_id: SensorId) -> ServiceResult<Option<SensorHealth>> {
        Ok(self.store.get_health(sensor_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(None, 15), (HealthStatus::Offline, 1));
        assert_eq!(classify(Some(3.0), 15), (HealthStatus::Active, 0));
        assert_eq!(classify(Some(15.0), 15), (HealthStatus::Active, 0));
        assert_eq!(classify(Some(16.0), 15), (HealthStatus::Stale, 0));
        assert_eq!(classify(Some(30.0), 15), (HealthStatus::Stale, 0));
        assert_eq!(classify(Some(31.0), 15), (HealthStatus::Offline, 0));
    }

    #[test]
    fn test_summary_accumulates() {
        let mut summary = HealthSummary::default();
        summary.add(HealthStatus::Active, 4);
        summary.add(HealthStatus::Error, 1);

        assert_eq!(summary.active, 4);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.stale, 0);
    }
}
