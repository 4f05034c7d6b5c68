//! In-process store implementing the storage traits
//!
//! Used by the daemon's `memory` backend and by tests across the
//! workspace. Ids are assigned sequentially per table, like BIGSERIAL.

use airq_core::{
    Alert, AlertKind, AlertLedger, AqiRecord, AqiStore, ForecastRecord, ForecastStore,
    HealthStatus, HealthStore, NewAlert, NewAqiRecord, NewForecast, NewReading, Reading,
    ReadingStore, Sensor, SensorDirectory, SensorHealth, SensorId, StoreError, StoreResult,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    sensors: Vec<Sensor>,
    readings: Vec<Reading>,
    aqi: Vec<AqiRecord>,
    forecasts: Vec<ForecastRecord>,
    alerts: Vec<Alert>,
    health: HashMap<SensorId, SensorHealth>,
    next_id: i64,
    failing: HashSet<SensorId>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, sensor_id: SensorId) -> StoreResult<()> {
        if self.failing.contains(&sensor_id) {
            return Err(StoreError::Backend(format!(
                "sensor {sensor_id} storage unavailable"
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensors(sensors: Vec<Sensor>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                sensors,
                ..Default::default()
            }),
        }
    }

    pub async fn add_sensor(&self, sensor: Sensor) {
        self.tables.write().await.sensors.push(sensor);
    }

    /// Make reading reads/writes and AQI history reads for a sensor fail
    /// until cleared
    pub async fn fail_sensor(&self, sensor_id: SensorId, failing: bool) {
        let mut tables = self.tables.write().await;
        if failing {
            tables.failing.insert(sensor_id);
        } else {
            tables.failing.remove(&sensor_id);
        }
    }

    pub async fn readings(&self, sensor_id: SensorId) -> Vec<Reading> {
        let tables = self.tables.read().await;
        tables
            .readings
            .iter()
            .filter(|r| r.sensor_id == sensor_id)
            .cloned()
            .collect()
    }

    pub async fn aqi_records(&self, sensor_id: SensorId) -> Vec<AqiRecord> {
        let tables = self.tables.read().await;
        tables
            .aqi
            .iter()
            .filter(|r| r.sensor_id == sensor_id)
            .cloned()
            .collect()
    }

    pub async fn all_alerts(&self) -> Vec<Alert> {
        self.tables.read().await.alerts.clone()
    }

    pub async fn forecast_count(&self) -> usize {
        self.tables.read().await.forecasts.len()
    }
}

#[async_trait::async_trait]
impl SensorDirectory for MemoryStore {
    async fn list_sensors(&self, active_only: bool) -> StoreResult<Vec<Sensor>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sensors
            .iter()
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl ReadingStore for MemoryStore {
    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<Reading> {
        let mut tables = self.tables.write().await;
        tables.check(reading.sensor_id)?;

        let stored = Reading {
            id: tables.next_id(),
            sensor_id: reading.sensor_id,
            recorded_at: reading.recorded_at,
            concentrations: reading.concentrations,
            ambient: reading.ambient,
            source: reading.source,
        };
        tables.readings.push(stored.clone());
        Ok(stored)
    }

    async fn recent_readings(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Reading>> {
        let tables = self.tables.read().await;
        tables.check(sensor_id)?;

        let mut rows: Vec<Reading> = tables
            .readings
            .iter()
            .filter(|r| r.sensor_id == sensor_id && r.recorded_at > since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn latest_reading_at(&self, sensor_id: SensorId) -> StoreResult<Option<DateTime<Utc>>> {
        let tables = self.tables.read().await;
        tables.check(sensor_id)?;

        Ok(tables
            .readings
            .iter()
            .filter(|r| r.sensor_id == sensor_id)
            .map(|r| r.recorded_at)
            .max())
    }

    async fn readings_without_aqi(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Reading>> {
        let tables = self.tables.read().await;
        tables.check(sensor_id)?;

        let covered: HashSet<i64> = tables.aqi.iter().filter_map(|a| a.reading_id).collect();
        let mut rows: Vec<Reading> = tables
            .readings
            .iter()
            .filter(|r| r.sensor_id == sensor_id && r.recorded_at > since)
            .filter(|r| !covered.contains(&r.id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl AqiStore for MemoryStore {
    async fn insert_aqi(&self, record: &NewAqiRecord) -> StoreResult<AqiRecord> {
        let mut tables = self.tables.write().await;
        let stored = AqiRecord {
            id: tables.next_id(),
            sensor_id: record.sensor_id,
            reading_id: record.reading_id,
            overall: record.overall,
            sub_indices: record.sub_indices,
            dominant_pollutant: record.dominant_pollutant.clone(),
            computed_at: record.computed_at,
        };
        tables.aqi.push(stored.clone());
        Ok(stored)
    }

    async fn recent_aqi(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<AqiRecord>> {
        let tables = self.tables.read().await;
        tables.check(sensor_id)?;
        let mut rows: Vec<AqiRecord> = tables
            .aqi
            .iter()
            .filter(|r| r.sensor_id == sensor_id && r.computed_at > since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.computed_at.cmp(&a.computed_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl ForecastStore for MemoryStore {
    async fn insert_forecasts(&self, batch: &[NewForecast]) -> StoreResult<Vec<ForecastRecord>> {
        let mut tables = self.tables.write().await;
        let mut inserted = Vec::with_capacity(batch.len());
        for forecast in batch {
            let stored = ForecastRecord {
                id: tables.next_id(),
                sensor_id: forecast.sensor_id,
                hour: forecast.hour,
                predicted_aqi: forecast.predicted_aqi,
                confidence: forecast.confidence,
                model_version: forecast.model_version.clone(),
                generated_at: forecast.generated_at,
                valid_at: forecast.valid_at,
            };
            inserted.push(stored);
        }
        tables.forecasts.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn latest_forecasts(
        &self,
        sensor_id: SensorId,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ForecastRecord>> {
        let tables = self.tables.read().await;
        let latest = tables
            .forecasts
            .iter()
            .filter(|f| f.sensor_id == sensor_id)
            .map(|f| f.generated_at)
            .max();

        let Some(latest) = latest else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<ForecastRecord> = tables
            .forecasts
            .iter()
            .filter(|f| f.sensor_id == sensor_id && f.generated_at == latest && f.valid_at > now)
            .cloned()
            .collect();
        rows.sort_by_key(|f| f.hour);
        Ok(rows)
    }

    async fn delete_forecasts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.forecasts.len();
        tables.forecasts.retain(|f| f.generated_at >= cutoff);
        Ok((before - tables.forecasts.len()) as u64)
    }
}

#[async_trait::async_trait]
impl AlertLedger for MemoryStore {
    async fn insert_alert(&self, alert: &NewAlert) -> StoreResult<Alert> {
        let mut tables = self.tables.write().await;
        let stored = Alert {
            id: tables.next_id(),
            sensor_id: alert.sensor_id,
            kind: alert.kind,
            severity: alert.severity,
            message: alert.message.clone(),
            aqi_level: alert.aqi_level,
            pollutant: alert.pollutant.clone(),
            is_active: true,
            created_at: alert.created_at,
            resolved_at: None,
        };
        tables.alerts.push(stored.clone());
        Ok(stored)
    }

    async fn active_alerts(
        &self,
        sensor_id: Option<SensorId>,
        kind: Option<AlertKind>,
    ) -> StoreResult<Vec<Alert>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Alert> = tables
            .alerts
            .iter()
            .filter(|a| a.is_active)
            .filter(|a| sensor_id.map_or(true, |id| a.sensor_id == id))
            .filter(|a| kind.map_or(true, |k| a.kind == k))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn resolve_alert(&self, alert_id: i64, at: DateTime<Utc>) -> StoreResult<Option<Alert>> {
        let mut tables = self.tables.write().await;
        let alert = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id && a.is_active);

        Ok(alert.map(|a| {
            a.is_active = false;
            a.resolved_at = Some(at);
            a.clone()
        }))
    }

    async fn alerts_since(
        &self,
        sensor_id: Option<SensorId>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Alert>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Alert> = tables
            .alerts
            .iter()
            .filter(|a| a.created_at > since)
            .filter(|a| sensor_id.map_or(true, |id| a.sensor_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl HealthStore for MemoryStore {
    async fn upsert_health(&self, health: &SensorHealth) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.health.insert(health.sensor_id, health.clone());
        Ok(())
    }

    async fn get_health(&self, sensor_id: SensorId) -> StoreResult<Option<SensorHealth>> {
        Ok(self.tables.read().await.health.get(&sensor_id).cloned())
    }

    async fn health_counts(&self) -> StoreResult<Vec<(HealthStatus, i64)>> {
        let tables = self.tables.read().await;
        Ok(HealthStatus::ALL
            .iter()
            .map(|status| {
                let count = tables.health.values().filter(|h| h.status == *status).count();
                (*status, count as i64)
            })
            .filter(|(_, count)| *count > 0)
            .collect())
    }
}
