//! Query operations against the pipeline tables
//!
//! Inherent methods return [`DbResult`]; the storage trait impls at the
//! bottom delegate to them and convert into the backend-agnostic error.

use crate::schema::{AlertRow, AqiRow, ForecastRow, ReadingRow, SensorHealthRow, SensorRow};
use crate::{DbClient, DbError, DbResult};
use airq_core::{
    Alert, AlertKind, AlertLedger, AqiRecord, AqiStore, ForecastRecord, ForecastStore,
    HealthStatus, HealthStore, NewAlert, NewAqiRecord, NewForecast, NewReading, Reading,
    ReadingStore, Sensor, SensorDirectory, SensorHealth, SensorId, StoreResult,
};
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::{debug, instrument};

const SENSOR_COLUMNS: &str = "id, device_id, latitude, longitude, is_active";

const READING_COLUMNS: &str = r#"id, sensor_id, pm25, pm10, no2, co, o3, so2,
    temp, hum, pressure, wind_speed, source, "timestamp""#;

const AQI_COLUMNS: &str = r#"id, sensor_id, reading_id, aqi_overall,
    pm25_aqi, pm10_aqi, no2_aqi, co_aqi, o3_aqi, so2_aqi,
    dominant_pollutant, "timestamp""#;

const FORECAST_COLUMNS: &str =
    "id, sensor_id, forecast_hour, predicted_aqi, confidence, model_version, created_at, valid_at";

const ALERT_COLUMNS: &str = "id, sensor_id, alert_type, aqi_level, pollutant, severity, message, \
     is_active, created_at, resolved_at";

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl DbClient {
    #[instrument(skip(self))]
    pub async fn fetch_sensors(&self, active_only: bool) -> DbResult<Vec<Sensor>> {
        let sql = format!(
            r#"
            SELECT {SENSOR_COLUMNS}
            FROM sensors
            WHERE ($1 = FALSE OR is_active = TRUE)
            ORDER BY id ASC
            "#
        );
        let rows = sqlx::query_as::<_, SensorRow>(&sql)
            .bind(active_only)
            .fetch_all(self.pool())
            .await?;

        debug!("Retrieved {} sensors", rows.len());
        Ok(rows.into_iter().map(Sensor::from).collect())
    }

    #[instrument(skip(self, reading), fields(sensor_id = reading.sensor_id))]
    pub async fn insert_reading_row(&self, reading: &NewReading) -> DbResult<Reading> {
        let sql = format!(
            r#"
            INSERT INTO sensor_readings (
                sensor_id, pm25, pm10, no2, co, o3, so2,
                temp, hum, pressure, wind_speed, source, "timestamp"
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {READING_COLUMNS}
            "#
        );
        let c = &reading.concentrations;
        let a = &reading.ambient;

        let row = sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(reading.sensor_id)
            .bind(c.pm25)
            .bind(c.pm10)
            .bind(c.no2)
            .bind(c.co)
            .bind(c.o3)
            .bind(c.so2)
            .bind(a.temperature)
            .bind(a.humidity)
            .bind(a.pressure)
            .bind(a.wind_speed)
            .bind(reading.source.to_string())
            .bind(reading.recorded_at)
            .fetch_one(self.pool())
            .await?;

        debug!("Inserted reading {} for sensor {}", row.id, row.sensor_id);
        Reading::try_from(row)
    }

    #[instrument(skip(self))]
    pub async fn fetch_recent_readings(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> DbResult<Vec<Reading>> {
        let sql = format!(
            r#"
            SELECT {READING_COLUMNS} FROM sensor_readings
            WHERE sensor_id = $1 AND "timestamp" > $2
            ORDER BY "timestamp" DESC
            LIMIT $3
            "#
        );

        let rows = sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(sensor_id)
            .bind(since)
            .bind(limit_param(limit))
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(Reading::try_from).collect()
    }

    #[instrument(skip(self))]
    pub async fn fetch_latest_reading_at(
        &self,
        sensor_id: SensorId,
    ) -> DbResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MAX("timestamp") AS latest FROM sensor_readings WHERE sensor_id = $1
            "#,
        )
        .bind(sensor_id)
        .fetch_one(self.pool())
        .await?;

        Ok(row.try_get("latest")?)
    }

    #[instrument(skip(self))]
    pub async fn fetch_readings_without_aqi(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<Reading>> {
        let sql = format!(
            r#"
            SELECT {READING_COLUMNS} FROM sensor_readings r
            WHERE r.sensor_id = $1 AND r."timestamp" > $2
              AND NOT EXISTS (SELECT 1 FROM aqi_calculations a WHERE a.reading_id = r.id)
            ORDER BY r."timestamp" ASC
            "#
        );

        let rows = sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(sensor_id)
            .bind(since)
            .fetch_all(self.pool())
            .await?;

        debug!("Found {} readings without AQI for sensor {}", rows.len(), sensor_id);
        rows.into_iter().map(Reading::try_from).collect()
    }

    #[instrument(skip(self, record), fields(sensor_id = record.sensor_id, aqi = record.overall))]
    pub async fn insert_aqi_row(&self, record: &NewAqiRecord) -> DbResult<AqiRecord> {
        let sql = format!(
            r#"
            INSERT INTO aqi_calculations (
                sensor_id, reading_id, aqi_overall,
                pm25_aqi, pm10_aqi, no2_aqi, co_aqi, o3_aqi, so2_aqi,
                dominant_pollutant, "timestamp"
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {AQI_COLUMNS}
            "#
        );
        let s = &record.sub_indices;

        let row = sqlx::query_as::<_, AqiRow>(&sql)
            .bind(record.sensor_id)
            .bind(record.reading_id)
            .bind(record.overall)
            .bind(s.pm25)
            .bind(s.pm10)
            .bind(s.no2)
            .bind(s.co)
            .bind(s.o3)
            .bind(s.so2)
            .bind(&record.dominant_pollutant)
            .bind(record.computed_at)
            .fetch_one(self.pool())
            .await?;

        Ok(AqiRecord::from(row))
    }

    #[instrument(skip(self))]
    pub async fn fetch_recent_aqi(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> DbResult<Vec<AqiRecord>> {
        let sql = format!(
            r#"
            SELECT {AQI_COLUMNS} FROM aqi_calculations
            WHERE sensor_id = $1 AND "timestamp" > $2
            ORDER BY "timestamp" DESC, id DESC
            LIMIT $3
            "#
        );

        let rows = sqlx::query_as::<_, AqiRow>(&sql)
            .bind(sensor_id)
            .bind(since)
            .bind(limit_param(limit))
            .fetch_all(self.pool())
            .await?;

        Ok(rows.into_iter().map(AqiRecord::from).collect())
    }

    /// Insert a whole forecast batch in one transaction so readers never
    /// see a partial batch as the latest generation
    #[instrument(skip(self, batch), fields(rows = batch.len()))]
    pub async fn insert_forecast_rows(&self, batch: &[NewForecast]) -> DbResult<Vec<ForecastRecord>> {
        let sql = format!(
            r#"
            INSERT INTO forecasts (
                sensor_id, forecast_hour, predicted_aqi, confidence,
                model_version, created_at, valid_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {FORECAST_COLUMNS}
            "#
        );

        let mut tx = self.pool().begin().await?;
        let mut inserted = Vec::with_capacity(batch.len());
        for forecast in batch {
            let hour = i32::try_from(forecast.hour)
                .map_err(|_| DbError::Decode(format!("forecast hour {}", forecast.hour)))?;
            let row = sqlx::query_as::<_, ForecastRow>(&sql)
                .bind(forecast.sensor_id)
                .bind(hour)
                .bind(forecast.predicted_aqi)
                .bind(forecast.confidence)
                .bind(&forecast.model_version)
                .bind(forecast.generated_at)
                .bind(forecast.valid_at)
                .fetch_one(&mut *tx)
                .await?;
            inserted.push(ForecastRecord::try_from(row)?);
        }
        tx.commit().await?;

        debug!("Inserted {} forecast rows", inserted.len());
        Ok(inserted)
    }

    #[instrument(skip(self))]
    pub async fn fetch_latest_forecasts(
        &self,
        sensor_id: SensorId,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<ForecastRecord>> {
        let sql = format!(
            r#"
            SELECT {FORECAST_COLUMNS} FROM forecasts
            WHERE sensor_id = $1
              AND created_at = (SELECT MAX(created_at) FROM forecasts WHERE sensor_id = $1)
              AND valid_at > $2
            ORDER BY forecast_hour ASC
            "#
        );

        let rows = sqlx::query_as::<_, ForecastRow>(&sql)
            .bind(sensor_id)
            .bind(now)
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(ForecastRecord::try_from).collect()
    }

    #[instrument(skip(self))]
    pub async fn delete_forecast_rows_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM forecasts WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await?;

        let deleted = result.rows_affected();
        debug!("Deleted {} forecast rows generated before {}", deleted, cutoff);
        Ok(deleted)
    }

    #[instrument(skip(self, alert), fields(sensor_id = alert.sensor_id, kind = %alert.kind))]
    pub async fn insert_alert_row(&self, alert: &NewAlert) -> DbResult<Alert> {
        let sql = format!(
            r#"
            INSERT INTO alerts (
                sensor_id, alert_type, aqi_level, pollutant,
                severity, message, is_active, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
            RETURNING {ALERT_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(alert.sensor_id)
            .bind(alert.kind.as_str())
            .bind(alert.aqi_level)
            .bind(&alert.pollutant)
            .bind(alert.severity.to_string())
            .bind(&alert.message)
            .bind(alert.created_at)
            .fetch_one(self.pool())
            .await?;

        Alert::try_from(row)
    }

    #[instrument(skip(self))]
    pub async fn fetch_active_alerts(
        &self,
        sensor_id: Option<SensorId>,
        kind: Option<AlertKind>,
    ) -> DbResult<Vec<Alert>> {
        let sql = format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM alerts
            WHERE is_active = TRUE
              AND ($1::INTEGER IS NULL OR sensor_id = $1)
              AND ($2::TEXT IS NULL OR alert_type = $2)
            ORDER BY created_at DESC, id DESC
            "#
        );

        let rows = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(sensor_id)
            .bind(kind.map(|k| k.as_str()))
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(Alert::try_from).collect()
    }

    /// Only touches rows that are still active, so resolving twice is a no-op
    #[instrument(skip(self))]
    pub async fn resolve_alert_row(
        &self,
        alert_id: i64,
        at: DateTime<Utc>,
    ) -> DbResult<Option<Alert>> {
        let sql = format!(
            r#"
            UPDATE alerts SET is_active = FALSE, resolved_at = $2
            WHERE id = $1 AND is_active = TRUE
            RETURNING {ALERT_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(alert_id)
            .bind(at)
            .fetch_optional(self.pool())
            .await?;

        row.map(Alert::try_from).transpose()
    }

    #[instrument(skip(self))]
    pub async fn fetch_alerts_since(
        &self,
        sensor_id: Option<SensorId>,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<Alert>> {
        let sql = format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM alerts
            WHERE created_at > $2
              AND ($1::INTEGER IS NULL OR sensor_id = $1)
            ORDER BY created_at DESC, id DESC
            "#
        );

        let rows = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(sensor_id)
            .bind(since)
            .fetch_all(self.pool())
            .await?;

        rows.into_iter().map(Alert::try_from).collect()
    }

    /// Requires a unique index on `sensor_health(sensor_id)`
    #[instrument(skip(self, health), fields(sensor_id = health.sensor_id, status = %health.status))]
    pub async fn upsert_health_row(&self, health: &SensorHealth) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sensor_health (sensor_id, last_reading_at, status, error_count, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (sensor_id) DO UPDATE SET
                last_reading_at = EXCLUDED.last_reading_at,
                status = EXCLUDED.status,
                error_count = EXCLUDED.error_count,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(health.sensor_id)
        .bind(health.last_reading_at)
        .bind(health.status.to_string())
        .bind(health.error_count)
        .bind(health.updated_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn fetch_health(&self, sensor_id: SensorId) -> DbResult<Option<SensorHealth>> {
        let row = sqlx::query_as::<_, SensorHealthRow>(
            r#"
            SELECT sensor_id, last_reading_at, status, error_count, updated_at
            FROM sensor_health WHERE sensor_id = $1
            "#,
        )
        .bind(sensor_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(SensorHealth::try_from).transpose()
    }

    #[instrument(skip(self))]
    pub async fn count_health_by_status(&self) -> DbResult<Vec<(HealthStatus, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count FROM sensor_health GROUP BY status
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| -> DbResult<(HealthStatus, i64)> {
                let status: String = row.try_get("status")?;
                let count: i64 = row.try_get("count")?;
                Ok((status.parse().map_err(DbError::Decode)?, count))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl SensorDirectory for DbClient {
    async fn list_sensors(&self, active_only: bool) -> StoreResult<Vec<Sensor>> {
        Ok(self.fetch_sensors(active_only).await?)
    }
}

#[async_trait::async_trait]
impl ReadingStore for DbClient {
    async fn insert_reading(&self, reading: &NewReading) -> StoreResult<Reading> {
        Ok(self.insert_reading_row(reading).await?)
    }

    async fn recent_readings(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Reading>> {
        Ok(self.fetch_recent_readings(sensor_id, since, limit).await?)
    }

    async fn latest_reading_at(&self, sensor_id: SensorId) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.fetch_latest_reading_at(sensor_id).await?)
    }

    async fn readings_without_aqi(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Reading>> {
        Ok(self.fetch_readings_without_aqi(sensor_id, since).await?)
    }
}

#[async_trait::async_trait]
impl AqiStore for DbClient {
    async fn insert_aqi(&self, record: &NewAqiRecord) -> StoreResult<AqiRecord> {
        Ok(self.insert_aqi_row(record).await?)
    }

    async fn recent_aqi(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<AqiRecord>> {
        Ok(self.fetch_recent_aqi(sensor_id, since, limit).await?)
    }
}

#[async_trait::async_trait]
impl ForecastStore for DbClient {
    async fn insert_forecasts(&self, batch: &[NewForecast]) -> StoreResult<Vec<ForecastRecord>> {
        Ok(self.insert_forecast_rows(batch).await?)
    }

    async fn latest_forecasts(
        &self,
        sensor_id: SensorId,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ForecastRecord>> {
        Ok(self.fetch_latest_forecasts(sensor_id, now).await?)
    }

    async fn delete_forecasts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self.delete_forecast_rows_before(cutoff).await?)
    }
}

#[async_trait::async_trait]
impl AlertLedger for DbClient {
    async fn insert_alert(&self, alert: &NewAlert) -> StoreResult<Alert> {
        Ok(self.insert_alert_row(alert).await?)
    }

    async fn active_alerts(
        &self,
        sensor_id: Option<SensorId>,
        kind: Option<AlertKind>,
    ) -> StoreResult<Vec<Alert>> {
        Ok(self.fetch_active_alerts(sensor_id, kind).await?)
    }

    async fn resolve_alert(&self, alert_id: i64, at: DateTime<Utc>) -> StoreResult<Option<Alert>> {
        Ok(self.resolve_alert_row(alert_id, at).await?)
    }

    async fn alerts_since(
        &self,
        sensor_id: Option<SensorId>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Alert>> {
        Ok(self.fetch_alerts_since(sensor_id, since).await?)
    }
}

#[async_trait::async_trait]
impl HealthStore for DbClient {
    async fn upsert_health(&self, health: &SensorHealth) -> StoreResult<()> {
        Ok(self.upsert_health_row(health).await?)
    }

    async fn get_health(&self, sensor_id: SensorId) -> StoreResult<Option<SensorHealth>> {
        Ok(self.fetch_health(sensor_id).await?)
    }

    async fn health_counts(&self) -> StoreResult<Vec<(HealthStatus, i64)>> {
        Ok(self.count_health_by_status().await?)
    }
}
