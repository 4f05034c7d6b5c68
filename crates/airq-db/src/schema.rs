//! Row types for the PostgreSQL schema
//!
//! Tables are provisioned outside this crate and must carry at least these
//! columns. Older deployments that store sensor coordinates as `lat`/`lng`,
//! or lack `so2`, `source` or `reading_id`, need migrating first.
//!
//! ```text
//! sensors           id, device_id, latitude, longitude, is_active
//! sensor_readings   id, sensor_id, pm25, pm10, no2, co, o3, so2, temp, hum,
//!                   pressure, wind_speed, source, "timestamp"
//! aqi_calculations  id, sensor_id, reading_id (nullable), aqi_overall,
//!                   pm25_aqi .. so2_aqi, dominant_pollutant, "timestamp"
//! forecasts         id, sensor_id, forecast_hour, predicted_aqi, confidence,
//!                   model_version, created_at, valid_at
//! alerts            id, sensor_id, alert_type, aqi_level, pollutant, severity,
//!                   message, is_active, created_at, resolved_at
//! sensor_health     sensor_id (UNIQUE), last_reading_at, status,
//!                   error_count, updated_at
//! ```
//!
//! The `timestamp` columns are renamed on the Rust side.

use crate::DbError;
use airq_core::{
    Alert, Ambient, AqiRecord, Concentrations, ForecastRecord, Reading, Sensor, SensorHealth,
    SubIndices,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SensorRow {
    pub id: i32,
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_active: bool,
}

impl From<SensorRow> for Sensor {
    fn from(row: SensorRow) -> Self {
        Sensor {
            id: row.id,
            device_id: row.device_id,
            latitude: row.latitude,
            longitude: row.longitude,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReadingRow {
    pub id: i64,
    pub sensor_id: i32,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub co: Option<f64>,
    pub o3: Option<f64>,
    pub so2: Option<f64>,
    pub temp: Option<f64>,
    pub hum: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    /// `measured` or `estimated`
    pub source: String,
    #[sqlx(rename = "timestamp")]
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<ReadingRow> for Reading {
    type Error = DbError;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        Ok(Reading {
            id: row.id,
            sensor_id: row.sensor_id,
            recorded_at: row.recorded_at,
            concentrations: Concentrations {
                pm25: row.pm25,
                pm10: row.pm10,
                no2: row.no2,
                co: row.co,
                o3: row.o3,
                so2: row.so2,
            },
            ambient: Ambient {
                temperature: row.temp,
                humidity: row.hum,
                pressure: row.pressure,
                wind_speed: row.wind_speed,
            },
            source: row.source.parse().map_err(DbError::Decode)?,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AqiRow {
    pub id: i64,
    pub sensor_id: i32,
    pub reading_id: Option<i64>,
    pub aqi_overall: i32,
    pub pm25_aqi: Option<i32>,
    pub pm10_aqi: Option<i32>,
    pub no2_aqi: Option<i32>,
    pub co_aqi: Option<i32>,
    pub o3_aqi: Option<i32>,
    pub so2_aqi: Option<i32>,
    pub dominant_pollutant: Option<String>,
    #[sqlx(rename = "timestamp")]
    pub computed_at: DateTime<Utc>,
}

impl From<AqiRow> for AqiRecord {
    fn from(row: AqiRow) -> Self {
        AqiRecord {
            id: row.id,
            sensor_id: row.sensor_id,
            reading_id: row.reading_id,
            overall: row.aqi_overall,
            sub_indices: SubIndices {
                pm25: row.pm25_aqi,
                pm10: row.pm10_aqi,
                no2: row.no2_aqi,
                co: row.co_aqi,
                o3: row.o3_aqi,
                so2: row.so2_aqi,
            },
            dominant_pollutant: row
                .dominant_pollutant
                .unwrap_or_else(|| "Unknown".to_string()),
            computed_at: row.computed_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ForecastRow {
    pub id: i64,
    pub sensor_id: i32,
    pub forecast_hour: i32,
    pub predicted_aqi: i32,
    pub confidence: Option<f64>,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub valid_at: DateTime<Utc>,
}

impl TryFrom<ForecastRow> for ForecastRecord {
    type Error = DbError;

    fn try_from(row: ForecastRow) -> Result<Self, Self::Error> {
        let hour = u32::try_from(row.forecast_hour)
            .map_err(|_| DbError::Decode(format!("forecast_hour {}", row.forecast_hour)))?;

        Ok(ForecastRecord {
            id: row.id,
            sensor_id: row.sensor_id,
            hour,
            predicted_aqi: row.predicted_aqi,
            confidence: row.confidence.unwrap_or(0.0),
            model_version: row.model_version.unwrap_or_default(),
            generated_at: row.created_at,
            valid_at: row.valid_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: i64,
    pub sensor_id: i32,
    pub alert_type: String,
    pub aqi_level: Option<i32>,
    pub pollutant: Option<String>,
    pub severity: String,
    pub message: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = DbError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: row.id,
            sensor_id: row.sensor_id,
            kind: row.alert_type.parse().map_err(DbError::Decode)?,
            severity: row.severity.parse().map_err(DbError::Decode)?,
            message: row.message,
            aqi_level: row.aqi_level,
            pollutant: row.pollutant,
            is_active: row.is_active,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SensorHealthRow {
    pub sensor_id: i32,
    pub last_reading_at: Option<DateTime<Utc>>,
    pub status: String,
    pub error_count: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SensorHealthRow> for SensorHealth {
    type Error = DbError;

    fn try_from(row: SensorHealthRow) -> Result<Self, Self::Error> {
        Ok(SensorHealth {
            sensor_id: row.sensor_id,
            status: row.status.parse().map_err(DbError::Decode)?,
            error_count: row.error_count.unwrap_or(0),
            last_reading_at: row.last_reading_at,
            updated_at: row.updated_at,
        })
    }
}

pub mod tables {
    pub const SENSORS: &str = "sensors";
    pub const READINGS: &str = "sensor_readings";
    pub const AQI: &str = "aqi_calculations";
    pub const FORECASTS: &str = "forecasts";
    pub const ALERTS: &str = "alerts";
    pub const SENSOR_HEALTH: &str = "sensor_health";
}
