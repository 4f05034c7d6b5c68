//! Core data types for sensors, readings, and derived records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sensor primary key
pub type SensorId = i32;

/// Fixed geographic sensor, provisioned outside the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sensor {
    pub id: SensorId,
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_active: bool,
}

/// Pollutants in AQI evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
    No2,
    Co,
    O3,
    So2,
}

impl Pollutant {
    /// Evaluation order; ties in the maximum rule go to the earliest entry
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::No2,
        Pollutant::Co,
        Pollutant::O3,
        Pollutant::So2,
    ];

    /// Display name stored as the dominant pollutant
    pub fn label(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
            Pollutant::No2 => "NO₂",
            Pollutant::Co => "CO",
            Pollutant::O3 => "O₃",
            Pollutant::So2 => "SO₂",
        }
    }

    /// Column-style key
    pub fn key(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::No2 => "no2",
            Pollutant::Co => "co",
            Pollutant::O3 => "o3",
            Pollutant::So2 => "so2",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pollutant concentrations; each value is independently optional
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Concentrations {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub co: Option<f64>,
    pub o3: Option<f64>,
    pub so2: Option<f64>,
}

impl Concentrations {
    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::Pm25 => self.pm25,
            Pollutant::Pm10 => self.pm10,
            Pollutant::No2 => self.no2,
            Pollutant::Co => self.co,
            Pollutant::O3 => self.o3,
            Pollutant::So2 => self.so2,
        }
    }

    pub fn set(&mut self, pollutant: Pollutant, value: Option<f64>) {
        let slot = match pollutant {
            Pollutant::Pm25 => &mut self.pm25,
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::No2 => &mut self.no2,
            Pollutant::Co => &mut self.co,
            Pollutant::O3 => &mut self.o3,
            Pollutant::So2 => &mut self.so2,
        };
        *slot = value;
    }

    pub fn is_empty(&self) -> bool {
        Pollutant::ALL.iter().all(|p| self.get(*p).is_none())
    }
}

/// Ambient weather metrics reported alongside a reading
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Ambient {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// Whether concentrations were measured or backed out of a provider AQI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcentrationSource {
    Measured,
    Estimated,
}

impl fmt::Display for ConcentrationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcentrationSource::Measured => write!(f, "measured"),
            ConcentrationSource::Estimated => write!(f, "estimated"),
        }
    }
}

impl FromStr for ConcentrationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "measured" => Ok(ConcentrationSource::Measured),
            "estimated" => Ok(ConcentrationSource::Estimated),
            _ => Err(format!("unknown concentration source: {s}")),
        }
    }
}

/// Reading about to be written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewReading {
    pub sensor_id: SensorId,
    pub recorded_at: DateTime<Utc>,
    pub concentrations: Concentrations,
    pub ambient: Ambient,
    pub source: ConcentrationSource,
}

/// Persisted measurement snapshot; immutable once written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub id: i64,
    pub sensor_id: SensorId,
    pub recorded_at: DateTime<Utc>,
    pub concentrations: Concentrations,
    pub ambient: Ambient,
    pub source: ConcentrationSource,
}

/// Per-pollutant sub-indices as stored alongside the overall AQI
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubIndices {
    pub pm25: Option<i32>,
    pub pm10: Option<i32>,
    pub no2: Option<i32>,
    pub co: Option<i32>,
    pub o3: Option<i32>,
    pub so2: Option<i32>,
}

impl SubIndices {
    pub fn get(&self, pollutant: Pollutant) -> Option<i32> {
        match pollutant {
            Pollutant::Pm25 => self.pm25,
            Pollutant::Pm10 => self.pm10,
            Pollutant::No2 => self.no2,
            Pollutant::Co => self.co,
            Pollutant::O3 => self.o3,
            Pollutant::So2 => self.so2,
        }
    }
}

/// AQI record about to be written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAqiRecord {
    pub sensor_id: SensorId,
    pub reading_id: Option<i64>,
    pub overall: i32,
    pub sub_indices: SubIndices,
    pub dominant_pollutant: String,
    pub computed_at: DateTime<Utc>,
}

/// AQI derived from exactly one reading; never mutated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AqiRecord {
    pub id: i64,
    pub sensor_id: SensorId,
    pub reading_id: Option<i64>,
    pub overall: i32,
    pub sub_indices: SubIndices,
    pub dominant_pollutant: String,
    pub computed_at: DateTime<Utc>,
}

/// One hourly forecast point produced by the generator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub hour: u32,
    pub predicted_aqi: i32,
    pub confidence: f64,
    pub valid_at: DateTime<Utc>,
}

/// Forecast row about to be written; a batch shares `generated_at`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewForecast {
    pub sensor_id: SensorId,
    pub hour: u32,
    pub predicted_aqi: i32,
    pub confidence: f64,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
    pub valid_at: DateTime<Utc>,
}

/// Persisted forecast row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastRecord {
    pub id: i64,
    pub sensor_id: SensorId,
    pub hour: u32,
    pub predicted_aqi: i32,
    pub confidence: f64,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
    pub valid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Threshold,
    Spike,
    SensorHealth,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Threshold => "threshold",
            AlertKind::Spike => "spike",
            AlertKind::SensorHealth => "sensor_health",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(AlertKind::Threshold),
            "spike" => Ok(AlertKind::Spike),
            "sensor_health" => Ok(AlertKind::SensorHealth),
            _ => Err(format!("unknown alert type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Alert about to be opened
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAlert {
    pub sensor_id: SensorId,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub aqi_level: Option<i32>,
    pub pollutant: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Alert ledger entry. Only `is_active`/`resolved_at` ever change, and only
/// from active to resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: i64,
    pub sensor_id: SensorId,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub aqi_level: Option<i32>,
    pub pollutant: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Active,
    Stale,
    Offline,
    Error,
}

impl HealthStatus {
    pub const ALL: [HealthStatus; 4] = [
        HealthStatus::Active,
        HealthStatus::Stale,
        HealthStatus::Offline,
        HealthStatus::Error,
    ];
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Active => write!(f, "active"),
            HealthStatus::Stale => write!(f, "stale"),
            HealthStatus::Offline => write!(f, "offline"),
            HealthStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(HealthStatus::Active),
            "stale" => Ok(HealthStatus::Stale),
            "offline" => Ok(HealthStatus::Offline),
            "error" => Ok(HealthStatus::Error),
            _ => Err(format!("unknown health status: {s}")),
        }
    }
}

/// Current health of one sensor, overwritten on every check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorHealth {
    pub sensor_id: SensorId,
    pub status: HealthStatus,
    pub error_count: i32,
    pub last_reading_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concentrations_get_set() {
        let mut c = Concentrations::default();
        assert!(c.is_empty());

        c.set(Pollutant::O3, Some(42.0));
        assert_eq!(c.get(Pollutant::O3), Some(42.0));
        assert_eq!(c.get(Pollutant::Pm25), None);
        assert!(!c.is_empty());
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!(AlertKind::SensorHealth.to_string(), "sensor_health");
        assert_eq!("spike".parse::<AlertKind>(), Ok(AlertKind::Spike));
        assert_eq!("CRITICAL".parse::<Severity>(), Ok(Severity::Critical));
        assert_eq!(HealthStatus::Stale.to_string(), "stale");
        assert!("bogus".parse::<HealthStatus>().is_err());
        assert_eq!(
            "estimated".parse::<ConcentrationSource>(),
            Ok(ConcentrationSource::Estimated)
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_reading_serde() {
        let json = r#"{"pm25":12.5,"pm10":null,"no2":null,"co":0.4,"o3":null,"so2":null}"#;
        let c: Concentrations = serde_json::from_str(json).unwrap();

        assert_eq!(c.pm25, Some(12.5));
        assert_eq!(c.pm10, None);
        assert_eq!(c.co, Some(0.4));
    }
}
