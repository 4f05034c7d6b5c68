//! Daemon configuration from environment variables

use airq_db::DEFAULT_MAX_CONNECTIONS;
use airq_ingest::DEFAULT_BASE_URL;
use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const MIN_SYNTHETIC_INTERVAL: Duration = Duration::from_secs(60);
const MIN_PROVIDER_INTERVAL: Duration = Duration::from_secs(300);
const MIN_REQUEST_DELAY: Duration = Duration::from_secs(15);
const MIN_FORECAST_INTERVAL: Duration = Duration::from_secs(3600);
const MIN_HEALTH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local store seeded with demo sensors
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Synthetic,
    AirVisual,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => bail!("Unknown STORAGE_BACKEND '{other}'"),
        }
    }
}

impl FromStr for IngestMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthetic" | "mock" => Ok(Self::Synthetic),
            "airvisual" | "iqair" => Ok(Self::AirVisual),
            other => bail!("Unknown DATA_SOURCE '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub storage: StorageBackend,

    /// PostgreSQL connection URL; required for the postgres backend
    pub database_url: Option<String>,
    pub db_pool_max: u32,

    pub data_source: IngestMode,
    pub airvisual_api_key: Option<String>,
    pub airvisual_base_url: String,

    pub max_sensors_per_cycle: usize,
    /// Pause after every provider call
    pub request_delay: Duration,

    pub refresh_interval: Duration,
    pub forecast_interval: Duration,
    pub health_interval: Duration,

    pub enable_forecasting: bool,
    pub enable_alerts: bool,
    pub enable_health_monitoring: bool,
}

impl DaemonConfig {
    /// Load configuration from environment variables, clamped to safe minimums
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| env::var(key).ok())?.clamped())
    }

    /// Parse from any key lookup; no clamping
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |keys: &[&str]| keys.iter().find_map(|&key| lookup(key));

        let storage: StorageBackend = get(&["STORAGE_BACKEND"])
            .unwrap_or_else(|| "postgres".to_string())
            .parse()?;

        let database_url = get(&["DATABASE_URL"]).filter(|url| !url.trim().is_empty());
        if storage == StorageBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL environment variable not set");
        }

        let db_pool_max = get(&["DB_POOL_MAX"])
            .unwrap_or_else(|| DEFAULT_MAX_CONNECTIONS.to_string())
            .parse()
            .context("Invalid DB_POOL_MAX")?;

        let data_source: IngestMode = get(&["DATA_SOURCE"])
            .unwrap_or_else(|| "synthetic".to_string())
            .parse()?;

        let airvisual_api_key = get(&["AIRVISUAL_API_KEY", "IQAIR_API_KEY"]);
        let airvisual_base_url =
            get(&["AIRVISUAL_BASE_URL"]).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let max_sensors_per_cycle = get(&["MAX_SENSORS_PER_CYCLE", "IQAIR_MAX_SENSORS_PER_CYCLE"])
            .unwrap_or_else(|| "3".to_string())
            .parse()
            .context("Invalid MAX_SENSORS_PER_CYCLE")?;

        let millis = |keys: &[&str], default: u64| -> Result<Duration> {
            let raw = get(keys).unwrap_or_else(|| default.to_string());
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: '{raw}'", keys[0]))?;
            Ok(Duration::from_millis(ms))
        };

        let flag = |key: &str| get(&[key]).map_or(true, |v| v != "false");

        Ok(Self {
            storage,
            database_url,
            db_pool_max,
            data_source,
            airvisual_api_key,
            airvisual_base_url,
            max_sensors_per_cycle,
            request_delay: millis(&["REQUEST_DELAY_MS", "IQAIR_REQUEST_DELAY_MS"], 60_000)?,
            refresh_interval: millis(
                &["SENSOR_DATA_REFRESH_INTERVAL_MS", "SENSOR_DATA_REFRESH_INTERVAL"],
                60_000,
            )?,
            forecast_interval: millis(
                &["FORECAST_GENERATION_INTERVAL_MS", "FORECAST_GENERATION_INTERVAL"],
                3_600_000,
            )?,
            health_interval: millis(
                &["SENSOR_HEALTH_CHECK_INTERVAL_MS", "SENSOR_HEALTH_CHECK_INTERVAL"],
                600_000,
            )?,
            enable_forecasting: flag("ENABLE_FORECASTING"),
            enable_alerts: flag("ENABLE_ALERTS"),
            enable_health_monitoring: flag("ENABLE_SENSOR_HEALTH_MONITORING"),
        })
    }

    /// Raise intervals below their floors; the provider floor applies in
    /// provider mode
    pub fn clamped(mut self) -> Self {
        let ingest_floor = match self.data_source {
            IngestMode::Synthetic => MIN_SYNTHETIC_INTERVAL,
            IngestMode::AirVisual => MIN_PROVIDER_INTERVAL,
        };
        self.refresh_interval = at_least("refresh interval", self.refresh_interval, ingest_floor);
        self.request_delay = at_least("request delay", self.request_delay, MIN_REQUEST_DELAY);
        self.forecast_interval =
            at_least("forecast interval", self.forecast_interval, MIN_FORECAST_INTERVAL);
        self.health_interval =
            at_least("health check interval", self.health_interval, MIN_HEALTH_INTERVAL);
        if self.max_sensors_per_cycle == 0 {
            warn!("MAX_SENSORS_PER_CYCLE of 0 raised to 1");
            self.max_sensors_per_cycle = 1;
        }
        self
    }
}

fn at_least(what: &str, value: Duration, floor: Duration) -> Duration {
    if value < floor {
        warn!(
            "Configured {what} of {}ms is below the {}ms minimum, using the minimum",
            value.as_millis(),
            floor.as_millis()
        );
        floor
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config =
            DaemonConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/airq")]))
                .unwrap();

        assert_eq!(config.storage, StorageBackend::Postgres);
        assert_eq!(config.db_pool_max, 10);
        assert_eq!(config.data_source, IngestMode::Synthetic);
        assert_eq!(config.airvisual_base_url, "http://api.airvisual.com/v2");
        assert_eq!(config.max_sensors_per_cycle, 3);
        assert_eq!(config.request_delay, Duration::from_secs(60));
        assert_eq!(config.refresh_interval, Duration::from_secs(60));
        assert_eq!(config.forecast_interval, Duration::from_secs(3600));
        assert_eq!(config.health_interval, Duration::from_secs(600));
        assert!(config.enable_forecasting && config.enable_alerts);
        assert!(config.enable_health_monitoring);
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = DaemonConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err.to_string(), "DATABASE_URL environment variable not set");

        let config = DaemonConfig::from_lookup(lookup(&[("STORAGE_BACKEND", "memory")])).unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_source_aliases() {
        for (value, mode) in [
            ("mock", IngestMode::Synthetic),
            ("iqair", IngestMode::AirVisual),
            ("AirVisual", IngestMode::AirVisual),
        ] {
            assert_eq!(value.parse::<IngestMode>().unwrap(), mode);
        }
        assert!("openaq".parse::<IngestMode>().is_err());
    }

    #[test]
    fn test_legacy_key_names() {
        let config = DaemonConfig::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "memory"),
            ("IQAIR_API_KEY", "secret"),
            ("IQAIR_MAX_SENSORS_PER_CYCLE", "5"),
            ("SENSOR_HEALTH_CHECK_INTERVAL", "120000"),
        ]))
        .unwrap();

        assert_eq!(config.airvisual_api_key.as_deref(), Some("secret"));
        assert_eq!(config.max_sensors_per_cycle, 5);
        assert_eq!(config.health_interval, Duration::from_secs(120));
    }

    #[test]
    fn test_only_literal_false_disables() {
        let config = DaemonConfig::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "memory"),
            ("ENABLE_ALERTS", "false"),
            ("ENABLE_FORECASTING", "0"),
            ("ENABLE_SENSOR_HEALTH_MONITORING", "FALSE"),
        ]))
        .unwrap();

        assert!(!config.enable_alerts);
        assert!(config.enable_forecasting);
        assert!(config.enable_health_monitoring);
    }

    #[test]
    fn test_invalid_number() {
        let err = DaemonConfig::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "memory"),
            ("REQUEST_DELAY_MS", "soon"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid REQUEST_DELAY_MS: 'soon'");
    }

    #[test]
    fn test_clamping() {
        let config = DaemonConfig::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "memory"),
            ("DATA_SOURCE", "airvisual"),
            ("SENSOR_DATA_REFRESH_INTERVAL_MS", "60000"),
            ("REQUEST_DELAY_MS", "1000"),
            ("MAX_SENSORS_PER_CYCLE", "0"),
            ("FORECAST_GENERATION_INTERVAL_MS", "60000"),
            ("SENSOR_HEALTH_CHECK_INTERVAL_MS", "5000"),
        ]))
        .unwrap()
        .clamped();

        assert_eq!(config.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.request_delay, Duration::from_secs(15));
        assert_eq!(config.max_sensors_per_cycle, 1);
        assert_eq!(config.forecast_interval, Duration::from_secs(3600));
        assert_eq!(config.health_interval, Duration::from_secs(60));

        let synthetic = DaemonConfig::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "memory"),
            ("SENSOR_DATA_REFRESH_INTERVAL_MS", "90000"),
        ]))
        .unwrap()
        .clamped();
        assert_eq!(synthetic.refresh_interval, Duration::from_secs(90));
    }
}
