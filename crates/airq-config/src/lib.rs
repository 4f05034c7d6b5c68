//! TOML-backed tuning parameters for the pipeline daemon

use airq_core::{AlertParams, EngineParams, ForecastParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable naming the parameter file
pub const CONFIG_ENV: &str = "AIRQ_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "airq.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub engine: EngineParams,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid parameter: {0}")]
    Invalid(String),
}

impl AppConfig {
    /// Load from the AIRQ_CONFIG path if the file exists, defaults otherwise
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let cfg = if path.exists() {
            let s = fs::read_to_string(path)?;
            Self::from_toml_str(&s)?
        } else {
            AppConfig::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<AppConfig>(s)?)
    }

    /// Reject parameter sets the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_forecast(&self.engine.forecast)?;
        validate_alerts(&self.engine.alerts)
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

fn validate_forecast(p: &ForecastParams) -> Result<(), ConfigError> {
    if !(p.alpha > 0.0 && p.alpha <= 1.0) {
        return Err(invalid(format!("forecast.alpha must be in (0, 1], got {}", p.alpha)));
    }
    if p.horizon_hours == 0 {
        return Err(invalid("forecast.horizon_hours must be positive"));
    }
    if p.min_history == 0 || p.trend_window == 0 {
        return Err(invalid("forecast.min_history and forecast.trend_window must be at least 1"));
    }
    if p.history_hours <= 0 || p.history_limit == 0 {
        return Err(invalid("forecast history window must be positive"));
    }
    if p.base_confidence_min > p.base_confidence_max {
        return Err(invalid("forecast.base_confidence_min exceeds base_confidence_max"));
    }
    if !(0.0..=1.0).contains(&p.confidence_floor) {
        return Err(invalid("forecast.confidence_floor must be in [0, 1]"));
    }
    if p.retention_days <= 0 {
        return Err(invalid("forecast.retention_days must be positive"));
    }
    let negative = |rate: f64| rate < 0.0 || rate.is_nan();
    if negative(p.confidence_decay_per_hour) {
        return Err(invalid(format!(
            "forecast.confidence_decay_per_hour must not be negative, got {}",
            p.confidence_decay_per_hour
        )));
    }
    if let Some((i, stage)) = p
        .dampening
        .iter()
        .enumerate()
        .find(|(_, stage)| negative(stage.slope))
    {
        return Err(invalid(format!(
            "forecast.dampening[{i}].slope must not be negative, got {}",
            stage.slope
        )));
    }
    Ok(())
}

fn validate_alerts(p: &AlertParams) -> Result<(), ConfigError> {
    if p.critical_threshold < p.high_threshold {
        return Err(invalid(format!(
            "alerts.critical_threshold ({}) is below alerts.high_threshold ({})",
            p.critical_threshold, p.high_threshold
        )));
    }
    if p.resolve_margin < 0 {
        return Err(invalid("alerts.resolve_margin must not be negative"));
    }
    if p.spike_threshold_percent <= 0.0 {
        return Err(invalid("alerts.spike_threshold_percent must be positive"));
    }
    if p.spike_window_minutes <= 0 || p.stale_minutes <= 0 {
        return Err(invalid("alert time windows must be positive"));
    }
    Ok(())
}
