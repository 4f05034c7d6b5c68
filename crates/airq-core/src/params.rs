//! Versioned tuning parameters shared by the forecast and alert components
//!
//! Every field has a default, so a partial TOML file only overrides what it
//! names. Tests construct these directly for deterministic behavior.

use serde::{Deserialize, Serialize};

/// Version tag of the default parameter set
pub const PARAMS_VERSION: &str = "2024.1";

/// All tunable constants of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    pub version: String,
    pub forecast: ForecastParams,
    pub alerts: AlertParams,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            version: PARAMS_VERSION.to_string(),
            forecast: ForecastParams::default(),
            alerts: AlertParams::default(),
        }
    }
}

/// One segment of the piecewise trend dampening law:
/// `max(floor, start - (h - offset_hour) * slope)` for `h <= until_hour`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DampeningStage {
    /// Last hour covered by this stage; `None` covers every later hour
    pub until_hour: Option<u32>,
    pub start: f64,
    pub offset_hour: u32,
    pub slope: f64,
    pub floor: f64,
}

impl DampeningStage {
    pub fn factor(&self, hour: u32) -> f64 {
        let elapsed = hour as f64 - self.offset_hour as f64;
        (self.start - elapsed * self.slope).max(self.floor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastParams {
    /// Exponential smoothing factor
    pub alpha: f64,
    /// Number of most recent points used for the regression slope
    pub trend_window: usize,
    pub horizon_hours: u32,
    /// Below this many history points no forecast is produced
    pub min_history: usize,
    pub history_hours: i64,
    pub history_limit: usize,
    pub base_confidence_min: f64,
    pub base_confidence_max: f64,
    pub confidence_floor: f64,
    pub confidence_decay_per_hour: f64,
    pub dampening: Vec<DampeningStage>,
    pub model_version: String,
    /// Forecast batches older than this are purged
    pub retention_days: i64,
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            trend_window: 12,
            horizon_hours: 168,
            min_history: 3,
            history_hours: 48,
            history_limit: 48,
            base_confidence_min: 0.1,
            base_confidence_max: 0.95,
            confidence_floor: 0.3,
            confidence_decay_per_hour: 0.002,
            dampening: vec![
                DampeningStage {
                    until_hour: Some(24),
                    start: 1.0,
                    offset_hour: 0,
                    slope: 0.02,
                    floor: 0.5,
                },
                DampeningStage {
                    until_hour: Some(72),
                    start: 0.8,
                    offset_hour: 24,
                    slope: 0.01,
                    floor: 0.3,
                },
                DampeningStage {
                    until_hour: None,
                    start: 0.5,
                    offset_hour: 72,
                    slope: 0.005,
                    floor: 0.1,
                },
            ],
            model_version: "1.0-ses-trend".to_string(),
            retention_days: 7,
        }
    }
}

impl ForecastParams {
    /// Dampening factor for a forecast hour; 1.0 when no stage matches
    pub fn dampening_factor(&self, hour: u32) -> f64 {
        self.dampening
            .iter()
            .find(|stage| stage.until_hour.map_or(true, |until| hour <= until))
            .map(|stage| stage.factor(hour))
            .unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertParams {
    pub critical_threshold: i32,
    pub high_threshold: i32,
    pub spike_threshold_percent: f64,
    pub spike_window_minutes: i64,
    pub stale_minutes: i64,
    /// Threshold alerts resolve once AQI drops below `high_threshold - resolve_margin`
    pub resolve_margin: i32,
}

impl Default for AlertParams {
    fn default() -> Self {
        Self {
            critical_threshold: 200,
            high_threshold: 150,
            spike_threshold_percent: 25.0,
            spike_window_minutes: 20,
            stale_minutes: 15,
            resolve_margin: 20,
        }
    }
}

impl AlertParams {
    pub fn resolve_below(&self) -> i32 {
        self.high_threshold - self.resolve_margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dampening_stages() {
        let params = ForecastParams::default();

        assert!((params.dampening_factor(1) - 0.98).abs() < 1e-9);
        assert!((params.dampening_factor(24) - 0.52).abs() < 1e-9);
        assert!((params.dampening_factor(25) - 0.79).abs() < 1e-9);
        assert!((params.dampening_factor(72) - 0.32).abs() < 1e-9);
        assert!((params.dampening_factor(73) - 0.495).abs() < 1e-9);
        assert!((params.dampening_factor(168) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_dampening_non_increasing_within_stage() {
        let params = ForecastParams::default();
        for (from, to) in [(1u32, 24u32), (25, 72), (73, 168)] {
            for h in from..to {
                assert!(params.dampening_factor(h + 1) <= params.dampening_factor(h));
            }
        }
    }

    #[test]
    fn test_partial_override() {
        let params: EngineParams =
            serde_json::from_str(r#"{"alerts":{"high_threshold":120}}"#).unwrap();

        assert_eq!(params.alerts.high_threshold, 120);
        assert_eq!(params.alerts.critical_threshold, 200);
        assert_eq!(params.forecast.alpha, 0.3);
        assert_eq!(params.version, PARAMS_VERSION);
        assert_eq!(params.alerts.resolve_below(), 100);
    }
}
