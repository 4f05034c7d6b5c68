//! AQI forecast generation
//!
//! Exponential smoothing for the level, least-squares slope over the most
//! recent points for the trend, and a piecewise dampening law that shrinks
//! the trend's influence as the horizon grows. Pure over its input.

use crate::aqi::compute_aqi;
use crate::params::ForecastParams;
use crate::types::{Concentrations, ForecastPoint};
use chrono::{DateTime, Duration, Utc};

/// Time-ordered (oldest first) history fed to the generator
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastHistory {
    /// Precomputed overall AQI values
    Aqi(Vec<f64>),
    /// Raw concentrations, mapped through the AQI engine first
    Raw(Vec<Concentrations>),
}

impl ForecastHistory {
    pub fn len(&self) -> usize {
        match self {
            ForecastHistory::Aqi(values) => values.len(),
            ForecastHistory::Raw(readings) => readings.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn aqi_values(&self) -> Vec<f64> {
        match self {
            ForecastHistory::Aqi(values) => values.clone(),
            ForecastHistory::Raw(readings) => readings
                .iter()
                .map(|c| compute_aqi(c).overall as f64)
                .collect(),
        }
    }
}

/// `s[0] = v[0]; s[i] = alpha * v[i] + (1 - alpha) * s[i-1]`
pub fn exponential_smoothing(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut smoothed: Vec<f64> = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let next = match i {
            0 => *value,
            _ => alpha * value + (1.0 - alpha) * smoothed[i - 1],
        };
        smoothed.push(next);
    }
    smoothed
}

/// Ordinary least squares slope of value against index over the last
/// `window` points; 0 with fewer than two points
pub fn trend_slope(values: &[f64], window: usize) -> f64 {
    let recent = &values[values.len().saturating_sub(window)..];
    let n = recent.len();
    if n < 2 {
        return 0.0;
    }

    let n_f = n as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in recent.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let denominator = n_f * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    (n_f * sum_xy - sum_x * sum_y) / denominator
}

/// `clamp(1 - (stddev / mean) / 2, min, max)` over the whole history
pub fn base_confidence(values: &[f64], params: &ForecastParams) -> f64 {
    if values.len() < 2 {
        return 0.5;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let divisor = if mean == 0.0 { 1.0 } else { mean };
    let cv = std_dev / divisor;
    (1.0 - cv / 2.0).clamp(params.base_confidence_min, params.base_confidence_max)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Generate hourly forecasts for hours `1..=horizon_hours`.
///
/// Returns an empty batch when the history has fewer than `min_history`
/// points. Every point's `valid_at` is anchored on the same `now`.
pub fn generate_forecast(
    history: &ForecastHistory,
    params: &ForecastParams,
    now: DateTime<Utc>,
) -> Vec<ForecastPoint> {
    if history.len() < params.min_history {
        return Vec::new();
    }

    let values = history.aqi_values();
    let smoothed = exponential_smoothing(&values, params.alpha);
    let trend = trend_slope(&values, params.trend_window);
    let confidence = base_confidence(&values, params);
    let last_smoothed = match smoothed.last() {
        Some(v) => *v,
        None => return Vec::new(),
    };

    (1..=params.horizon_hours)
        .map(|hour| {
            let h = hour as f64;
            let dampening = params.dampening_factor(hour);
            let predicted = (last_smoothed + trend * h * dampening).round().max(0.0);
            let horizon_confidence =
                (confidence - h * params.confidence_decay_per_hour).max(params.confidence_floor);

            ForecastPoint {
                hour,
                predicted_aqi: predicted as i32,
                confidence: round2(horizon_confidence),
                valid_at: now + Duration::hours(hour as i64),
            }
        })
        .collect()
}
