//! Alert evaluation against the persisted alert ledger
//!
//! Per (sensor, alert type) the lifecycle is none -> active -> resolved.
//! Resolved alerts are never reopened; a fresh crossing opens a new row.

use crate::{ServiceError, ServiceResult};
use airq_core::{Alert, AlertKind, AlertParams, NewAlert, SensorId, Severity, Store};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Severity for an AQI crossing, `None` below the high threshold
pub fn threshold_severity(aqi: i32, params: &AlertParams) -> Option<Severity> {
    if aqi >= params.critical_threshold {
        Some(Severity::Critical)
    } else if aqi >= params.high_threshold {
        Some(Severity::High)
    } else {
        None
    }
}

pub fn threshold_message(aqi: i32, severity: Severity) -> String {
    match severity {
        Severity::Critical => format!("CRITICAL: AQI has reached {aqi} - Air quality is hazardous"),
        _ => format!("WARNING: AQI has reached {aqi} - Air quality is unhealthy"),
    }
}

/// Percentage change from `previous` to `current`; `None` when `previous`
/// is zero
pub fn spike_percent(previous: i32, current: i32) -> Option<f64> {
    if previous == 0 {
        return None;
    }
    Some((current - previous) as f64 / previous as f64 * 100.0)
}

/// Severity for a reading gap of `minutes`, `None` while still fresh
pub fn staleness_severity(minutes: f64, stale_minutes: i64) -> Option<Severity> {
    let stale = stale_minutes as f64;
    if minutes > stale * 2.0 {
        Some(Severity::Critical)
    } else if minutes > stale {
        Some(Severity::Medium)
    } else {
        None
    }
}

pub(crate) fn minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_seconds() as f64 / 60.0
}

/// Alerts opened and resolved by one [`AlertEvaluator::run_alert_checks`]
#[derive(Debug, Default, Clone)]
pub struct AlertCheckReport {
    pub opened: Vec<Alert>,
    pub resolved: Vec<Alert>,
    /// Checks that hit a store error; the others still ran
    pub failed: usize,
}

impl AlertCheckReport {
    fn note_failure(&mut self, sensor_id: SensorId, check: &str, error: &ServiceError) {
        warn!(sensor_id, check, error = %error, "Alert check failed");
        self.failed += 1;
    }
}

pub struct AlertEvaluator {
    store: Arc<dyn Store>,
    params: AlertParams,
}

impl AlertEvaluator {
    pub fn new(store: Arc<dyn Store>, params: AlertParams) -> Self {
        Self { store, params }
    }

    pub fn params(&self) -> &AlertParams {
        &self.params
    }

    /// Open a threshold alert unless one is already active for the sensor
    #[instrument(skip(self, now))]
    pub async fn check_threshold(
        &self,
        sensor_id: SensorId,
        aqi: i32,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<Alert>> {
        let Some(severity) = threshold_severity(aqi, &self.params) else {
            return Ok(None);
        };

        let existing = self
            .store
            .active_alerts(Some(sensor_id), Some(AlertKind::Threshold))
            .await?;
        if !existing.is_empty() {
            debug!("Threshold alert already active for sensor {}", sensor_id);
            return Ok(None);
        }

        let alert = self
            .store
            .insert_alert(&NewAlert {
                sensor_id,
                kind: AlertKind::Threshold,
                severity,
                message: threshold_message(aqi, severity),
                aqi_level: Some(aqi),
                pollutant: None,
                created_at: now,
            })
            .await?;

        info!(sensor_id, aqi, %severity, "Threshold alert opened");
        Ok(Some(alert))
    }

    /// Compare `aqi` with the second most recent AQI record in the window
    #[instrument(skip(self, now))]
    pub async fn check_spike(
        &self,
        sensor_id: SensorId,
        aqi: i32,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<Alert>> {
        let since = now - Duration::minutes(self.params.spike_window_minutes);
        let recent = self.store.recent_aqi(sensor_id, since, 2).await?;
        if recent.len() < 2 {
            return Ok(None);
        }

        let previous = recent[1].overall;
        let Some(change) = spike_percent(previous, aqi) else {
            return Ok(None);
        };
        if change <= self.params.spike_threshold_percent {
            return Ok(None);
        }

        let alert = self
            .store
            .insert_alert(&NewAlert {
                sensor_id,
                kind: AlertKind::Spike,
                severity: Severity::High,
                message: format!(
                    "POLLUTION SPIKE: AQI increased by {change:.1}% (from {previous} to {aqi})"
                ),
                aqi_level: Some(aqi),
                pollutant: None,
                created_at: now,
            })
            .await?;

        info!(sensor_id, previous, aqi, "Spike alert opened");
        Ok(Some(alert))
    }

    /// Open a sensor-health alert when the sensor has gone quiet. Repeated
    /// calls open repeated alerts.
    #[instrument(skip(self, now))]
    pub async fn check_sensor_health(
        &self,
        sensor_id: SensorId,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<Alert>> {
        let (severity, message) = match self.store.latest_reading_at(sensor_id).await? {
            None => (
                Severity::Critical,
                "No readings received from sensor".to_string(),
            ),
            Some(last) => {
                let minutes = minutes_between(last, now);
                match staleness_severity(minutes, self.params.stale_minutes) {
                    Some(severity) => (
                        severity,
                        format!(
                            "Sensor offline: No reading for {} minutes",
                            minutes.round() as i64
                        ),
                    ),
                    None => return Ok(None),
                }
            }
        };

        let alert = self
            .store
            .insert_alert(&NewAlert {
                sensor_id,
                kind: AlertKind::SensorHealth,
                severity,
                message,
                aqi_level: None,
                pollutant: None,
                created_at: now,
            })
            .await?;

        info!(sensor_id, %severity, "Sensor health alert opened");
        Ok(Some(alert))
    }

    /// Resolve active threshold alerts once AQI is below the hysteresis band
    #[instrument(skip(self, now))]
    pub async fn auto_resolve(
        &self,
        sensor_id: SensorId,
        aqi: i32,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<Alert>> {
        if aqi >= self.params.resolve_below() {
            return Ok(Vec::new());
        }

        let active = self
            .store
            .active_alerts(Some(sensor_id), Some(AlertKind::Threshold))
            .await?;

        let mut resolved = Vec::new();
        for alert in active {
            if let Some(done) = self.store.resolve_alert(alert.id, now).await? {
                info!(sensor_id, alert_id = done.id, aqi, "Threshold alert resolved");
                resolved.push(done);
            }
        }
        Ok(resolved)
    }

    /// Threshold and spike checks plus auto-resolution for one fresh AQI
    /// value. Each step runs even when an earlier one fails.
    pub async fn run_alert_checks(
        &self,
        sensor_id: SensorId,
        aqi: i32,
        now: DateTime<Utc>,
    ) -> AlertCheckReport {
        let mut report = AlertCheckReport::default();

        match self.check_threshold(sensor_id, aqi, now).await {
            Ok(opened) => report.opened.extend(opened),
            Err(e) => report.note_failure(sensor_id, "threshold", &e),
        }
        match self.check_spike(sensor_id, aqi, now).await {
            Ok(opened) => report.opened.extend(opened),
            Err(e) => report.note_failure(sensor_id, "spike", &e),
        }
        match self.auto_resolve(sensor_id, aqi, now).await {
            Ok(resolved) => report.resolved = resolved,
            Err(e) => report.note_failure(sensor_id, "auto-resolve", &e),
        }

        report
    }

    pub async fn active_alerts(&self, sensor_id: Option<SensorId>) -> ServiceResult<Vec<Alert>> {
        Ok(self.store.active_alerts(sensor_id, None).await?)
    }

    /// Alerts created in the last `hours`, newest first
    pub async fn recent_alerts(
        &self,
        sensor_id: Option<SensorId>,
        hours: i64,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<Alert>> {
        let since = now - Duration::hours(hours);
        Ok(self.store.alerts_since(sensor_id, since).await?)
    }

    /// Manually resolve an alert; `None` if it was not active
    pub async fn resolve(&self, alert_id: i64, now: DateTime<Utc>) -> ServiceResult<Option<Alert>> {
        Ok(self.store.resolve_alert(alert_id, now).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_severity_bands() {
        let params = AlertParams::default();

        assert_eq!(threshold_severity(149, &params), None);
        assert_eq!(threshold_severity(150, &params), Some(Severity::High));
        assert_eq!(threshold_severity(199, &params), Some(Severity::High));
        assert_eq!(threshold_severity(200, &params), Some(Severity::Critical));
    }

    #[test]
    fn test_threshold_messages() {
        insta::assert_snapshot!(
            threshold_message(212, Severity::Critical),
            @"CRITICAL: AQI has reached 212 - Air quality is hazardous"
        );
        insta::assert_snapshot!(
            threshold_message(163, Severity::High),
            @"WARNING: AQI has reached 163 - Air quality is unhealthy"
        );
    }

    #[test]
    fn test_spike_percent_guards_zero() {
        assert_eq!(spike_percent(0, 80), None);
        assert_eq!(spike_percent(80, 100), Some(25.0));
        assert_eq!(spike_percent(100, 80), Some(-20.0));
    }

    #[test]
    fn test_staleness_severity() {
        assert_eq!(staleness_severity(15.0, 15), None);
        assert_eq!(staleness_severity(15.5, 15), Some(Severity::Medium));
        assert_eq!(staleness_severity(30.0, 15), Some(Severity::Medium));
        assert_eq!(staleness_severity(31.0, 15), Some(Severity::Critical));
    }
}
