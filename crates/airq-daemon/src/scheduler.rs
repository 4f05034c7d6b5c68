//! Ingestion, forecast, and health cycles plus the timers that drive them

use crate::config::DaemonConfig;
use crate::cycle::{CycleFlag, RotationCursor};
use airq_core::{EngineParams, HealthStatus, Sensor, Store};
use airq_ingest::DataSource;
use airq_services::{AlertEvaluator, AqiService, ForecastService, HealthMonitor};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const SYNTHETIC_STARTUP_DELAY: Duration = Duration::from_secs(2);
pub const PROVIDER_STARTUP_DELAY: Duration = Duration::from_secs(10);
pub const FORECAST_STARTUP_DELAY: Duration = Duration::from_secs(30);
pub const HEALTH_STARTUP_DELAY: Duration = Duration::from_secs(60);

/// Outcome of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleReport {
    /// Another cycle of the same kind was still in flight
    Skipped,
    /// The sensor list could not be loaded
    Failed,
    Completed { attempted: usize, succeeded: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Ingestion,
    Forecast,
    HealthSweep,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub max_sensors_per_cycle: usize,
    pub request_delay: Duration,
    pub alerts_enabled: bool,
}

impl From<&DaemonConfig> for SchedulerOptions {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            max_sensors_per_cycle: config.max_sensors_per_cycle,
            request_delay: config.request_delay,
            alerts_enabled: config.enable_alerts,
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    source: Arc<dyn DataSource>,
    aqi: AqiService,
    alerts: Option<AlertEvaluator>,
    forecasts: ForecastService,
    health: HealthMonitor,
    options: SchedulerOptions,
    ingest_flag: CycleFlag,
    forecast_flag: CycleFlag,
    health_flag: CycleFlag,
    cursor: Mutex<RotationCursor>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn DataSource>,
        params: &EngineParams,
        options: SchedulerOptions,
    ) -> Self {
        let alerts = options
            .alerts_enabled
            .then(|| AlertEvaluator::new(store.clone(), params.alerts.clone()));

        Self {
            aqi: AqiService::new(store.clone()),
            forecasts: ForecastService::new(store.clone(), params.forecast.clone()),
            health: HealthMonitor::new(store.clone(), params.alerts.stale_minutes),
            alerts,
            store,
            source,
            options,
            ingest_flag: CycleFlag::new(),
            forecast_flag: CycleFlag::new(),
            health_flag: CycleFlag::new(),
            cursor: Mutex::new(RotationCursor::new()),
        }
    }

    pub async fn run_job(&self, job: Job) -> CycleReport {
        match job {
            Job::Ingestion => self.run_ingestion_cycle().await,
            Job::Forecast => self.run_forecast_cycle().await,
            Job::HealthSweep => self.run_health_sweep().await,
        }
    }

    /// Fetch, store, and score one reading per selected sensor. Provider
    /// mode serves a rotating batch and pauses after every call.
    pub async fn run_ingestion_cycle(&self) -> CycleReport {
        let Some(_ticket) = self.ingest_flag.try_begin_cycle() else {
            warn!("Ingestion cycle already running, skipping this interval");
            return CycleReport::Skipped;
        };

        let sensors = match self.store.list_sensors(true).await {
            Ok(sensors) => sensors,
            Err(e) => {
                error!(error = %e, "Ingestion cycle failed to load sensors");
                return CycleReport::Failed;
            }
        };
        if sensors.is_empty() {
            info!("No active sensors found, skipping");
            return CycleReport::Completed {
                attempted: 0,
                succeeded: 0,
            };
        }

        let external = self.source.is_external();
        let batch = if external {
            self.cursor
                .lock()
                .await
                .next_batch(&sensors, self.options.max_sensors_per_cycle)
        } else {
            sensors
        };

        info!(source = self.source.name(), sensors = batch.len(), "Starting ingestion cycle");
        let mut succeeded = 0;
        for sensor in &batch {
            match self.ingest_sensor(sensor).await {
                Ok(()) => succeeded += 1,
                Err(e) => warn!(device_id = %sensor.device_id, "Failed to update sensor: {e:#}"),
            }
            if external {
                tokio::time::sleep(self.options.request_delay).await;
            }
        }

        info!("Ingestion complete. Updated {}/{} sensors", succeeded, batch.len());
        CycleReport::Completed {
            attempted: batch.len(),
            succeeded,
        }
    }

    /// A sensor counts as updated once its reading is stored; scoring and
    /// alerting after that are best effort
    async fn ingest_sensor(&self, sensor: &Sensor) -> Result<()> {
        let now = Utc::now();
        let new_reading = self
            .source
            .fetch(sensor, now)
            .await
            .context("Failed to fetch reading")?;
        let reading = self
            .store
            .insert_reading(&new_reading)
            .await
            .context("Failed to store reading")?;

        let aqi = match self.aqi.record(&reading).await {
            Ok((result, _)) => result.overall,
            Err(e) => {
                warn!(sensor_id = sensor.id, error = %e, "Failed to store AQI record");
                return Ok(());
            }
        };
        debug!(sensor_id = sensor.id, aqi, "Stored reading");

        if let Some(alerts) = &self.alerts {
            alerts.run_alert_checks(sensor.id, aqi, now).await;
        }
        Ok(())
    }

    /// Forecast every active sensor, then purge expired batches
    pub async fn run_forecast_cycle(&self) -> CycleReport {
        let Some(_ticket) = self.forecast_flag.try_begin_cycle() else {
            warn!("Forecast cycle already running, skipping this interval");
            return CycleReport::Skipped;
        };

        let now = Utc::now();
        let report = match self.forecasts.generate_all(now).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Forecast cycle failed");
                return CycleReport::Failed;
            }
        };
        if let Err(e) = self.forecasts.purge_expired(now).await {
            warn!(error = %e, "Failed to purge expired forecasts");
        }

        CycleReport::Completed {
            attempted: report.attempted,
            succeeded: report.stored,
        }
    }

    /// Refresh sensor health; `succeeded` counts sensors found active.
    /// Raises sensor-health alerts when alerting is on.
    pub async fn run_health_sweep(&self) -> CycleReport {
        let Some(_ticket) = self.health_flag.try_begin_cycle() else {
            warn!("Health sweep already running, skipping this interval");
            return CycleReport::Skipped;
        };

        let now = Utc::now();
        let results = match self.health.check_all(now).await {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "Health sweep failed");
                return CycleReport::Failed;
            }
        };

        if let Some(alerts) = &self.alerts {
            for health in &results {
                if let Err(e) = alerts.check_sensor_health(health.sensor_id, now).await {
                    warn!(sensor_id = health.sensor_id, error = %e, "Sensor health alert check failed");
                }
            }
        }

        let active = results
            .iter()
            .filter(|h| h.status == HealthStatus::Active)
            .count();
        info!("Health sweep complete. {}/{} sensors active", active, results.len());
        CycleReport::Completed {
            attempted: results.len(),
            succeeded: active,
        }
    }

    /// Run `job` every `period` after `startup_delay`. Each tick spawns its
    /// cycle, so a slow cycle makes the next tick skip rather than wait.
    pub fn spawn_timer(
        self: &Arc<Self>,
        job: Job,
        startup_delay: Duration,
        period: Duration,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        info!(?job, ?period, "Scheduling timer");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + startup_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    let report = scheduler.run_job(job).await;
                    debug!(?job, ?report, "Cycle finished");
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airq_core::{
        AlertKind, Ambient, AqiStore, ConcentrationSource, Concentrations, NewAqiRecord,
        NewReading, ReadingStore, SensorId, Severity, SubIndices,
    };
    use airq_db::MemoryStore;
    use airq_ingest::{IngestError, IngestResult, SyntheticSource};
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::collections::HashSet;

    /// Fixed-level source that records call order and fails for chosen sensors
    struct ScriptedSource {
        external: bool,
        pm25: f64,
        failing: HashSet<SensorId>,
        calls: std::sync::Mutex<Vec<SensorId>>,
    }

    impl ScriptedSource {
        fn new(external: bool, pm25: f64, failing: &[SensorId]) -> Self {
            Self {
                external,
                pm25,
                failing: failing.iter().copied().collect(),
                calls: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<SensorId> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl DataSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_external(&self) -> bool {
            self.external
        }

        async fn fetch(&self, sensor: &Sensor, at: DateTime<Utc>) -> IngestResult<NewReading> {
            self.calls.lock().unwrap().push(sensor.id);
            if self.failing.contains(&sensor.id) {
                return Err(IngestError::ProviderStatus("call_limit_reached".to_string()));
            }
            Ok(NewReading {
                sensor_id: sensor.id,
                recorded_at: at,
                concentrations: Concentrations {
                    pm25: Some(self.pm25),
                    ..Default::default()
                },
                ambient: Ambient::default(),
                source: ConcentrationSource::Estimated,
            })
        }
    }

    fn sensor(id: SensorId, is_active: bool) -> Sensor {
        Sensor {
            id,
            device_id: format!("alm-{id:03}"),
            latitude: 43.25,
            longitude: 76.93,
            is_active,
        }
    }

    fn options(alerts_enabled: bool) -> SchedulerOptions {
        SchedulerOptions {
            max_sensors_per_cycle: 2,
            request_delay: Duration::from_secs(15),
            alerts_enabled,
        }
    }

    fn scheduler_with(
        sensors: Vec<Sensor>,
        source: Arc<dyn DataSource>,
        alerts_enabled: bool,
    ) -> (Arc<MemoryStore>, Scheduler) {
        let store = Arc::new(MemoryStore::with_sensors(sensors));
        let dyn_store: Arc<dyn Store> = store.clone();
        let scheduler = Scheduler::new(
            dyn_store,
            source,
            &EngineParams::default(),
            options(alerts_enabled),
        );
        (store, scheduler)
    }

    #[tokio::test]
    async fn test_synthetic_cycle_updates_all_active_sensors() {
        let sensors = vec![sensor(1, true), sensor(2, false), sensor(3, true)];
        let (store, scheduler) =
            scheduler_with(sensors, Arc::new(SyntheticSource::seeded(7)), false);

        let report = scheduler.run_ingestion_cycle().await;
        assert_eq!(
            report,
            CycleReport::Completed {
                attempted: 2,
                succeeded: 2
            }
        );

        let readings = store.readings(1).await;
        assert_eq!(readings.len(), 1);
        let records = store.aqi_records(1).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reading_id, Some(readings[0].id));
        assert!(store.readings(2).await.is_empty());
        assert!(!scheduler.ingest_flag.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_rotation_with_delay_after_every_call() {
        let sensors = (1..=5).map(|id| sensor(id, true)).collect();
        let source = Arc::new(ScriptedSource::new(true, 12.0, &[2]));
        let (store, scheduler) = scheduler_with(sensors, source.clone(), false);

        let started = Instant::now();
        let first = scheduler.run_ingestion_cycle().await;
        assert_eq!(
            first,
            CycleReport::Completed {
                attempted: 2,
                succeeded: 1
            }
        );
        // the failed call is delayed too
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));

        scheduler.run_ingestion_cycle().await;
        scheduler.run_ingestion_cycle().await;
        assert_eq!(source.calls(), vec![1, 2, 3, 4, 5, 1]);
        assert_eq!(store.readings(1).await.len(), 2);
        assert!(store.readings(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_ingestion_is_skipped() {
        let source = Arc::new(ScriptedSource::new(false, 12.0, &[]));
        let (_store, scheduler) = scheduler_with(vec![sensor(1, true)], source.clone(), false);

        let ticket = scheduler.ingest_flag.try_begin_cycle();
        assert_eq!(scheduler.run_ingestion_cycle().await, CycleReport::Skipped);
        assert!(source.calls().is_empty());

        drop(ticket);
        assert!(matches!(
            scheduler.run_ingestion_cycle().await,
            CycleReport::Completed { succeeded: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_is_isolated_per_sensor() {
        let sensors = vec![sensor(1, true), sensor(2, true), sensor(3, true)];
        let (store, scheduler) =
            scheduler_with(sensors, Arc::new(SyntheticSource::seeded(3)), false);
        store.fail_sensor(2, true).await;

        assert_eq!(
            scheduler.run_ingestion_cycle().await,
            CycleReport::Completed {
                attempted: 3,
                succeeded: 2
            }
        );
        assert_eq!(store.readings(3).await.len(), 1);
    }

    #[tokio::test]
    async fn test_ingestion_raises_alerts_when_enabled() {
        // 150.5 ug/m3 PM2.5 scores 201
        let source = Arc::new(ScriptedSource::new(false, 150.5, &[]));
        let (store, scheduler) = scheduler_with(vec![sensor(1, true)], source.clone(), true);

        scheduler.run_ingestion_cycle().await;
        let alerts = store.all_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Threshold);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].aqi_level, Some(201));

        let (quiet_store, quiet) = scheduler_with(vec![sensor(1, true)], source, false);
        quiet.run_ingestion_cycle().await;
        assert!(quiet_store.all_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_forecast_cycle() {
        let (store, scheduler) = scheduler_with(
            vec![sensor(1, true), sensor(2, true)],
            Arc::new(SyntheticSource::seeded(1)),
            false,
        );
        let now = Utc::now();
        for h in 1..=6 {
            store
                .insert_aqi(&NewAqiRecord {
                    sensor_id: 1,
                    reading_id: None,
                    overall: 80,
                    sub_indices: SubIndices::default(),
                    dominant_pollutant: "PM2.5".to_string(),
                    computed_at: now - ChronoDuration::hours(h),
                })
                .await
                .unwrap();
        }

        assert_eq!(
            scheduler.run_forecast_cycle().await,
            CycleReport::Completed {
                attempted: 2,
                succeeded: 1
            }
        );
        assert_eq!(store.forecast_count().await, 168);
    }

    #[tokio::test]
    async fn test_health_sweep_raises_sensor_alerts() {
        let (store, scheduler) = scheduler_with(
            vec![sensor(1, true), sensor(2, true)],
            Arc::new(SyntheticSource::seeded(1)),
            true,
        );
        store
            .insert_reading(&NewReading {
                sensor_id: 1,
                recorded_at: Utc::now(),
                concentrations: Concentrations::default(),
                ambient: Ambient::default(),
                source: ConcentrationSource::Measured,
            })
            .await
            .unwrap();

        assert_eq!(
            scheduler.run_health_sweep().await,
            CycleReport::Completed {
                attempted: 2,
                succeeded: 1
            }
        );

        let alerts = store.all_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].sensor_id, 2);
        assert_eq!(alerts[0].kind, AlertKind::SensorHealth);
    }
}
