//! Air quality daemon
//!
//! This binary coordinates:
//! - Reading ingestion from the synthetic generator or the AirVisual provider
//! - AQI scoring and alert evaluation per stored reading
//! - Periodic forecast generation and sensor health sweeps

mod config;
mod cycle;
mod scheduler;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use airq_config::AppConfig;
use airq_core::{Sensor, Store};
use airq_db::{DbClient, MemoryStore};
use airq_ingest::{AirVisualSource, DataSource, SyntheticSource};

use crate::config::{DaemonConfig, IngestMode, StorageBackend};
use crate::scheduler::{
    Job, Scheduler, SchedulerOptions, FORECAST_STARTUP_DELAY, HEALTH_STARTUP_DELAY,
    PROVIDER_STARTUP_DELAY, SYNTHETIC_STARTUP_DELAY,
};

#[tokio::main]
async fn main() -> Result<()> {
    airq_obs::init("airqd");
    info!("Starting air quality daemon");

    let config = DaemonConfig::from_env()?;
    info!(
        storage = ?config.storage,
        source = ?config.data_source,
        refresh_ms = config.refresh_interval.as_millis() as u64,
        forecasting = config.enable_forecasting,
        alerts = config.enable_alerts,
        health = config.enable_health_monitoring,
        "Loaded configuration"
    );

    let params = AppConfig::load()
        .context("Failed to load engine parameters")?
        .engine;
    info!(version = %params.version, "Loaded engine parameters");

    let store = open_store(&config).await?;

    let source: Arc<dyn DataSource> = match config.data_source {
        IngestMode::Synthetic => Arc::new(SyntheticSource::new()),
        IngestMode::AirVisual => Arc::new(
            AirVisualSource::new(
                config.airvisual_base_url.clone(),
                config.airvisual_api_key.clone(),
            )
            .context("Failed to create AirVisual client")?,
        ),
    };
    info!("Data source: {}", source.name());

    let ingest_delay = if source.is_external() {
        PROVIDER_STARTUP_DELAY
    } else {
        SYNTHETIC_STARTUP_DELAY
    };
    let scheduler = Arc::new(Scheduler::new(
        store,
        source,
        &params,
        SchedulerOptions::from(&config),
    ));

    let mut timers = vec![scheduler.spawn_timer(
        Job::Ingestion,
        ingest_delay,
        config.refresh_interval,
    )];
    if config.enable_forecasting {
        timers.push(scheduler.spawn_timer(
            Job::Forecast,
            FORECAST_STARTUP_DELAY,
            config.forecast_interval,
        ));
    } else {
        info!("Forecasting disabled");
    }
    if config.enable_health_monitoring {
        timers.push(scheduler.spawn_timer(
            Job::HealthSweep,
            HEALTH_STARTUP_DELAY,
            config.health_interval,
        ));
    } else {
        info!("Sensor health monitoring disabled");
    }

    info!("Daemon running - press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    for timer in &timers {
        timer.abort();
    }

    info!("Air quality daemon stopped");
    Ok(())
}

async fn open_store(config: &DaemonConfig) -> Result<Arc<dyn Store>> {
    match config.storage {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL environment variable not set")?;
            let db = DbClient::connect(url, config.db_pool_max)
                .await
                .context("Failed to connect to database")?;
            db.ping().await.context("Database ping failed")?;
            info!("Database connection verified");
            Ok(Arc::new(db))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage, data is lost on exit");
            Ok(Arc::new(MemoryStore::with_sensors(demo_sensors())))
        }
    }
}

/// Almaty district sensors for the in-memory backend
fn demo_sensors() -> Vec<Sensor> {
    [
        ("alm-001", 43.25, 76.93),
        ("alm-002", 43.23, 76.96),
        ("alm-003", 43.21, 76.91),
        ("alm-004", 43.24, 76.85),
        ("alm-005", 43.30, 76.80),
        ("alm-006", 43.32, 76.94),
        ("alm-007", 43.35, 76.98),
        ("alm-008", 43.19, 76.82),
    ]
    .into_iter()
    .zip(1..)
    .map(|((device_id, latitude, longitude), id)| Sensor {
        id,
        device_id: device_id.to_string(),
        latitude,
        longitude,
        is_active: true,
    })
    .collect()
}
