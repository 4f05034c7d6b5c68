//! Forecast service, health monitor, and AQI recompute over the in-memory store

use airq_core::{
    Ambient, AqiStore, ConcentrationSource, Concentrations, ForecastParams, HealthStatus,
    NewAqiRecord, NewReading, ReadingStore, Sensor, SensorId, Store, SubIndices,
};
use airq_db::MemoryStore;
use airq_services::{AqiService, ForecastRunReport, ForecastService, HealthMonitor, HealthSummary};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 3, 15, 0, 0).unwrap()
}

fn sensor(id: SensorId) -> Sensor {
    Sensor {
        id,
        device_id: format!("alm-{id:03}"),
        latitude: 43.2,
        longitude: 76.9,
        is_active: true,
    }
}

fn store_with(ids: &[SensorId]) -> (Arc<MemoryStore>, Arc<dyn Store>) {
    let store = Arc::new(MemoryStore::with_sensors(ids.iter().map(|id| sensor(*id)).collect()));
    let dyn_store: Arc<dyn Store> = store.clone();
    (store, dyn_store)
}

async fn add_aqi(store: &MemoryStore, sensor_id: SensorId, aqi: i32, at: DateTime<Utc>) {
    store
        .insert_aqi(&NewAqiRecord {
            sensor_id,
            reading_id: None,
            overall: aqi,
            sub_indices: SubIndices::default(),
            dominant_pollutant: "PM10".to_string(),
            computed_at: at,
        })
        .await
        .unwrap();
}

async fn add_reading(store: &MemoryStore, sensor_id: SensorId, pm25: f64, at: DateTime<Utc>) {
    store
        .insert_reading(&NewReading {
            sensor_id,
            recorded_at: at,
            concentrations: Concentrations {
                pm25: Some(pm25),
                ..Default::default()
            },
            ambient: Ambient::default(),
            source: ConcentrationSource::Measured,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_forecast_from_aqi_history() {
    let (store, dyn_store) = store_with(&[1]);
    for h in 1..=10 {
        add_aqi(&store, 1, 60, now() - Duration::hours(h)).await;
    }
    // outside the 48 hour window
    add_aqi(&store, 1, 400, now() - Duration::hours(60)).await;

    let service = ForecastService::new(dyn_store, ForecastParams::default());
    let points = service.generate_forecast(1, now()).await.unwrap();

    assert_eq!(points.len(), 168);
    assert!(points.iter().all(|p| p.predicted_aqi == 60));
    assert_eq!(store.forecast_count().await, 0);
}

#[tokio::test]
async fn test_forecast_falls_back_to_readings() {
    let (store, dyn_store) = store_with(&[1]);
    add_aqi(&store, 1, 300, now() - Duration::hours(1)).await;
    for m in [30, 20, 10] {
        add_reading(&store, 1, 12.0, now() - Duration::minutes(m)).await;
    }

    let service = ForecastService::new(dyn_store, ForecastParams::default());
    let points = service.generate_forecast(1, now()).await.unwrap();

    assert_eq!(points.len(), 168);
    assert_eq!(points[0].predicted_aqi, 50);
}

#[tokio::test]
async fn test_store_and_read_latest_batch() {
    let (store, dyn_store) = store_with(&[1]);
    for h in 1..=5 {
        add_aqi(&store, 1, 40 + h as i32, now() - Duration::hours(h)).await;
    }
    let service = ForecastService::new(dyn_store, ForecastParams::default());

    assert_eq!(service.generate_and_store(1, now()).await.unwrap(), 168);
    let next_run = now() + Duration::hours(1);
    assert_eq!(service.generate_and_store(1, next_run).await.unwrap(), 168);

    let latest = service.latest_forecasts(1, next_run).await.unwrap();
    assert_eq!(latest.len(), 168);
    assert!(latest.iter().all(|f| f.generated_at == next_run));
    assert!(latest.iter().all(|f| f.model_version == "1.0-ses-trend"));
    assert_eq!(latest[0].hour, 1);

    let purged = service.purge_expired(now() + Duration::days(7) + Duration::minutes(30)).await.unwrap();
    assert_eq!(purged, 168);
    assert_eq!(store.forecast_count().await, 168);
}

#[tokio::test]
async fn test_generate_all_isolates_failures() {
    let (store, dyn_store) = store_with(&[1, 2, 3]);
    for h in 1..=4 {
        add_aqi(&store, 1, 70, now() - Duration::hours(h)).await;
    }
    add_reading(&store, 2, 8.0, now() - Duration::minutes(5)).await;
    store.fail_sensor(3, true).await;

    let service = ForecastService::new(dyn_store, ForecastParams::default());
    let report = service.generate_all(now()).await.unwrap();

    assert_eq!(
        report,
        ForecastRunReport {
            attempted: 3,
            stored: 1,
            insufficient: 1,
            failed: 1,
        }
    );
}

#[tokio::test]
async fn test_health_sweep_and_summary() {
    let (store, dyn_store) = store_with(&[1, 2, 3, 4]);
    add_reading(&store, 1, 10.0, now() - Duration::minutes(3)).await;
    add_reading(&store, 4, 10.0, now() - Duration::minutes(22)).await;
    store.fail_sensor(3, true).await;

    let monitor = HealthMonitor::new(dyn_store, 15);
    let results = monitor.check_all(now()).await.unwrap();
    assert_eq!(results.len(), 4);

    let status_of = |id: SensorId| {
        results
            .iter()
            .find(|h| h.sensor_id == id)
            .map(|h| (h.status, h.error_count))
    };
    assert_eq!(status_of(1), Some((HealthStatus::Active, 0)));
    assert_eq!(status_of(2), Some((HealthStatus::Offline, 1)));
    assert_eq!(status_of(3), Some((HealthStatus::Error, 1)));
    assert_eq!(status_of(4), Some((HealthStatus::Stale, 0)));

    assert_eq!(
        monitor.summary().await.unwrap(),
        HealthSummary {
            active: 1,
            stale: 1,
            offline: 1,
            error: 1,
        }
    );

    // overwritten, not appended
    store.fail_sensor(3, false).await;
    add_reading(&store, 3, 10.0, now()).await;
    monitor.check_sensor(3, now()).await.unwrap();
    let health = monitor.get(3).await.unwrap().unwrap();
    assert_eq!(health.status, HealthStatus::Active);
    assert_eq!(health.error_count, 0);
}

#[tokio::test]
async fn test_recompute_missing_aqi() {
    let (store, dyn_store) = store_with(&[1]);
    for m in [30, 20, 10] {
        add_reading(&store, 1, 35.4, now() - Duration::minutes(m)).await;
    }
    let service = AqiService::new(dyn_store);

    let first = store.readings(1).await.remove(0);
    let (result, record) = service.record(&first).await.unwrap();
    assert_eq!(result.overall, 100);
    assert_eq!(record.reading_id, Some(first.id));

    let since = now() - Duration::hours(1);
    assert_eq!(service.recompute_missing(1, since).await.unwrap(), 2);
    assert_eq!(service.recompute_missing(1, since).await.unwrap(), 0);
    assert_eq!(store.aqi_records(1).await.len(), 3);
}
