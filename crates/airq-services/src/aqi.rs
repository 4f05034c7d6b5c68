//! Persist AQI records derived from stored readings

use crate::ServiceResult;
use airq_core::{compute_aqi, AqiRecord, AqiResult, NewAqiRecord, Reading, SensorId, Store};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

/// Build the AQI row for a reading; stamped with the reading's time
pub fn aqi_record_for(reading: &Reading, result: &AqiResult) -> NewAqiRecord {
    NewAqiRecord {
        sensor_id: reading.sensor_id,
        reading_id: Some(reading.id),
        overall: result.overall,
        sub_indices: result.sub_indices(),
        dominant_pollutant: result.dominant_label().to_string(),
        computed_at: reading.recorded_at,
    }
}

pub struct AqiService {
    store: Arc<dyn Store>,
}

impl AqiService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Compute and persist the AQI of one stored reading
    #[instrument(skip(self, reading), fields(sensor_id = reading.sensor_id, reading_id = reading.id))]
    pub async fn record(&self, reading: &Reading) -> ServiceResult<(AqiResult, AqiRecord)> {
        let result = compute_aqi(&reading.concentrations);
        let record = self
            .store
            .insert_aqi(&aqi_record_for(reading, &result))
            .await?;
        Ok((result, record))
    }

    /// Fill AQI records for readings after `since` that have none, e.g.
    /// after a crash between the two inserts
    #[instrument(skip(self))]
    pub async fn recompute_missing(
        &self,
        sensor_id: SensorId,
        since: DateTime<Utc>,
    ) -> ServiceResult<usize> {
        let missing = self.store.readings_without_aqi(sensor_id, since).await?;
        for reading in &missing {
            self.record(reading).await?;
        }

        if !missing.is_empty() {
            info!(sensor_id, count = missing.len(), "Recomputed missing AQI records");
        }
        Ok(missing.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airq_core::{Ambient, ConcentrationSource, Concentrations};
    use chrono::TimeZone;

    #[test]
    fn test_record_links_reading() {
        let reading = Reading {
            id: 77,
            sensor_id: 4,
            recorded_at: Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap(),
            concentrations: Concentrations {
                pm25: Some(35.4),
                pm10: Some(55.0),
                ..Default::default()
            },
            ambient: Ambient::default(),
            source: ConcentrationSource::Measured,
        };

        let record = aqi_record_for(&reading, &compute_aqi(&reading.concentrations));
        assert_eq!(record.reading_id, Some(77));
        assert_eq!(record.overall, 100);
        assert_eq!(record.dominant_pollutant, "PM2.5");
        assert_eq!(record.sub_indices.pm10, Some(51));
        assert_eq!(record.sub_indices.no2, None);
        assert_eq!(record.computed_at, reading.recorded_at);
    }
}
