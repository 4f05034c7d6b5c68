//! Synthetic reading generator for demo deployments

use crate::{DataSource, IngestResult};
use airq_core::{Ambient, ConcentrationSource, Concentrations, NewReading, Sensor, SensorId};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Generates plausible urban pollutant levels with no I/O
pub struct SyntheticSource {
    rng: Mutex<StdRng>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn generate(&self, sensor_id: SensorId, at: DateTime<Utc>) -> NewReading {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let concentrations = Concentrations {
            pm25: Some(round_to(rng.gen_range(5.0..125.0), 0)),
            pm10: Some(round_to(rng.gen_range(10.0..190.0), 0)),
            no2: Some(round_to(rng.gen_range(5.0..85.0), 0)),
            co: Some(round_to(rng.gen_range(0.2..2.2), 1)),
            o3: Some(round_to(rng.gen_range(5.0..95.0), 0)),
            so2: Some(round_to(rng.gen_range(2.0..52.0), 0)),
        };
        let ambient = Ambient {
            temperature: Some(round_to(rng.gen_range(5.0..30.0), 1)),
            humidity: Some(round_to(rng.gen_range(20.0..80.0), 0)),
            pressure: Some(round_to(rng.gen_range(980.0..1010.0), 0)),
            wind_speed: Some(round_to(rng.gen_range(1.0..9.0), 1)),
        };

        NewReading {
            sensor_id,
            recorded_at: at,
            concentrations,
            ambient,
            source: ConcentrationSource::Measured,
        }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DataSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn is_external(&self) -> bool {
        false
    }

    async fn fetch(&self, sensor: &Sensor, at: DateTime<Utc>) -> IngestResult<NewReading> {
        Ok(self.generate(sensor.id, at))
    }
}
