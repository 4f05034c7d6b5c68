//! AirVisual `nearest_city` client
//!
//! The free tier reports a US AQI and a dominant-pollutant code rather than
//! raw concentrations. The mapping backs a concentration out of the AQI
//! through the inverse of that pollutant's breakpoint table and flags the
//! reading as estimated.

use crate::{DataSource, IngestError, IngestResult};
use airq_core::{
    estimate_concentration, Ambient, ConcentrationSource, Concentrations, NewReading, Pollutant,
    Sensor, SensorId,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://api.airvisual.com/v2";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityData {
    #[serde(default)]
    pub city: Option<String>,
    pub current: CurrentConditions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentConditions {
    pub pollution: Pollution,
    #[serde(default)]
    pub weather: Weather,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pollution {
    pub ts: String,
    pub aqius: f64,
    pub mainus: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Weather {
    pub tp: Option<f64>,
    pub pr: Option<f64>,
    pub hu: Option<f64>,
    pub ws: Option<f64>,
}

/// Map a dominant-pollutant code to the pollutant it names
pub fn pollutant_for_code(code: &str) -> Option<Pollutant> {
    match code {
        "p2" => Some(Pollutant::Pm25),
        "p1" => Some(Pollutant::Pm10),
        "n2" => Some(Pollutant::No2),
        "o3" => Some(Pollutant::O3),
        "s2" => Some(Pollutant::So2),
        "co" => Some(Pollutant::Co),
        _ => None,
    }
}

/// Convert provider data into a reading stamped with `at`.
///
/// Only the dominant pollutant gets a value; the rest stay absent so the
/// AQI engine does not treat them as zero.
pub fn map_to_reading(sensor_id: SensorId, data: &CityData, at: DateTime<Utc>) -> NewReading {
    let pollution = &data.current.pollution;
    let mut concentrations = Concentrations::default();

    if let Some(pollutant) = pollutant_for_code(&pollution.mainus) {
        concentrations.set(pollutant, estimate_concentration(pollutant, pollution.aqius));
    }

    let weather = &data.current.weather;
    NewReading {
        sensor_id,
        recorded_at: at,
        concentrations,
        ambient: Ambient {
            temperature: weather.tp,
            humidity: weather.hu,
            pressure: weather.pr,
            wind_speed: weather.ws,
        },
        source: ConcentrationSource::Estimated,
    }
}

/// Decode a raw response body; non-"success" status is an error
pub fn parse_response(body: &str) -> IngestResult<CityData> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| IngestError::Decode(e.to_string()))?;

    if envelope.status != "success" {
        let message = envelope
            .data
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(IngestError::ProviderStatus(format!(
            "{} - {}",
            envelope.status, message
        )));
    }

    serde_json::from_value(envelope.data).map_err(|e| IngestError::Decode(e.to_string()))
}

pub struct AirVisualSource {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AirVisualSource {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> IngestResult<Self> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(IngestError::MissingApiKey)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    pub fn nearest_city_url(&self, latitude: f64, longitude: f64) -> IngestResult<Url> {
        let endpoint = format!("{}/nearest_city", self.base_url);
        let url = Url::parse_with_params(
            &endpoint,
            &[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("key", self.api_key.clone()),
            ],
        )?;
        Ok(url)
    }

    #[instrument(skip(self), fields(lat = latitude, lon = longitude))]
    pub async fn nearest_city(&self, latitude: f64, longitude: f64) -> IngestResult<CityData> {
        let url = self.nearest_city_url(latitude, longitude)?;
        // the request URL carries the API key
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::Http(e.without_url()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| IngestError::Http(e.without_url()))?;
        if !status.is_success() {
            // error bodies still carry the provider's status/message envelope
            return match parse_response(&body) {
                Err(err @ IngestError::ProviderStatus(_)) => Err(err),
                _ => Err(IngestError::ProviderStatus(format!("HTTP {status}"))),
            };
        }

        let data = parse_response(&body)?;
        debug!(
            "Provider returned AQI {} ({}) for {}",
            data.current.pollution.aqius,
            data.current.pollution.mainus,
            data.city.as_deref().unwrap_or("unknown city")
        );
        Ok(data)
    }
}

#[async_trait::async_trait]
impl DataSource for AirVisualSource {
    fn name(&self) -> &str {
        "airvisual"
    }

    fn is_external(&self) -> bool {
        true
    }

    async fn fetch(&self, sensor: &Sensor, at: DateTime<Utc>) -> IngestResult<NewReading> {
        let data = self.nearest_city(sensor.latitude, sensor.longitude).await?;
        Ok(map_to_reading(sensor.id, &data, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airq_core::compute_aqi;
    use chrono::TimeZone;

    const FIXTURE: &str = include_str!("../tests/fixtures/nearest_city.json");

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_fixture() {
        let data = parse_response(FIXTURE).unwrap();

        assert_eq!(data.city.as_deref(), Some("Almaty"));
        assert_eq!(data.current.pollution.aqius, 153.0);
        assert_eq!(data.current.pollution.mainus, "p2");
        assert_eq!(data.current.weather.tp, Some(-4.0));
    }

    #[test]
    fn test_mapping_round_trips_through_engine() {
        let data = parse_response(FIXTURE).unwrap();
        let reading = map_to_reading(5, &data, at());

        assert_eq!(reading.source, ConcentrationSource::Estimated);
        assert_eq!(reading.recorded_at, at());
        assert!(reading.concentrations.pm10.is_none());
        assert_eq!(reading.ambient.humidity, Some(78.0));

        let pm25 = reading.concentrations.pm25.unwrap();
        assert!(pm25 > 55.4 && pm25 <= 150.4);
        assert_eq!(compute_aqi(&reading.concentrations).overall, 153);
    }

    #[test]
    fn test_unknown_code_yields_empty_reading() {
        let mut data = parse_response(FIXTURE).unwrap();
        data.current.pollution.mainus = "xx".to_string();

        let reading = map_to_reading(5, &data, at());
        assert!(reading.concentrations.is_empty());
        assert_eq!(compute_aqi(&reading.concentrations).overall, 0);
    }

    #[test]
    fn test_pollutant_codes() {
        assert_eq!(pollutant_for_code("p1"), Some(Pollutant::Pm10));
        assert_eq!(pollutant_for_code("n2"), Some(Pollutant::No2));
        assert_eq!(pollutant_for_code("s2"), Some(Pollutant::So2));
        assert_eq!(pollutant_for_code("P2"), None);
    }

    #[test]
    fn test_failed_status_is_error() {
        let body = r#"{"status":"fail","data":{"message":"call_limit_reached"}}"#;
        let err = parse_response(body).unwrap_err();

        insta::assert_snapshot!(err.to_string(), @"Provider returned status: fail - call_limit_reached");
    }

    #[test]
    fn test_malformed_body_is_decode_error() {
        assert!(matches!(
            parse_response("<html>"),
            Err(IngestError::Decode(_))
        ));
        assert!(matches!(
            parse_response(r#"{"status":"success","data":{}}"#),
            Err(IngestError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(
            AirVisualSource::new(DEFAULT_BASE_URL, None),
            Err(IngestError::MissingApiKey)
        ));
        assert!(matches!(
            AirVisualSource::new(DEFAULT_BASE_URL, Some("  ".to_string())),
            Err(IngestError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn test_transport_error_hides_api_key() {
        let source =
            AirVisualSource::new("http://127.0.0.1:1/v2", Some("SECRETKEY123".to_string()))
                .unwrap();
        let err = source.nearest_city(43.25, 76.93).await.unwrap_err();

        assert!(matches!(err, IngestError::Http(_)));
        assert!(!err.to_string().contains("SECRETKEY123"), "{err}");
    }

    #[test]
    fn test_nearest_city_url() {
        let source =
            AirVisualSource::new("http://api.airvisual.com/v2/", Some("abc123".to_string()))
                .unwrap();
        let url = source.nearest_city_url(43.25, 76.93).unwrap();

        assert_eq!(
            url.as_str(),
            "http://api.airvisual.com/v2/nearest_city?lat=43.25&lon=76.93&key=abc123"
        );
        assert!(source.is_external());
    }
}
