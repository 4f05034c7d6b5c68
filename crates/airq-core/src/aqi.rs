//! AQI calculation engine
//!
//! EPA-style breakpoint interpolation per pollutant, combined with the
//! maximum-pollutant rule. Pure lookups only: no I/O and no state.

use crate::types::{Concentrations, Pollutant, SubIndices};
use serde::{Deserialize, Serialize};

/// Overall AQI band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Good,
    Moderate,
    UnhealthyForSensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl Category {
    pub fn from_aqi(aqi: i32) -> Self {
        match aqi {
            i32::MIN..=50 => Category::Good,
            51..=100 => Category::Moderate,
            101..=150 => Category::UnhealthyForSensitive,
            151..=200 => Category::Unhealthy,
            201..=300 => Category::VeryUnhealthy,
            _ => Category::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Good => "Good",
            Category::Moderate => "Moderate",
            Category::UnhealthyForSensitive => "Unhealthy for Sensitive Groups",
            Category::Unhealthy => "Unhealthy",
            Category::VeryUnhealthy => "Very Unhealthy",
            Category::Hazardous => "Hazardous",
        }
    }

    /// Hex color used by map and dashboard layers
    pub fn color(&self) -> &'static str {
        match self {
            Category::Good => "#00E400",
            Category::Moderate => "#FFFF00",
            Category::UnhealthyForSensitive => "#FF7E00",
            Category::Unhealthy => "#FF0000",
            Category::VeryUnhealthy => "#8F3F97",
            Category::Hazardous => "#7E0023",
        }
    }

    pub fn health_implication(&self) -> &'static str {
        match self {
            Category::Good => "Good - Air quality is satisfactory",
            Category::Moderate => "Moderate - Air quality is acceptable",
            Category::UnhealthyForSensitive => "Unhealthy for Sensitive Groups",
            Category::Unhealthy => "Unhealthy - Health alert issued",
            Category::VeryUnhealthy => "Very Unhealthy - Health warning",
            Category::Hazardous => "Hazardous - Health emergency",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Category::Good => "No health impacts expected; enjoy outdoor activities",
            Category::Moderate => {
                "Some sensitive groups (children, elderly) may experience minor impacts"
            }
            Category::UnhealthyForSensitive => {
                "Sensitive groups should limit prolonged outdoor exertion"
            }
            Category::Unhealthy => {
                "General public may experience health effects; avoid outdoor activities"
            }
            Category::VeryUnhealthy => {
                "Everyone should avoid outdoor activities; consider staying indoors"
            }
            Category::Hazardous => {
                "Avoid all outdoor activities; wear N95 masks if venturing outside"
            }
        }
    }
}

/// One concentration-to-AQI interpolation range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub aqi_low: i32,
    pub aqi_high: i32,
    pub conc_low: f64,
    pub conc_high: f64,
    pub level: Category,
}

const fn bp(aqi_low: i32, aqi_high: i32, conc_low: f64, conc_high: f64, level: Category) -> Breakpoint {
    Breakpoint {
        aqi_low,
        aqi_high,
        conc_low,
        conc_high,
        level,
    }
}

use self::Category::*;

const PM25: [Breakpoint; 6] = [
    bp(0, 50, 0.0, 12.0, Good),
    bp(51, 100, 12.1, 35.4, Moderate),
    bp(101, 150, 35.5, 55.4, UnhealthyForSensitive),
    bp(151, 200, 55.5, 150.4, Unhealthy),
    bp(201, 300, 150.5, 250.4, VeryUnhealthy),
    bp(301, 500, 250.5, 500.0, Hazardous),
];

const PM10: [Breakpoint; 6] = [
    bp(0, 50, 0.0, 54.0, Good),
    bp(51, 100, 55.0, 154.0, Moderate),
    bp(101, 150, 155.0, 254.0, UnhealthyForSensitive),
    bp(151, 200, 255.0, 354.0, Unhealthy),
    bp(201, 300, 355.0, 424.0, VeryUnhealthy),
    bp(301, 500, 425.0, 604.0, Hazardous),
];

const NO2: [Breakpoint; 6] = [
    bp(0, 50, 0.0, 53.0, Good),
    bp(51, 100, 54.0, 100.0, Moderate),
    bp(101, 150, 101.0, 360.0, UnhealthyForSensitive),
    bp(151, 200, 361.0, 649.0, Unhealthy),
    bp(201, 300, 650.0, 1249.0, VeryUnhealthy),
    bp(301, 500, 1250.0, 2049.0, Hazardous),
];

const CO: [Breakpoint; 6] = [
    bp(0, 50, 0.0, 4.4, Good),
    bp(51, 100, 4.5, 9.4, Moderate),
    bp(101, 150, 9.5, 12.4, UnhealthyForSensitive),
    bp(151, 200, 12.5, 15.4, Unhealthy),
    bp(201, 300, 15.5, 30.4, VeryUnhealthy),
    bp(301, 500, 30.5, 40.4, Hazardous),
];

const O3: [Breakpoint; 6] = [
    bp(0, 50, 0.0, 54.0, Good),
    bp(51, 100, 55.0, 70.0, Moderate),
    bp(101, 150, 71.0, 85.0, UnhealthyForSensitive),
    bp(151, 200, 86.0, 105.0, Unhealthy),
    bp(201, 300, 106.0, 200.0, VeryUnhealthy),
    bp(301, 500, 201.0, 604.0, Hazardous),
];

const SO2: [Breakpoint; 6] = [
    bp(0, 50, 0.0, 35.0, Good),
    bp(51, 100, 36.0, 75.0, Moderate),
    bp(101, 150, 76.0, 185.0, UnhealthyForSensitive),
    bp(151, 200, 186.0, 304.0, Unhealthy),
    bp(201, 300, 305.0, 604.0, VeryUnhealthy),
    bp(301, 500, 605.0, 804.0, Hazardous),
];

/// Ordered bracket table for a pollutant
pub fn breakpoints(pollutant: Pollutant) -> &'static [Breakpoint; 6] {
    match pollutant {
        Pollutant::Pm25 => &PM25,
        Pollutant::Pm10 => &PM10,
        Pollutant::No2 => &NO2,
        Pollutant::Co => &CO,
        Pollutant::O3 => &O3,
        Pollutant::So2 => &SO2,
    }
}

/// AQI penalty added to the top bracket for concentrations beyond it
pub const OVERFLOW_PENALTY: i32 = 100;

/// Sub-index of a single pollutant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubIndex {
    pub aqi: i32,
    pub level: Category,
}

/// Interpolate the AQI for one concentration.
///
/// Returns `None` for negative values and for values falling in the gap
/// between two brackets (e.g. PM2.5 at 12.05).
pub fn sub_index(pollutant: Pollutant, concentration: f64) -> Option<SubIndex> {
    let table = breakpoints(pollutant);

    for bp in table.iter() {
        if concentration >= bp.conc_low && concentration <= bp.conc_high {
            let slope = (bp.aqi_high - bp.aqi_low) as f64 / (bp.conc_high - bp.conc_low);
            let aqi = slope * (concentration - bp.conc_low) + bp.aqi_low as f64;
            return Some(SubIndex {
                aqi: aqi.round() as i32,
                level: bp.level,
            });
        }
    }

    let last = table[table.len() - 1];
    if concentration > last.conc_high {
        return Some(SubIndex {
            aqi: last.aqi_high + OVERFLOW_PENALTY,
            level: last.level,
        });
    }

    None
}

/// Back out an approximate concentration from a pollutant AQI.
///
/// Inverse of the bracket interpolation in [`sub_index`]. AQI values above
/// the top bracket map to the top bracket's upper concentration.
pub fn estimate_concentration(pollutant: Pollutant, aqi: f64) -> Option<f64> {
    if !aqi.is_finite() || aqi < 0.0 {
        return None;
    }

    let table = breakpoints(pollutant);
    for bp in table.iter() {
        let (low, high) = (bp.aqi_low as f64, bp.aqi_high as f64);
        if aqi < low {
            // between two integer bands
            return Some(bp.conc_low);
        }
        if aqi <= high {
            let slope = (bp.conc_high - bp.conc_low) / (high - low);
            return Some(slope * (aqi - low) + bp.conc_low);
        }
    }

    Some(table[table.len() - 1].conc_high)
}

/// Breakdown entry for one pollutant that had a concentration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutantAqi {
    pub pollutant: Pollutant,
    pub concentration: f64,
    pub aqi: Option<i32>,
    pub level: Option<Category>,
}

/// Result of [`compute_aqi`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AqiResult {
    pub overall: i32,
    pub dominant: Option<Pollutant>,
    pub breakdown: Vec<PollutantAqi>,
    pub category: Category,
    pub health_implication: String,
    pub recommendation: String,
}

impl AqiResult {
    /// Dominant pollutant label, `"Unknown"` when nothing contributed
    pub fn dominant_label(&self) -> &'static str {
        self.dominant.map(|p| p.label()).unwrap_or("Unknown")
    }

    pub fn sub_indices(&self) -> SubIndices {
        let find = |p: Pollutant| {
            self.breakdown
                .iter()
                .find(|entry| entry.pollutant == p)
                .and_then(|entry| entry.aqi)
        };
        SubIndices {
            pm25: find(Pollutant::Pm25),
            pm10: find(Pollutant::Pm10),
            no2: find(Pollutant::No2),
            co: find(Pollutant::Co),
            o3: find(Pollutant::O3),
            so2: find(Pollutant::So2),
        }
    }
}

/// Compute the overall AQI using the maximum-pollutant rule.
///
/// Absent concentrations are skipped, never treated as zero. With nothing
/// to evaluate the overall AQI is 0 and the dominant pollutant unknown.
pub fn compute_aqi(reading: &Concentrations) -> AqiResult {
    let mut breakdown = Vec::new();
    let mut overall = 0;
    let mut dominant = None;

    for pollutant in Pollutant::ALL {
        let Some(concentration) = reading.get(pollutant) else {
            continue;
        };

        let index = sub_index(pollutant, concentration);
        if let Some(SubIndex { aqi, .. }) = index {
            // strict comparison keeps the first pollutant on ties
            if aqi > overall {
                overall = aqi;
                dominant = Some(pollutant);
            }
        }

        breakdown.push(PollutantAqi {
            pollutant,
            concentration,
            aqi: index.map(|i| i.aqi),
            level: index.map(|i| i.level),
        });
    }

    let category = Category::from_aqi(overall);
    AqiResult {
        overall,
        dominant,
        breakdown,
        category,
        health_implication: category.health_implication().to_string(),
        recommendation: category.recommendation().to_string(),
    }
}
