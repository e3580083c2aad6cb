//! Persisted document shapes.
//!
//! A [`Document`] is the append-only envelope written to the store. Its
//! payload is a [`Snapshot`], a tagged union whose `type` discriminant is
//! `ENERGY_DATA` or `WEATHER_DATA`, flattened into the envelope so the stored
//! JSON reads:
//!
//! ```json
//! { "type": "ENERGY_DATA", "timestamp": "...", "historicalSeed": false, ... }
//! ```
//!
//! [`Metric`] documents are produced by a separate materialization process
//! and are only ever read here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Discriminant of a raw snapshot document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    #[serde(rename = "ENERGY_DATA")]
    Energy,
    #[serde(rename = "WEATHER_DATA")]
    Weather,
}

impl DocumentKind {
    /// Wire value of the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Energy => "ENERGY_DATA",
            Self::Weather => "WEATHER_DATA",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Energy => write!(f, "energy"),
            Self::Weather => write!(f, "weather"),
        }
    }
}

/// Persisted envelope around one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Set only for documents written by the 24-hour backfill.
    #[serde(rename = "historicalSeed", default)]
    pub historical_seed: bool,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

impl Document {
    /// A timestamped, not-yet-persisted document.
    pub fn new(timestamp: DateTime<Utc>, snapshot: Snapshot) -> Self {
        Self {
            timestamp: Some(timestamp),
            historical_seed: false,
            snapshot,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.snapshot.kind()
    }
}

/// Normalized reading from one external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Snapshot {
    #[serde(rename = "ENERGY_DATA")]
    Energy(EnergySnapshot),
    #[serde(rename = "WEATHER_DATA")]
    Weather(WeatherSnapshot),
}

impl Snapshot {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Energy(_) => DocumentKind::Energy,
            Self::Weather(_) => DocumentKind::Weather,
        }
    }
}

// ---------------------------------------------------------------------------
// Energy
// ---------------------------------------------------------------------------

/// Grid production/consumption reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergySnapshot {
    /// Time the upstream reports the reading for.
    #[serde(rename = "datetime")]
    pub source_time: DateTime<Utc>,
    #[serde(default)]
    pub power_production_breakdown: PowerBreakdown,
    #[serde(default)]
    pub power_consumption_breakdown: PowerBreakdown,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub power_production_total: u32,
    #[serde(default, deserialize_with = "zero_if_null")]
    pub power_consumption_total: u32,
}

/// Generation source names used as breakdown keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GenerationSource {
    Nuclear,
    Geothermal,
    Biomass,
    Coal,
    Wind,
    Solar,
    Hydro,
    Gas,
    Oil,
    Unknown,
    HydroDischarge,
    BatteryDischarge,
}

impl GenerationSource {
    pub const ALL: [GenerationSource; 12] = [
        Self::Nuclear,
        Self::Geothermal,
        Self::Biomass,
        Self::Coal,
        Self::Wind,
        Self::Solar,
        Self::Hydro,
        Self::Gas,
        Self::Oil,
        Self::Unknown,
        Self::HydroDischarge,
        Self::BatteryDischarge,
    ];

    /// Key used by the upstream and in stored documents.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Nuclear => "nuclear",
            Self::Geothermal => "geothermal",
            Self::Biomass => "biomass",
            Self::Coal => "coal",
            Self::Wind => "wind",
            Self::Solar => "solar",
            Self::Hydro => "hydro",
            Self::Gas => "gas",
            Self::Oil => "oil",
            Self::Unknown => "unknown",
            Self::HydroDischarge => "hydro discharge",
            Self::BatteryDischarge => "battery discharge",
        }
    }
}

impl std::fmt::Display for GenerationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Sparse per-source power values. An absent entry means "no data for that
/// source", which is different from zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerBreakdown {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nuclear: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geothermal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biomass: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solar: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hydro: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oil: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown: Option<u32>,
    #[serde(
        rename = "hydro discharge",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub hydro_discharge: Option<u32>,
    #[serde(
        rename = "battery discharge",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub battery_discharge: Option<u32>,
}

impl PowerBreakdown {
    pub fn get(&self, source: GenerationSource) -> Option<u32> {
        *self.slot(source)
    }

    pub fn set(&mut self, source: GenerationSource, watts: Option<u32>) {
        *self.slot_mut(source) = watts;
    }

    /// Sources that reported a value, in [`GenerationSource::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (GenerationSource, u32)> + '_ {
        GenerationSource::ALL
            .into_iter()
            .filter_map(|source| self.get(source).map(|watts| (source, watts)))
    }

    fn slot(&self, source: GenerationSource) -> &Option<u32> {
        match source {
            GenerationSource::Nuclear => &self.nuclear,
            GenerationSource::Geothermal => &self.geothermal,
            GenerationSource::Biomass => &self.biomass,
            GenerationSource::Coal => &self.coal,
            GenerationSource::Wind => &self.wind,
            GenerationSource::Solar => &self.solar,
            GenerationSource::Hydro => &self.hydro,
            GenerationSource::Gas => &self.gas,
            GenerationSource::Oil => &self.oil,
            GenerationSource::Unknown => &self.unknown,
            GenerationSource::HydroDischarge => &self.hydro_discharge,
            GenerationSource::BatteryDischarge => &self.battery_discharge,
        }
    }

    fn slot_mut(&mut self, source: GenerationSource) -> &mut Option<u32> {
        match source {
            GenerationSource::Nuclear => &mut self.nuclear,
            GenerationSource::Geothermal => &mut self.geothermal,
            GenerationSource::Biomass => &mut self.biomass,
            GenerationSource::Coal => &mut self.coal,
            GenerationSource::Wind => &mut self.wind,
            GenerationSource::Solar => &mut self.solar,
            GenerationSource::Hydro => &mut self.hydro,
            GenerationSource::Gas => &mut self.gas,
            GenerationSource::Oil => &mut self.oil,
            GenerationSource::Unknown => &mut self.unknown,
            GenerationSource::HydroDischarge => &mut self.hydro_discharge,
            GenerationSource::BatteryDischarge => &mut self.battery_discharge,
        }
    }
}

fn zero_if_null<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(0))
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// Local weather reading. Stored under `current`, the shape the metric
/// materializer reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub current: WeatherConditions,
}

/// Weather variables at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherConditions {
    /// Air temperature at 2 m, °C.
    #[serde(rename = "temperature_2m")]
    pub temperature: f32,
    /// Direct solar radiation, W/m².
    pub direct_radiation: f32,
    /// Cloud cover, percent.
    pub cloud_cover: u8,
    /// Wind speed at 10 m, km/h.
    #[serde(rename = "wind_speed_10m")]
    pub wind_speed: f32,
}

// ---------------------------------------------------------------------------
// Metric (read-only)
// ---------------------------------------------------------------------------

/// Wire value of the `type` field on materialized metric documents.
pub const METRIC_TYPE: &str = "AGGREGATED_DATA";

/// Aggregated view written by the downstream materialization process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_production: u32,
    #[serde(default)]
    pub total_consumption: u32,
    #[serde(default)]
    pub net_balance: i64,
    pub weather_data: WeatherConditions,
    #[serde(default)]
    pub power_production_data: PowerBreakdown,
    #[serde(default)]
    pub power_consumption_data: PowerBreakdown,
    #[serde(rename = "correlations", default)]
    pub correlations: Correlations,
}

/// Correlation coefficients computed by the materializer. `None` until it has
/// at least two merged points to correlate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Correlations {
    #[serde(default)]
    pub solar_irradiance_vs_solar_production_correlation: Option<f32>,
    #[serde(default)]
    pub temperature_vs_consumption_correlation: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn weather() -> Snapshot {
        Snapshot::Weather(WeatherSnapshot {
            current: WeatherConditions {
                temperature: 7.5,
                direct_radiation: 120.0,
                cloud_cover: 80,
                wind_speed: 14.2,
            },
        })
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(DocumentKind::Energy.as_str(), "ENERGY_DATA");
        assert_eq!(
            serde_json::to_value(DocumentKind::Weather).unwrap(),
            json!("WEATHER_DATA")
        );
    }

    #[test]
    fn test_weather_document_shape() {
        let doc = Document::new(at(12), weather());
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["type"], "WEATHER_DATA");
        assert_eq!(value["timestamp"], "2024-03-01T12:00:00Z");
        assert_eq!(value["historicalSeed"], false);
        assert_eq!(value["current"]["cloud_cover"], 80);
        assert_eq!(value["current"]["temperature_2m"], 7.5);
        assert!(value["current"].get("time").is_none());
    }

    #[test]
    fn test_energy_document_parses_back() {
        let raw = json!({
            "type": "ENERGY_DATA",
            "timestamp": "2024-03-01T12:00:00Z",
            "historicalSeed": true,
            "datetime": "2024-03-01T12:00:00.000Z",
            "powerProductionBreakdown": {"wind": 9000, "solar": null, "hydro discharge": 12},
            "powerConsumptionBreakdown": {"gas": 4000},
            "powerProductionTotal": 25000,
            "powerConsumptionTotal": 27000
        });
        let doc: Document = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.kind(), DocumentKind::Energy);
        assert!(doc.historical_seed);
        assert_eq!(doc.timestamp, Some(at(12)));
        match doc.snapshot {
            Snapshot::Energy(energy) => {
                assert_eq!(energy.source_time, at(12));
                let production = &energy.power_production_breakdown;
                assert_eq!(production.get(GenerationSource::Wind), Some(9000));
                assert_eq!(production.get(GenerationSource::Solar), None);
                assert_eq!(production.get(GenerationSource::HydroDischarge), Some(12));
                assert_eq!(energy.power_consumption_total, 27000);
            }
            Snapshot::Weather(_) => panic!("expected energy"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = json!({"type": "AGGREGATED_DATA", "timestamp": "2024-03-01T12:00:00Z"});
        assert!(serde_json::from_value::<Document>(raw).is_err());
    }

    #[test]
    fn test_null_totals_read_as_zero() {
        let raw = json!({
            "datetime": "2024-03-01T12:00:00Z",
            "powerProductionTotal": null,
            "powerConsumptionTotal": 10
        });
        let energy: EnergySnapshot = serde_json::from_value(raw).unwrap();
        assert_eq!(energy.power_production_total, 0);
        assert_eq!(energy.power_consumption_total, 10);
        assert_eq!(energy.power_production_breakdown, PowerBreakdown::default());
    }

    #[test]
    fn test_breakdown_absent_keys_not_serialized() {
        let mut breakdown = PowerBreakdown::default();
        breakdown.set(GenerationSource::Nuclear, Some(5000));
        breakdown.set(GenerationSource::BatteryDischarge, Some(0));
        let value = serde_json::to_value(&breakdown).unwrap();
        assert_eq!(value, json!({"nuclear": 5000, "battery discharge": 0}));
    }

    #[test]
    fn test_breakdown_iter_skips_absent() {
        let mut breakdown = PowerBreakdown::default();
        breakdown.set(GenerationSource::Solar, Some(300));
        breakdown.set(GenerationSource::Coal, Some(0));
        let present: Vec<_> = breakdown.iter().collect();
        assert_eq!(
            present,
            vec![(GenerationSource::Coal, 0), (GenerationSource::Solar, 300)]
        );
    }

    #[test]
    fn test_generation_source_keys_unique() {
        let mut keys: Vec<_> = GenerationSource::ALL.iter().map(|s| s.key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), GenerationSource::ALL.len());
    }

    #[test]
    fn test_metric_parses_materialized_doc() {
        let raw = json!({
            "type": METRIC_TYPE,
            "timestamp": "2024-03-01T12:00:00Z",
            "totalProduction": 25000,
            "totalConsumption": 27000,
            "netBalance": -2000,
            "weatherData": {
                "temperature_2m": 7.5,
                "direct_radiation": 120.0,
                "cloud_cover": 80,
                "wind_speed_10m": 14.2
            },
            "energy_data": {"solar_production": 300},
            "correlations": {
                "solar_irradiance_vs_solar_production_correlation": 0.8,
                "temperature_vs_consumption_correlation": -0.4
            }
        });
        let metric: Metric = serde_json::from_value(raw).unwrap();
        assert_eq!(metric.net_balance, -2000);
        assert_eq!(metric.weather_data.cloud_cover, 80);
        let correlation = metric.correlations.temperature_vs_consumption_correlation.unwrap();
        assert!((correlation + 0.4).abs() < 1e-6);
        assert_eq!(metric.power_production_data, PowerBreakdown::default());
    }

    #[test]
    fn test_metric_null_correlations_read_as_none() {
        let raw = json!({
            "type": METRIC_TYPE,
            "timestamp": "2024-03-01T12:00:00Z",
            "weatherData": {
                "temperature_2m": 7.5,
                "direct_radiation": 0.0,
                "cloud_cover": 80,
                "wind_speed_10m": 14.2
            },
            "correlations": {
                "solar_irradiance_vs_solar_production_correlation": null,
                "temperature_vs_consumption_correlation": null
            }
        });
        let metric: Metric = serde_json::from_value(raw).unwrap();
        assert_eq!(metric.correlations, Correlations::default());
    }
}
