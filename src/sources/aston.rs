//! Aston fixed-sensor-network adapter.
//!
//! Unlike the point-based providers this network is visualized as polygons,
//! so the adapter returns a combined GeoJSON feature collection rather than
//! station records. Per-sensor collections are merged into one, each feature
//! tagged with its sensor id and type; features missing a timestamp, with
//! non-polygon geometry, or with empty coordinates are filtered out.
//!
//! A missing base URL is a configuration error (logged as such), not a
//! transport failure; the result is `None` either way.

use anyhow::{Context, Result, bail};
use chrono::{Days, NaiveDate};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::fetch::{HttpClient, get_json};

/// Averaging method applied server-side when summarizing readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AveragingMethod {
    Mean,
    Median,
    Max,
    Min,
}

impl AveragingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AveragingMethod::Mean => "mean",
            AveragingMethod::Median => "median",
            AveragingMethod::Max => "max",
            AveragingMethod::Min => "min",
        }
    }
}

impl std::str::FromStr for AveragingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(AveragingMethod::Mean),
            "median" => Ok(AveragingMethod::Median),
            "max" => Ok(AveragingMethod::Max),
            "min" => Ok(AveragingMethod::Min),
            other => Err(format!("unknown averaging method '{other}'")),
        }
    }
}

/// Query for one day of summarized sensor readings.
#[derive(Debug, Clone)]
pub struct SensorQuery {
    /// Start date, `YYYY-MM-DD`. The request window is one day.
    pub date: String,
    pub method: AveragingMethod,
    /// Averaging frequency token the API understands (e.g. `"H"`).
    pub frequency: String,
}

/// Combined GeoJSON feature collection across all sensors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<SensorFeature>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorFeature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Geometry,
    pub properties: SensorProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    /// Polygon rings; kept loose because ring nesting varies per sensor.
    pub coordinates: Value,
}

/// Typed per-feature properties, with unrecognized keys passed through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorProperties {
    #[serde(rename = "datetime_UTC", default)]
    pub datetime_utc: Option<String>,
    #[serde(rename = "ambHumidity_mean", default)]
    pub amb_humidity_mean: Option<f64>,
    #[serde(rename = "ambTempC_mean", default)]
    pub amb_temp_c_mean: Option<f64>,
    #[serde(rename = "particulatePM10_mean", default)]
    pub particulate_pm10_mean: Option<f64>,
    #[serde(rename = "particulatePM2.5_mean", default)]
    pub particulate_pm25_mean: Option<f64>,
    #[serde(default)]
    pub sensorid: Option<i64>,
    #[serde(rename = "sensorType", default)]
    pub sensor_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawCollection {
    #[serde(default)]
    features: Vec<SensorFeature>,
}

pub struct AstonAdapter<C> {
    client: C,
    base_url: Option<String>,
}

impl<C: HttpClient> AstonAdapter<C> {
    pub fn new(client: C, base_url: Option<String>) -> Self {
        Self { client, base_url }
    }

    /// Fetches and merges one day of summarized sensor polygons. Returns
    /// `None` on any failure; the caller treats that as "nothing to draw".
    pub async fn fetch(&self, query: &SensorQuery) -> Option<SensorSummary> {
        let Some(base_url) = self.base_url.as_deref() else {
            error!("Aston base URL configuration is missing (AIRQUALITY_API_URL)");
            return None;
        };

        match self.try_fetch(base_url, query).await {
            Ok(summary) => {
                debug!(features = summary.features.len(), "Aston summary combined");
                Some(summary)
            }
            Err(e) => {
                error!(error = %e, "Aston fetch failed");
                None
            }
        }
    }

    async fn try_fetch(&self, base_url: &str, query: &SensorQuery) -> Result<SensorSummary> {
        let start = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
            .with_context(|| format!("invalid start date '{}'", query.date))?;
        let end = start
            .checked_add_days(Days::new(1))
            .context("start date out of range")?;

        let url = Url::parse_with_params(
            &format!("{}/sensor-summary/as-geojson", base_url.trim_end_matches('/')),
            [
                ("start", start.format("%d-%m-%Y").to_string()),
                ("end", end.format("%d-%m-%Y").to_string()),
                ("averaging_frequency", query.frequency.clone()),
                ("averaging_methods", query.method.as_str().to_string()),
            ],
        )?;

        let sensors: Vec<Value> = get_json(&self.client, url).await?;
        if sensors.is_empty() {
            bail!("empty response array, no sensors found");
        }

        let mut features = Vec::new();
        for sensor in sensors {
            let (Some(sensorid), Some(sensor_type)) =
                (sensor["sensorid"].as_i64(), sensor["sensorType"].as_str())
            else {
                warn!("skipping sensor with invalid structure");
                continue;
            };
            let Ok(collection) =
                serde_json::from_value::<RawCollection>(sensor["geojson"].clone())
            else {
                warn!(sensorid, "skipping sensor with malformed geojson");
                continue;
            };

            for mut feature in collection.features {
                if !keep_feature(&feature) {
                    continue;
                }
                feature.properties.sensorid = Some(sensorid);
                feature.properties.sensor_type = Some(sensor_type.to_string());
                features.push(feature);
            }
        }

        if features.is_empty() {
            bail!("no valid features found in any sensor data");
        }

        Ok(SensorSummary {
            kind: "FeatureCollection".to_string(),
            features,
        })
    }
}

fn keep_feature(feature: &SensorFeature) -> bool {
    let has_timestamp = feature
        .properties
        .datetime_utc
        .as_deref()
        .is_some_and(|s| !s.is_empty());
    let non_empty_polygon = feature.geometry.kind == "Polygon"
        && feature
            .geometry
            .coordinates
            .as_array()
            .is_some_and(|c| !c.is_empty());
    has_timestamp && non_empty_polygon
}
