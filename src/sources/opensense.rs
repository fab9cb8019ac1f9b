//! openSenseMap adapter.
//!
//! The sensor-network API has no bounding-box query worth using, so the
//! adapter pulls the full box catalog and filters client-side for boxes
//! carrying a sensor of the selected particulate phenomenon. No credential is
//! required.

use std::collections::BTreeMap;

use anyhow::Result;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::fetch::{HttpClient, get_json};
use crate::model::{Particulate, StationRecord, StationStatus};

use super::parse_numeric;

pub struct OpenSenseAdapter<C> {
    client: C,
    base_url: String,
}

#[derive(Deserialize)]
struct SenseBox {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(rename = "currentLocation", default)]
    current_location: Option<BoxLocation>,
    #[serde(default)]
    sensors: Vec<BoxSensor>,
}

#[derive(Deserialize)]
struct BoxLocation {
    #[serde(default)]
    coordinates: Vec<f64>,
}

#[derive(Deserialize)]
struct BoxSensor {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "lastMeasurement", default)]
    last_measurement: Option<Value>,
}

impl<C: HttpClient> OpenSenseAdapter<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetches every box reporting `phenomenon`. Never fails: any error is
    /// logged and an empty list returned.
    pub async fn fetch(&self, phenomenon: Particulate) -> Vec<StationRecord> {
        match self.try_fetch(phenomenon).await {
            Ok(stations) => {
                debug!(
                    phenomenon = phenomenon.phenomenon(),
                    count = stations.len(),
                    "openSenseMap boxes normalized"
                );
                stations
            }
            Err(e) => {
                error!(error = %e, "openSenseMap fetch failed");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, phenomenon: Particulate) -> Result<Vec<StationRecord>> {
        let url = Url::parse_with_params(
            &format!("{}/boxes", self.base_url.trim_end_matches('/')),
            [("full", "true"), ("classify", "true")],
        )?;

        let boxes: Vec<SenseBox> = get_json(&self.client, url).await?;
        Ok(boxes
            .into_iter()
            .filter_map(|b| normalize(b, phenomenon))
            .collect())
    }
}

fn normalize(sense_box: SenseBox, phenomenon: Particulate) -> Option<StationRecord> {
    let id = sense_box.id.filter(|s| !s.is_empty())?;
    let location = sense_box.current_location?;
    let [longitude, latitude, ..] = location.coordinates[..] else {
        return None;
    };
    let sensor = sense_box
        .sensors
        .iter()
        .find(|s| s.title.as_deref() == Some(phenomenon.phenomenon()))?;

    // Measurement values arrive as strings; unparseable or missing means 0.
    let primary_index_value = sensor
        .last_measurement
        .as_ref()
        .map(|m| parse_numeric(&m["value"]))
        .unwrap_or(0.0);

    // This network reports liveness explicitly; everything not "active" is
    // treated as inactive, not unknown.
    let status = if sense_box.state.as_deref() == Some("active") {
        StationStatus::Active
    } else {
        StationStatus::Inactive
    };

    let record = StationRecord {
        id,
        longitude,
        latitude,
        display_name: sense_box
            .name
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Unknown Station".to_string()),
        primary_index_value,
        status,
        pollutant_readings: BTreeMap::new(),
        raw_details: None,
    };
    record.is_valid().then_some(record)
}
