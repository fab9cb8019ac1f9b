//! AQICN (World Air Quality Index) adapter.
//!
//! Queries the near-real-time station index for a geographic bounding box.
//! The API key travels as a `token` URL parameter, so the adapter expects an
//! already-wrapped client (see [`crate::fetch::auth::UrlParam`]).

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::fetch::{HttpClient, get_json};
use crate::model::{BoundingBox, Pollutant, StationRecord, StationStatus};

use super::{json_id, parse_numeric};

pub struct AqicnAdapter<C> {
    client: C,
    base_url: String,
}

#[derive(Deserialize)]
struct BoundsResponse {
    #[serde(default)]
    data: Option<Vec<Value>>,
}

impl<C: HttpClient> AqicnAdapter<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetches all stations inside `bounds`. Never fails: any error is logged
    /// and an empty list returned.
    pub async fn fetch(&self, bounds: &BoundingBox) -> Vec<StationRecord> {
        match self.try_fetch(bounds).await {
            Ok(stations) => {
                debug!(count = stations.len(), "AQICN stations normalized");
                stations
            }
            Err(e) => {
                error!(error = %e, "AQICN fetch failed");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, bounds: &BoundingBox) -> Result<Vec<StationRecord>> {
        let latlng = format!(
            "{:.4},{:.4},{:.4},{:.4}",
            bounds.lat1, bounds.lng1, bounds.lat2, bounds.lng2
        );
        let url = Url::parse_with_params(
            &format!("{}/v2/map/bounds", self.base_url.trim_end_matches('/')),
            [("latlng", latlng.as_str()), ("networks", "all")],
        )?;

        let resp: BoundsResponse = get_json(&self.client, url).await?;
        let Some(data) = resp.data else {
            bail!("no data available in the response");
        };

        Ok(data.into_iter().filter_map(normalize).collect())
    }
}

/// Maps one raw station object into the uniform record, or drops it when the
/// id or coordinates are unusable.
fn normalize(raw: Value) -> Option<StationRecord> {
    let id = json_id(&raw["uid"])?;
    let longitude = raw["lon"].as_f64()?;
    let latitude = raw["lat"].as_f64()?;
    let display_name = raw["station"]["name"]
        .as_str()
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown Station")
        .to_string();
    // AQI arrives as a string ("42", sometimes "-"); unparseable means 0.
    let primary_index_value = parse_numeric(&raw["aqi"]);

    let mut pollutant_readings = BTreeMap::new();
    for pollutant in Pollutant::ALL {
        if let Some(v) = raw["iaqi"][pollutant.as_key()]["v"].as_f64() {
            pollutant_readings.insert(pollutant, v);
        }
    }

    let record = StationRecord {
        id,
        longitude,
        latitude,
        display_name,
        primary_index_value,
        // The bounds endpoint only returns reporting stations.
        status: StationStatus::Active,
        pollutant_readings,
        raw_details: Some(raw),
    };
    record.is_valid().then_some(record)
}
