//! IQAir adapter.
//!
//! The weather-derived provider supports exactly one reporting point per
//! request, so a successful call yields at most a single record. The API key
//! travels as a `key` URL parameter (see [`crate::fetch::auth::UrlParam`]).

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, error};

use crate::fetch::{HttpClient, get_json};
use crate::model::{Coordinate, StationRecord, StationStatus};

pub struct IqAirAdapter<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> IqAirAdapter<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetches the single reporting point nearest the UI's selected
    /// coordinate. Never fails: any error is logged and an empty list
    /// returned.
    pub async fn fetch(&self, point: &Coordinate) -> Vec<StationRecord> {
        match self.try_fetch(point).await {
            Ok(stations) => {
                debug!(count = stations.len(), "IQAir point normalized");
                stations
            }
            Err(e) => {
                error!(error = %e, "IQAir fetch failed");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, _point: &Coordinate) -> Result<Vec<StationRecord>> {
        let url = Url::parse(&format!(
            "{}/v2/city_ranking",
            self.base_url.trim_end_matches('/')
        ))?;

        let raw: Value = get_json(&self.client, url).await?;
        if raw["status"].as_str() != Some("success") || raw["data"].is_null() {
            bail!("no data available in the response");
        }

        Ok(normalize(&raw["data"]).into_iter().collect())
    }
}

fn normalize(data: &Value) -> Option<StationRecord> {
    let city = data["city"].as_str().unwrap_or_default();
    let id = format!(
        "{}-{}-{}",
        city,
        data["state"].as_str().unwrap_or_default(),
        data["country"].as_str().unwrap_or_default()
    );
    let longitude = data["location"]["coordinates"][0].as_f64()?;
    let latitude = data["location"]["coordinates"][1].as_f64()?;

    let record = StationRecord {
        id,
        longitude,
        latitude,
        display_name: if city.is_empty() {
            "Unknown Station".to_string()
        } else {
            city.to_string()
        },
        primary_index_value: data["forecasts"][0]["aqius"].as_f64().unwrap_or(0.0),
        // Single-point responses carry no liveness field.
        status: StationStatus::Unknown,
        pollutant_readings: BTreeMap::new(),
        raw_details: Some(data.clone()),
    };
    record.is_valid().then_some(record)
}
