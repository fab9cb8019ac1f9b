//! OpenAQ adapter.
//!
//! The regulatory provider serves latest readings per pollutant parameter in
//! pages of up to 1000. Page 1 carries the total match count in its metadata;
//! the adapter keeps requesting pages until it has accumulated that many
//! records. A malformed page stops accumulation and returns whatever was
//! gathered; a non-2xx page discards the whole call. Authentication is the
//! `X-API-Key` header, so the adapter expects an already-wrapped client (see
//! [`crate::fetch::auth::ApiKey`]).

use std::collections::BTreeMap;

use anyhow::Result;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::fetch::{HttpClient, get_json};
use crate::model::{Pollutant, StationRecord, StationStatus};

use super::json_id;

const PAGE_LIMIT: usize = 1000;

pub struct OpenAqAdapter<C> {
    client: C,
    base_url: String,
}

#[derive(Deserialize)]
struct LatestPage {
    #[serde(default)]
    meta: Option<PageMeta>,
    #[serde(default)]
    results: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct PageMeta {
    #[serde(default)]
    found: Option<u64>,
}

impl<C: HttpClient> OpenAqAdapter<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetches every latest reading for `pollutant`, following pagination.
    /// Never fails: any error is logged and an empty list returned.
    pub async fn fetch(&self, pollutant: Pollutant) -> Vec<StationRecord> {
        match self.try_fetch(pollutant).await {
            Ok(stations) => {
                debug!(
                    pollutant = %pollutant,
                    count = stations.len(),
                    "OpenAQ readings normalized"
                );
                stations
            }
            Err(e) => {
                error!(error = %e, pollutant = %pollutant, "OpenAQ fetch failed");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, pollutant: Pollutant) -> Result<Vec<StationRecord>> {
        let endpoint = format!(
            "{}/v3/parameters/{}/latest",
            self.base_url.trim_end_matches('/'),
            pollutant.openaq_parameter_id()
        );

        let mut all = Vec::new();
        let mut total: Option<u64> = None;
        let mut page: u32 = 1;

        while total.is_none_or(|t| (all.len() as u64) < t) {
            let url = Url::parse_with_params(
                &endpoint,
                [
                    ("limit", PAGE_LIMIT.to_string()),
                    ("page", page.to_string()),
                ],
            )?;

            // Transport and non-2xx failures abandon the whole call; only a
            // well-formed-but-unexpected body keeps the partial result.
            let body: LatestPage = match get_json(&self.client, url).await {
                Ok(body) => body,
                Err(e) if page > 1 && e.downcast_ref::<serde_json::Error>().is_some() => {
                    warn!(page, error = %e, "malformed page body, keeping partial result");
                    break;
                }
                Err(e) => return Err(e),
            };

            if page == 1 {
                total = body.meta.and_then(|m| m.found);
            }

            let Some(results) = body.results else {
                warn!(page, "page missing results, keeping partial result");
                break;
            };
            if results.is_empty() {
                // The provider claims more records than it serves; bail out
                // instead of requesting the same empty tail forever.
                warn!(page, accumulated = all.len(), "empty page before total reached");
                break;
            }

            all.extend(results.into_iter().filter_map(normalize));
            page += 1;

            if total.is_none() {
                // No total on page 1 means there is nothing to chase.
                break;
            }
        }

        Ok(all)
    }
}

fn normalize(raw: Value) -> Option<StationRecord> {
    let id = json_id(&raw["sensorsId"]).unwrap_or_else(|| "Unknown Sensor".to_string());
    let longitude = raw["coordinates"]["longitude"].as_f64().unwrap_or(0.0);
    let latitude = raw["coordinates"]["latitude"].as_f64().unwrap_or(0.0);
    let display_name = match json_id(&raw["locationsId"]) {
        Some(loc) => format!("Location ID: {loc}"),
        None => "Location ID: Unknown".to_string(),
    };
    let primary_index_value = raw["value"].as_f64().unwrap_or(0.0);

    let record = StationRecord {
        id,
        longitude,
        latitude,
        display_name,
        primary_index_value,
        // The latest endpoint carries no liveness field.
        status: StationStatus::Unknown,
        pollutant_readings: BTreeMap::new(),
        raw_details: None,
    };
    record.is_valid().then_some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpResponse;
    use crate::fetch::testing::ScriptedClient;
    use serde_json::json;

    fn page_body(found: u64, count: usize, offset: usize) -> String {
        let results: Vec<Value> = (0..count)
            .map(|i| {
                json!({
                    "sensorsId": offset + i,
                    "locationsId": 100 + offset + i,
                    "coordinates": { "longitude": 13.4, "latitude": 52.5 },
                    "value": 17.5
                })
            })
            .collect();
        json!({ "meta": { "found": found }, "results": results }).to_string()
    }

    fn adapter(client: ScriptedClient) -> OpenAqAdapter<ScriptedClient> {
        OpenAqAdapter::new(client, "https://api.openaq.org")
    }

    #[tokio::test]
    async fn test_pagination_terminates_at_reported_total() {
        let client = ScriptedClient::new(vec![
            Ok(HttpResponse::ok(page_body(2500, 1000, 0))),
            Ok(HttpResponse::ok(page_body(2500, 1000, 1000))),
            Ok(HttpResponse::ok(page_body(2500, 500, 2000))),
        ]);
        let adapter = adapter(client);

        let stations = adapter.fetch(Pollutant::Pm25).await;

        assert_eq!(stations.len(), 2500);
        let urls = adapter.client.request_urls();
        assert_eq!(urls.len(), 3, "exactly three page requests");
        assert!(urls[0].contains("page=1"));
        assert!(urls[2].contains("page=3"));
    }

    #[tokio::test]
    async fn test_single_page_when_total_fits() {
        let adapter = adapter(ScriptedClient::ok(&page_body(3, 3, 0)));
        let stations = adapter.fetch(Pollutant::O3).await;

        assert_eq!(stations.len(), 3);
        assert_eq!(adapter.client.request_count(), 1);
        assert!(adapter.client.request_urls()[0].contains("/v3/parameters/3/latest"));
    }

    #[tokio::test]
    async fn test_malformed_later_page_keeps_partial_result() {
        let client = ScriptedClient::new(vec![
            Ok(HttpResponse::ok(page_body(2000, 1000, 0))),
            Ok(HttpResponse::ok("{ not json")),
        ]);
        let stations = adapter(client).fetch(Pollutant::Pm25).await;

        assert_eq!(stations.len(), 1000);
    }

    #[tokio::test]
    async fn test_page_without_results_keeps_partial_result() {
        let client = ScriptedClient::new(vec![
            Ok(HttpResponse::ok(page_body(2000, 1000, 0))),
            Ok(HttpResponse::ok(r#"{"meta": {"found": 2000}}"#)),
        ]);
        let stations = adapter(client).fetch(Pollutant::Pm25).await;

        assert_eq!(stations.len(), 1000);
    }

    #[tokio::test]
    async fn test_non_2xx_discards_everything() {
        let client = ScriptedClient::new(vec![
            Ok(HttpResponse::ok(page_body(2000, 1000, 0))),
            Ok(HttpResponse::with_status(429, "rate limited")),
        ]);
        assert!(adapter(client).fetch(Pollutant::Pm25).await.is_empty());
    }

    #[tokio::test]
    async fn test_network_error_returns_empty() {
        let adapter = adapter(ScriptedClient::network_error());
        assert!(adapter.fetch(Pollutant::Pm25).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_page_before_total_stops() {
        let client = ScriptedClient::new(vec![
            Ok(HttpResponse::ok(page_body(5000, 1000, 0))),
            Ok(HttpResponse::ok(r#"{"results": []}"#)),
        ]);
        let adapter = adapter(client);
        let stations = adapter.fetch(Pollutant::Pm25).await;

        assert_eq!(stations.len(), 1000);
        assert_eq!(adapter.client.request_count(), 2);
    }

    #[test]
    fn test_normalize_defaults() {
        let record = normalize(json!({ "value": 9.0 })).unwrap();
        assert_eq!(record.id, "Unknown Sensor");
        assert_eq!(record.display_name, "Location ID: Unknown");
        assert_eq!(record.longitude, 0.0);
        assert_eq!(record.status, StationStatus::Unknown);
    }
}
