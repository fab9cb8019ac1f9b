//! End-to-end tests: registry selection through the cache down to canned
//! provider responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::json;

use aq_stations::cache::{CacheConfig, MemoryStore, PersistedStations, StationStore};
use aq_stations::config::{Endpoint, ProviderConfig};
use aq_stations::fetch::{HttpClient, HttpResponse};
use aq_stations::model::{BoundingBox, Coordinate, Pollutant, SourceId, StationStatus};
use aq_stations::registry::StationRegistry;

/// Routes requests to canned responses by URL substring. Clones share state,
/// so a handle kept by the test still sees requests made via the registry.
#[derive(Clone, Default)]
struct RoutedClient {
    state: Arc<ClientState>,
}

#[derive(Default)]
struct ClientState {
    routes: Mutex<Vec<(String, VecDeque<Result<HttpResponse>>)>>,
    requests: Mutex<Vec<String>>,
}

impl RoutedClient {
    fn route(&self, url_fragment: &str, responses: Vec<Result<HttpResponse>>) {
        self.state
            .routes
            .lock()
            .unwrap()
            .push((url_fragment.to_string(), responses.into()));
    }

    fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for RoutedClient {
    async fn execute(&self, req: reqwest::Request) -> Result<HttpResponse> {
        let url = req.url().to_string();
        self.state.requests.lock().unwrap().push(url.clone());

        let mut routes = self.state.routes.lock().unwrap();
        for (fragment, responses) in routes.iter_mut() {
            if url.contains(fragment.as_str()) {
                return responses
                    .pop_front()
                    .unwrap_or_else(|| Err(anyhow!("route {fragment} exhausted for {url}")));
            }
        }
        Err(anyhow!("no canned response for {url}"))
    }
}

fn test_config() -> ProviderConfig {
    let endpoint = |url: &str| Endpoint {
        base_url: url.to_string(),
        api_key: Some("test-key".to_string()),
    };
    ProviderConfig {
        aqicn: endpoint("https://aqicn.test"),
        opensense: endpoint("https://opensense.test"),
        openaq: endpoint("https://openaq.test"),
        iqair: endpoint("http://iqair.test"),
        aston_base_url: Some("https://aston.test".to_string()),
    }
}

fn registry_with(
    client: &RoutedClient,
    store: &MemoryStore,
) -> StationRegistry<RoutedClient, MemoryStore> {
    StationRegistry::new(
        client.clone(),
        &test_config(),
        CacheConfig::default(),
        store.clone(),
    )
}

fn bounds_body() -> String {
    json!({
        "status": "ok",
        "data": [
            {
                "uid": 7423,
                "lat": 34.0663,
                "lon": -118.2267,
                "aqi": "87",
                "station": {"name": "Los Angeles North Main Street"},
                "iaqi": {"pm25": {"v": 31.0}, "o3": {"v": 12.5}}
            },
            {
                "uid": 9911,
                "lat": 240.0,
                "lon": -118.3,
                "aqi": "12",
                "station": {"name": "Broken Latitude"}
            }
        ]
    })
    .to_string()
}

#[tokio::test]
async fn test_viewport_selection_fetches_and_persists_bbox_stations() {
    let client = RoutedClient::default();
    client.route("/v2/map/bounds", vec![Ok(HttpResponse::ok(bounds_body()))]);
    let store = MemoryStore::new();
    let registry = registry_with(&client, &store);

    registry.select_source(SourceId::Aqicn).await;
    registry
        .select_viewport_bounds(BoundingBox {
            lat1: 34.05,
            lng1: -118.25,
            lat2: 34.15,
            lng2: -118.15,
        })
        .await;
    let stations = registry.visible_stations().await;

    // The out-of-range record is dropped during normalization.
    assert_eq!(stations.len(), 1);
    assert_eq!(stations[0].id, "7423");
    assert_eq!(stations[0].display_name, "Los Angeles North Main Street");
    assert_eq!(stations[0].primary_index_value, 87.0);
    assert_eq!(
        stations[0].pollutant_readings.get(&Pollutant::Pm25),
        Some(&31.0)
    );
    assert_eq!(stations[0].status, StationStatus::Active);

    // One network round trip, and the result was written durably.
    assert_eq!(client.requests().len(), 1);
    let persisted = store.load("aqicnStations-").expect("persisted entry");
    assert_eq!(persisted.stations, stations);
}

#[tokio::test]
async fn test_particulate_keys_are_cached_independently() {
    let client = RoutedClient::default();
    let catalog = json!([
        {
            "_id": "box-1",
            "name": "Kreuzberg",
            "currentLocation": {"coordinates": [13.42, 52.49]},
            "sensors": [
                {"title": "PM2.5", "lastMeasurement": {"value": "9.1"}},
                {"title": "PM10", "lastMeasurement": {"value": "14.0"}}
            ]
        }
    ])
    .to_string();
    client.route(
        "/boxes",
        vec![
            Ok(HttpResponse::ok(catalog.clone())),
            Ok(HttpResponse::ok(catalog)),
        ],
    );
    let store = MemoryStore::new();
    let registry = registry_with(&client, &store);

    registry.select_source(SourceId::OpenSense).await;
    let pm25 = registry.visible_stations().await;
    registry.select_pollutant(Pollutant::Pm10).await;
    let pm10 = registry.visible_stations().await;

    assert_eq!(pm25.len(), 1);
    assert_eq!(pm25[0].primary_index_value, 9.1);
    assert_eq!(pm10[0].primary_index_value, 14.0);

    // Each phenomenon fetched the catalog once and persisted under its own key.
    assert_eq!(client.requests().len(), 2);
    assert!(store.load("openSenseStations-PM2.5").is_some());
    assert!(store.load("openSenseStations-PM10").is_some());
}

#[tokio::test]
async fn test_paginated_source_collects_all_pages() {
    let client = RoutedClient::default();
    let record = |id: u64| {
        json!({
            "sensorsId": id,
            "locationsId": 500 + id,
            "value": 18.5,
            "coordinates": {"latitude": 51.5, "longitude": -0.12}
        })
    };
    let page = |ids: Vec<u64>| {
        json!({
            "meta": {"found": 3},
            "results": ids.into_iter().map(record).collect::<Vec<_>>()
        })
        .to_string()
    };
    client.route(
        "/v3/parameters/5/latest",
        vec![
            Ok(HttpResponse::ok(page(vec![1, 2]))),
            Ok(HttpResponse::ok(page(vec![3]))),
        ],
    );
    let store = MemoryStore::new();
    let registry = registry_with(&client, &store);

    // Pollutant first: switching the source initializes the combined key.
    registry.select_pollutant(Pollutant::No2).await;
    registry.select_source(SourceId::OpenAq).await;
    let stations = registry.visible_stations().await;

    assert_eq!(stations.len(), 3);
    assert_eq!(stations[0].display_name, "Location ID: 501");
    assert_eq!(client.requests().len(), 2);
    assert!(store.load("openAQStations-no2").is_some());

    // Both requests hit the NO2 parameter endpoint with the page counter.
    assert!(client.requests()[0].contains("page=1"));
    assert!(client.requests()[1].contains("page=2"));
}

#[tokio::test]
async fn test_point_selection_drives_single_record_source() {
    let client = RoutedClient::default();
    client.route(
        "/v2/city_ranking",
        vec![Ok(HttpResponse::ok(
            json!({
                "status": "success",
                "data": {
                    "city": "Berlin",
                    "state": "Berlin",
                    "country": "Germany",
                    "location": {"coordinates": [13.4, 52.52]},
                    "forecasts": [{"aqius": 58}]
                }
            })
            .to_string(),
        ))],
    );
    let store = MemoryStore::new();
    let registry = registry_with(&client, &store);

    registry.select_source(SourceId::IqAir).await;
    registry
        .select_point(Coordinate {
            lat: 52.52,
            lon: 13.4,
        })
        .await;
    let stations = registry.visible_stations().await;

    assert_eq!(stations.len(), 1);
    assert_eq!(stations[0].id, "Berlin-Berlin-Germany");
    assert_eq!(stations[0].primary_index_value, 58.0);
}

#[tokio::test]
async fn test_provider_failure_yields_empty_list_and_is_persisted() {
    let client = RoutedClient::default();
    client.route(
        "/v2/map/bounds",
        vec![Ok(HttpResponse::with_status(500, "upstream down"))],
    );
    let store = MemoryStore::new();
    let registry = registry_with(&client, &store);

    registry.select_source(SourceId::Aqicn).await;
    registry
        .select_viewport_bounds(BoundingBox {
            lat1: 0.0,
            lng1: 0.0,
            lat2: 1.0,
            lng2: 1.0,
        })
        .await;
    let stations = registry.visible_stations().await;

    assert!(stations.is_empty());
    // Failures still overwrite: the session serves what it last saw.
    let persisted = store.load("aqicnStations-").expect("persisted entry");
    assert!(persisted.stations.is_empty());
}

#[tokio::test]
async fn test_sensor_summary_combines_metadata_and_features() {
    let client = RoutedClient::default();
    client.route(
        "/sensor-summary/as-geojson",
        vec![Ok(HttpResponse::ok(
            json!([
                {
                    "sensorid": 18,
                    "sensorType": "SCK",
                    "geojson": {
                        "type": "FeatureCollection",
                        "features": [
                            {
                                "type": "Feature",
                                "geometry": {
                                    "type": "Polygon",
                                    "coordinates": [[[ -1.89, 52.48 ], [ -1.88, 52.48 ], [ -1.88, 52.49 ], [ -1.89, 52.48 ]]]
                                },
                                "properties": {
                                    "datetime_UTC": "2026-08-29 10:00:00",
                                    "particulatePM2.5_mean": 7.5
                                }
                            },
                            {
                                "type": "Feature",
                                "geometry": {"type": "Point", "coordinates": [-1.89, 52.48]},
                                "properties": {"datetime_UTC": "2026-08-29 10:00:00"}
                            }
                        ]
                    }
                }
            ])
            .to_string(),
        ))],
    );
    let store = MemoryStore::new();
    let registry = registry_with(&client, &store);

    let query = aq_stations::sources::SensorQuery {
        date: "2026-08-29".to_string(),
        method: aq_stations::sources::AveragingMethod::Mean,
        frequency: "1H".to_string(),
    };
    let summary = registry.sensor_summary(&query).await.expect("summary");

    // The point feature is filtered out; the polygon carries its sensor tag.
    assert_eq!(summary.features.len(), 1);
    assert_eq!(summary.features[0].properties.sensorid, Some(18));

    // The requested window is the day plus its successor, day-first.
    let url = &client.requests()[0];
    assert!(url.contains("29-08-2026"));
    assert!(url.contains("30-08-2026"));
}

#[tokio::test]
async fn test_recent_durable_entry_is_adopted_then_refreshed_on_view() {
    let client = RoutedClient::default();
    client.route("/v2/map/bounds", vec![Ok(HttpResponse::ok(bounds_body()))]);
    let store = MemoryStore::new();
    store.seed(
        "aqicnStations-",
        PersistedStations {
            stations: vec![aq_stations::model::StationRecord {
                id: "stale-1".to_string(),
                longitude: -118.2,
                latitude: 34.1,
                display_name: "Previous Session".to_string(),
                primary_index_value: 50.0,
                status: StationStatus::Active,
                pollutant_readings: Default::default(),
                raw_details: None,
            }],
            timestamp: chrono::Utc::now().timestamp_millis() - 60 * 60 * 1000,
        },
    );
    let registry = registry_with(&client, &store);

    registry.select_source(SourceId::Aqicn).await;
    // Adoption is silent: no network traffic on selection.
    assert!(client.requests().is_empty());

    registry
        .select_viewport_bounds(BoundingBox {
            lat1: 34.05,
            lng1: -118.25,
            lat2: 34.15,
            lng2: -118.15,
        })
        .await;
    let stations = registry.visible_stations().await;

    assert_eq!(stations.len(), 1);
    assert_eq!(client.requests().len(), 1);
}
