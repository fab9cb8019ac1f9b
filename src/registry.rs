//! Session-level station registry.
//!
//! Holds the UI's current selection (source, pollutant, viewport bounds,
//! point), routes cache keys to the right provider adapter, and runs the
//! fixed refresh timer for the sensor-network source. The presentation layer
//! talks only to this type: selections in, normalized station arrays (or the
//! Aston polygon collection) out.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{CacheConfig, StationCache, StationFetcher, StationStore};
use crate::config::ProviderConfig;
use crate::fetch::HttpClient;
use crate::fetch::auth::{ApiKey, UrlParam};
use crate::model::{
    BoundingBox, Coordinate, Particulate, Pollutant, SourceId, SourceKey, StationRecord,
};
use crate::sources::{
    AqicnAdapter, AstonAdapter, IqAirAdapter, OpenAqAdapter, OpenSenseAdapter, SensorQuery,
    SensorSummary,
};

/// Query parameters that arrive from the UI rather than the cache key.
#[derive(Debug, Default, Clone, Copy)]
struct QueryState {
    bounds: Option<BoundingBox>,
    point: Option<Coordinate>,
}

/// Dispatches a cache key to the adapter that serves it, injecting whatever
/// per-session query state that adapter needs.
pub struct AdapterRouter<C> {
    aqicn: AqicnAdapter<UrlParam<C>>,
    opensense: OpenSenseAdapter<C>,
    openaq: OpenAqAdapter<ApiKey<C>>,
    iqair: IqAirAdapter<UrlParam<C>>,
    query: RwLock<QueryState>,
}

impl<C: HttpClient + Clone> AdapterRouter<C> {
    pub fn new(client: C, config: &ProviderConfig) -> Self {
        // Missing credentials become empty tokens here; the provider rejects
        // them at call time and the adapter fails soft, per contract.
        Self {
            aqicn: AqicnAdapter::new(
                UrlParam::new(
                    client.clone(),
                    "token",
                    config.aqicn.api_key.clone().unwrap_or_default(),
                ),
                config.aqicn.base_url.clone(),
            ),
            opensense: OpenSenseAdapter::new(client.clone(), config.opensense.base_url.clone()),
            openaq: OpenAqAdapter::new(
                ApiKey::new(
                    client.clone(),
                    "X-API-Key",
                    config.openaq.api_key.clone().unwrap_or_default(),
                ),
                config.openaq.base_url.clone(),
            ),
            iqair: IqAirAdapter::new(
                UrlParam::new(
                    client,
                    "key",
                    config.iqair.api_key.clone().unwrap_or_default(),
                ),
                config.iqair.base_url.clone(),
            ),
            query: RwLock::new(QueryState::default()),
        }
    }
}

impl<C> AdapterRouter<C> {
    async fn set_bounds(&self, bounds: BoundingBox) {
        self.query.write().await.bounds = Some(bounds);
    }

    async fn set_point(&self, point: Coordinate) {
        self.query.write().await.point = Some(point);
    }
}

#[async_trait]
impl<C: HttpClient> StationFetcher for AdapterRouter<C> {
    async fn fetch_stations(&self, key: &SourceKey) -> Vec<StationRecord> {
        match key.source {
            SourceId::Aqicn => {
                let bounds = self.query.read().await.bounds;
                match bounds {
                    Some(b) => self.aqicn.fetch(&b).await,
                    None => {
                        warn!("no viewport bounds selected yet");
                        Vec::new()
                    }
                }
            }
            SourceId::OpenSense => {
                match key.pollutant.and_then(|p| Particulate::try_from(p).ok()) {
                    Some(phenomenon) => self.opensense.fetch(phenomenon).await,
                    None => {
                        warn!("sensor network serves only particulate phenomena");
                        Vec::new()
                    }
                }
            }
            SourceId::OpenAq => match key.pollutant {
                Some(pollutant) => self.openaq.fetch(pollutant).await,
                None => {
                    warn!("no pollutant selected for the regulatory source");
                    Vec::new()
                }
            },
            SourceId::IqAir => {
                let point = self.query.read().await.point;
                match point {
                    Some(p) => self.iqair.fetch(&p).await,
                    None => {
                        warn!("no reporting point selected yet");
                        Vec::new()
                    }
                }
            }
            SourceId::Aston => {
                // Geometry source: served by `sensor_summary`, never cached
                // as a station list.
                warn!("Aston source has no station list");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    source: SourceId,
    pollutant: Pollutant,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            source: SourceId::Aqicn,
            pollutant: Pollutant::Pm25,
        }
    }
}

pub struct StationRegistry<C: HttpClient, S: StationStore + 'static> {
    cache: Arc<StationCache<AdapterRouter<C>, S>>,
    router: Arc<AdapterRouter<C>>,
    aston: AstonAdapter<C>,
    selection: Mutex<Selection>,
    initialized: Mutex<HashSet<SourceKey>>,
    timer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<C, S> StationRegistry<C, S>
where
    C: HttpClient + Clone + 'static,
    S: StationStore + 'static,
{
    pub fn new(client: C, config: &ProviderConfig, cache_config: CacheConfig, store: S) -> Self {
        let router = Arc::new(AdapterRouter::new(client.clone(), config));
        let cache = Arc::new(StationCache::new(
            cache_config,
            Arc::clone(&router),
            store,
        ));
        Self {
            cache,
            router,
            aston: AstonAdapter::new(client, config.aston_base_url.clone()),
            selection: Mutex::new(Selection::default()),
            initialized: Mutex::new(HashSet::new()),
            timer: std::sync::Mutex::new(None),
        }
    }

    /// Switches the active source. The first time a key is seen it is
    /// initialized from the durable cache; while the sensor-network source is
    /// active a fixed-interval timer force-refreshes both particulate keys.
    pub async fn select_source(&self, source: SourceId) {
        self.selection.lock().await.source = source;
        self.manage_timer(source);
        let key = self.current_key().await;
        self.ensure_initialized(&key).await;
    }

    pub async fn select_pollutant(&self, pollutant: Pollutant) {
        self.selection.lock().await.pollutant = pollutant;
        let key = self.current_key().await;
        self.ensure_initialized(&key).await;
    }

    /// Stores the viewport; the bounding-box source refreshes immediately
    /// when it is the active one.
    pub async fn select_viewport_bounds(&self, bounds: BoundingBox) {
        self.router.set_bounds(bounds).await;
        if self.selection.lock().await.source == SourceId::Aqicn {
            self.cache
                .force_refresh(&SourceKey::new(SourceId::Aqicn, None))
                .await;
        }
    }

    /// Stores the reporting point; the single-point source refreshes
    /// immediately when it is the active one.
    pub async fn select_point(&self, point: Coordinate) {
        self.router.set_point(point).await;
        if self.selection.lock().await.source == SourceId::IqAir {
            self.cache
                .force_refresh(&SourceKey::new(SourceId::IqAir, None))
                .await;
        }
    }

    /// The station array for the current selection, via the cache policy.
    pub async fn visible_stations(&self) -> Vec<StationRecord> {
        let key = self.current_key().await;
        self.ensure_initialized(&key).await;
        self.cache.get_visible_stations(&key).await
    }

    pub async fn force_refresh(&self) {
        let key = self.current_key().await;
        self.cache.force_refresh(&key).await;
    }

    /// One day of combined sensor polygons; `None` means nothing to draw.
    pub async fn sensor_summary(&self, query: &SensorQuery) -> Option<SensorSummary> {
        self.aston.fetch(query).await
    }

    async fn current_key(&self) -> SourceKey {
        let selection = *self.selection.lock().await;
        let pollutant = match selection.source {
            SourceId::OpenSense | SourceId::OpenAq => Some(selection.pollutant),
            SourceId::Aqicn | SourceId::IqAir | SourceId::Aston => None,
        };
        SourceKey::new(selection.source, pollutant)
    }

    async fn ensure_initialized(&self, key: &SourceKey) {
        {
            let mut initialized = self.initialized.lock().await;
            if !initialized.insert(key.clone()) {
                return;
            }
        }
        self.cache.initialize(key).await;
    }

    fn manage_timer(&self, source: SourceId) {
        let mut timer = self.timer.lock().unwrap();
        if source == SourceId::OpenSense {
            if timer.is_none() {
                let cache = Arc::clone(&self.cache);
                let interval = cache.config().refresh_interval;
                *timer = Some(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.tick().await; // first tick completes immediately
                    loop {
                        ticker.tick().await;
                        // Detached: aborting the timer stops the ticking but
                        // lets a refresh already in flight run to completion.
                        tokio::spawn(Arc::clone(&cache).refresh_all(vec![
                            SourceKey::new(SourceId::OpenSense, Some(Pollutant::Pm25)),
                            SourceKey::new(SourceId::OpenSense, Some(Pollutant::Pm10)),
                        ]));
                    }
                }));
                info!("sensor network refresh timer started");
            }
        } else if let Some(handle) = timer.take() {
            handle.abort();
            info!("sensor network refresh timer stopped");
        }
    }
}

impl<C: HttpClient, S: StationStore + 'static> Drop for StationRegistry<C, S> {
    fn drop(&mut self) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }
    }
}
