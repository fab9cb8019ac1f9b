//! Per-key station cache with TTL refresh, single-flight coalescing, and
//! durable adoption.
//!
//! All access to station data goes through [`StationCache`]. For each
//! `(source, pollutant)` key it keeps an in-memory array, the time of the
//! last successful fetch, and an in-flight flag guaranteeing at most one
//! outstanding fetch per key. Fetches for different keys run fully
//! concurrently and share no state.

mod store;

pub use store::{FileStore, MemoryStore, PersistedStations, StationStore};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::model::{SourceKey, StationRecord};

/// Freshness policy, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Minimum age before a background refresh is attempted.
    pub refresh_interval: Duration,
    /// Age beyond which a durably persisted entry is discarded at startup.
    pub max_cache_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(10 * 60),
            max_cache_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// The cache's view of a provider: one infallible fetch per key. Implemented
/// by the adapter router; tests substitute counters and canned data.
#[async_trait]
pub trait StationFetcher: Send + Sync {
    async fn fetch_stations(&self, key: &SourceKey) -> Vec<StationRecord>;
}

#[derive(Default)]
struct CacheEntry {
    stations: Vec<StationRecord>,
    /// Epoch millis of the last completed fetch this session; 0 = never.
    last_fetch: i64,
    in_flight: bool,
}

pub struct StationCache<F, S> {
    config: CacheConfig,
    fetcher: Arc<F>,
    store: S,
    // Held only for short synchronous sections, never across an await.
    entries: Mutex<HashMap<SourceKey, CacheEntry>>,
}

/// Clears a key's in-flight flag on drop. The fetch await inside `refresh`
/// is a cancellation point; without this, an aborted refresh would leave the
/// flag stuck and the key would never fetch again.
struct InFlightGuard<'a> {
    entries: &'a Mutex<HashMap<SourceKey, CacheEntry>>,
    key: SourceKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.get_mut(&self.key) {
                entry.in_flight = false;
            }
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl<F, S> StationCache<F, S>
where
    F: StationFetcher + 'static,
    S: StationStore + 'static,
{
    pub fn new(config: CacheConfig, fetcher: Arc<F>, store: S) -> Self {
        Self {
            config,
            fetcher,
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Startup path: adopt a young, non-empty persisted entry without a
    /// network call, otherwise fetch.
    ///
    /// Adoption deliberately leaves `last_fetch` at 0, so the first
    /// visibility check still refreshes in the background.
    pub async fn initialize(&self, key: &SourceKey) {
        if let Some(persisted) = self.store.load(&key.storage_key()) {
            let age = now_millis().saturating_sub(persisted.timestamp);
            let fresh_enough = age < self.config.max_cache_age.as_millis() as i64;
            if fresh_enough && !persisted.stations.is_empty() {
                info!(
                    key = key.storage_key(),
                    count = persisted.stations.len(),
                    "adopting persisted stations"
                );
                let mut entries = self.entries.lock().unwrap();
                entries.entry(key.clone()).or_default().stations = persisted.stations;
                return;
            }
        }
        self.refresh(key).await;
    }

    /// Returns the current array for `key`, refreshing first when the entry
    /// is older than `refresh_interval`. A caller whose entry is due waits
    /// for that refresh to finish and receives fresh data; a caller arriving
    /// while a refresh is already in flight never waits and gets the
    /// existing, possibly stale, array immediately.
    pub async fn get_visible_stations(&self, key: &SourceKey) -> Vec<StationRecord> {
        let due = {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.entry(key.clone()).or_default();
            !entry.in_flight
                && now_millis() - entry.last_fetch > self.config.refresh_interval.as_millis() as i64
        };
        if due {
            self.refresh(key).await;
        }

        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .map(|e| e.stations.clone())
            .unwrap_or_default()
    }

    /// Unconditional refresh, still subject to the single-flight guard.
    pub async fn force_refresh(&self, key: &SourceKey) {
        self.refresh(key).await;
    }

    /// Refreshes several keys concurrently (the sensor-network timer path).
    pub async fn refresh_all(self: Arc<Self>, keys: Vec<SourceKey>) {
        let mut set = JoinSet::new();
        for key in keys {
            let cache = Arc::clone(&self);
            set.spawn(async move { cache.refresh(&key).await });
        }
        while set.join_next().await.is_some() {}
    }

    async fn refresh(&self, key: &SourceKey) {
        {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.entry(key.clone()).or_default();
            if entry.in_flight {
                // Coalesced: the caller proceeds with whatever is cached.
                debug!(key = key.storage_key(), "refresh already in flight");
                return;
            }
            entry.in_flight = true;
        }
        let _guard = InFlightGuard {
            entries: &self.entries,
            key: key.clone(),
        };

        // The fetcher is infallible by contract; failures arrive as empty
        // arrays and replace the cache like any other result.
        let stations = self.fetcher.fetch_stations(key).await;
        let now = now_millis();

        self.store.save(
            &key.storage_key(),
            &PersistedStations {
                stations: stations.clone(),
                timestamp: now,
            },
        );

        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_default();
        entry.stations = stations;
        entry.last_fetch = now;
        entry.in_flight = false;
    }
}
