//! Durable station persistence.
//!
//! One JSON document per cache key, read once at initialization and written
//! after every successful fetch. Store failures are logged and swallowed;
//! durability is an optimization, never a correctness requirement.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::StationRecord;

/// The persisted payload: the station array plus the epoch-millis timestamp
/// of the fetch that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedStations {
    pub stations: Vec<StationRecord>,
    pub timestamp: i64,
}

pub trait StationStore: Send + Sync {
    fn load(&self, key: &str) -> Option<PersistedStations>;
    fn save(&self, key: &str, data: &PersistedStations);
}

/// File-backed store: `<dir>/<key>.json`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StationStore for FileStore {
    fn load(&self, key: &str) -> Option<PersistedStations> {
        let path = self.path(key);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(key, error = %e, "discarding unreadable persisted entry");
                None
            }
        }
    }

    fn save(&self, key: &str, data: &PersistedStations) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(key, error = %e, "cannot create cache directory");
            return;
        }
        let json = match serde_json::to_string(data) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "cannot serialize persisted entry");
                return;
            }
        };
        if let Err(e) = fs::write(self.path(key), json) {
            warn!(key, error = %e, "cannot write persisted entry");
        }
    }
}

/// In-memory store for sessions that should not touch disk, and for tests.
/// Clones share the same backing map.
#[derive(Default, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, PersistedStations>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds an entry, mimicking a previous session's write.
    pub fn seed(&self, key: &str, data: PersistedStations) {
        self.entries.lock().unwrap().insert(key.to_string(), data);
    }
}

impl StationStore for MemoryStore {
    fn load(&self, key: &str) -> Option<PersistedStations> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn save(&self, key: &str, data: &PersistedStations) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), data.clone());
    }
}
