//! Shared data model: the uniform station record every provider adapter
//! produces, the pollutant taxonomy, and the cache key types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A measured substance. The set is fixed; adapters never emit readings for
/// keys outside it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
    ];

    /// Lowercase key used in serialized readings and storage keys.
    pub fn as_key(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::O3 => "o3",
            Pollutant::No2 => "no2",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
        }
    }

    /// OpenAQ `parameters/{id}` identifier for this pollutant.
    pub fn openaq_parameter_id(&self) -> u32 {
        match self {
            Pollutant::Pm10 => 1,
            Pollutant::Pm25 => 2,
            Pollutant::O3 => 3,
            Pollutant::No2 => 5,
            Pollutant::So2 => 6,
            Pollutant::Co => 8,
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

impl FromStr for Pollutant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pm25" | "pm2.5" => Ok(Pollutant::Pm25),
            "pm10" => Ok(Pollutant::Pm10),
            "o3" => Ok(Pollutant::O3),
            "no2" => Ok(Pollutant::No2),
            "so2" => Ok(Pollutant::So2),
            "co" => Ok(Pollutant::Co),
            other => Err(format!("unknown pollutant '{other}'")),
        }
    }
}

/// The two particulate phenomena the openSenseMap network reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Particulate {
    Pm25,
    Pm10,
}

impl Particulate {
    /// The sensor title the openSenseMap catalog uses for this phenomenon.
    pub fn phenomenon(&self) -> &'static str {
        match self {
            Particulate::Pm25 => "PM2.5",
            Particulate::Pm10 => "PM10",
        }
    }
}

impl From<Particulate> for Pollutant {
    fn from(p: Particulate) -> Self {
        match p {
            Particulate::Pm25 => Pollutant::Pm25,
            Particulate::Pm10 => Pollutant::Pm10,
        }
    }
}

impl TryFrom<Pollutant> for Particulate {
    type Error = Pollutant;

    fn try_from(p: Pollutant) -> Result<Self, Pollutant> {
        match p {
            Pollutant::Pm25 => Ok(Particulate::Pm25),
            Pollutant::Pm10 => Ok(Particulate::Pm10),
            other => Err(other),
        }
    }
}

/// Whether the physical sensor behind a record is currently reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    Active,
    Inactive,
    Unknown,
}

/// One external air-quality data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// AQICN / WAQI near-real-time index, queried by bounding box.
    Aqicn,
    /// openSenseMap low-cost sensor network, full-catalog retrieval.
    OpenSense,
    /// OpenAQ regulatory multi-pollutant provider, paginated.
    OpenAq,
    /// IQAir weather-derived provider, single reporting point.
    IqAir,
    /// Aston fixed local-sensor network, polygon GeoJSON output.
    Aston,
}

impl SourceId {
    /// Prefix used in durable storage keys (`"<source>Stations-<pollutant>"`).
    pub fn storage_prefix(&self) -> &'static str {
        match self {
            SourceId::Aqicn => "aqicn",
            SourceId::OpenSense => "openSense",
            SourceId::OpenAq => "openAQ",
            SourceId::IqAir => "iqAir",
            SourceId::Aston => "aston",
        }
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aqicn" => Ok(SourceId::Aqicn),
            "opensense" | "opensensemap" => Ok(SourceId::OpenSense),
            "openaq" => Ok(SourceId::OpenAq),
            "iqair" => Ok(SourceId::IqAir),
            "aston" => Ok(SourceId::Aston),
            other => Err(format!("unknown source '{other}'")),
        }
    }
}

/// Cache key: a source plus the pollutant variant where the source has one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub source: SourceId,
    pub pollutant: Option<Pollutant>,
}

impl SourceKey {
    pub fn new(source: SourceId, pollutant: Option<Pollutant>) -> Self {
        Self { source, pollutant }
    }

    /// Durable storage key, pattern `"<source>Stations-<pollutantOrEmpty>"`.
    ///
    /// The sensor-network source keeps the phenomenon spelling
    /// (`"PM2.5"`/`"PM10"`) its persisted entries have always used.
    pub fn storage_key(&self) -> String {
        let fragment = match (self.source, self.pollutant) {
            (SourceId::OpenSense, Some(p)) => Particulate::try_from(p)
                .map(|part| part.phenomenon())
                .unwrap_or_else(|p| p.as_key()),
            (_, Some(p)) => p.as_key(),
            (_, None) => "",
        };
        format!("{}Stations-{}", self.source.storage_prefix(), fragment)
    }
}

/// Geographic bounding box given as two corner coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat1: f64,
    pub lng1: f64,
    pub lat2: f64,
    pub lng2: f64,
}

/// A single WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// The uniform output record of every provider adapter.
///
/// Immutable once produced; refreshes replace whole arrays rather than
/// mutating records in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub display_name: String,
    pub primary_index_value: f64,
    pub status: StationStatus,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pollutant_readings: BTreeMap<Pollutant, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_details: Option<serde_json::Value>,
}

impl StationRecord {
    /// Validates the record invariants: non-empty id and coordinates within
    /// WGS84 range. Adapters drop records failing this instead of emitting
    /// them.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(lat: f64, lon: f64) -> StationRecord {
        StationRecord {
            id: "s1".to_string(),
            longitude: lon,
            latitude: lat,
            display_name: "Test".to_string(),
            primary_index_value: 10.0,
            status: StationStatus::Active,
            pollutant_readings: BTreeMap::new(),
            raw_details: None,
        }
    }

    #[test]
    fn test_valid_record() {
        assert!(record(34.1, -118.2).is_valid());
    }

    #[test]
    fn test_out_of_range_latitude_is_invalid() {
        assert!(!record(200.0, -118.2).is_valid());
    }

    #[test]
    fn test_out_of_range_longitude_is_invalid() {
        assert!(!record(34.1, -200.0).is_valid());
    }

    #[test]
    fn test_empty_id_is_invalid() {
        let mut r = record(34.1, -118.2);
        r.id = String::new();
        assert!(!r.is_valid());
    }

    #[test]
    fn test_opensense_storage_key_keeps_phenomenon_spelling() {
        let key = SourceKey::new(SourceId::OpenSense, Some(Pollutant::Pm25));
        assert_eq!(key.storage_key(), "openSenseStations-PM2.5");
    }

    #[test]
    fn test_storage_key_without_pollutant() {
        let key = SourceKey::new(SourceId::Aqicn, None);
        assert_eq!(key.storage_key(), "aqicnStations-");
    }

    #[test]
    fn test_openaq_storage_key_uses_lowercase_pollutant() {
        let key = SourceKey::new(SourceId::OpenAq, Some(Pollutant::No2));
        assert_eq!(key.storage_key(), "openAQStations-no2");
    }

    #[test]
    fn test_pollutant_parse_accepts_dotted_pm25() {
        assert_eq!("PM2.5".parse::<Pollutant>().unwrap(), Pollutant::Pm25);
    }

    #[test]
    fn test_readings_serialize_in_stable_order() {
        let mut readings = BTreeMap::new();
        readings.insert(Pollutant::Co, 0.4);
        readings.insert(Pollutant::Pm25, 18.0);
        let mut r = record(34.1, -118.2);
        r.pollutant_readings = readings;

        let json = serde_json::to_string(&r).unwrap();
        let pm25 = json.find("pm25").unwrap();
        let co = json.find("\"co\"").unwrap();
        assert!(pm25 < co, "pm25 must serialize before co");
    }
}
