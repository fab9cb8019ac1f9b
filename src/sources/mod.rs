//! Provider adapters, one per external data source.
//!
//! Every adapter follows the same contract: an async `fetch` that never
//! returns an error to the caller. Transport failures, non-2xx statuses, and
//! malformed payloads all degrade to an empty result with a logged
//! diagnostic; records that fail validation (missing id, coordinates out of
//! WGS84 range) are dropped from the output. Retries are the cache manager's
//! business, not the adapters'.

mod aqicn;
mod aston;
mod iqair;
mod openaq;
mod opensense;

pub use aqicn::AqicnAdapter;
pub use aston::{
    AstonAdapter, AveragingMethod, Geometry, SensorFeature, SensorProperties, SensorQuery,
    SensorSummary,
};
pub use iqair::IqAirAdapter;
pub use openaq::OpenAqAdapter;
pub use opensense::OpenSenseAdapter;

use serde_json::Value;

/// Narrows a JSON scalar to a numeric value the way the original providers
/// are handled: numbers pass through, numeric strings are parsed, and
/// anything else becomes `0.0` rather than an error.
pub(crate) fn parse_numeric(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Narrows a JSON scalar to a station id. Providers disagree on whether ids
/// are strings or integers; both are accepted, empty strings are not.
pub(crate) fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
