//! Provider endpoint and credential configuration.
//!
//! Everything comes from the environment (a `.env` file is loaded by the
//! binary before this runs). A missing credential is not an error here:
//! adapters fail soft at call time per their contract.

use std::env;

/// Base URL and optional API key for one provider.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Endpoint {
    fn from_env(url_var: &str, default_url: &str, key_var: Option<&str>) -> Self {
        Self {
            base_url: env::var(url_var).unwrap_or_else(|_| default_url.to_string()),
            api_key: key_var.and_then(|v| env::var(v).ok()),
        }
    }
}

/// Endpoints for the five providers, fixed at construction.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub aqicn: Endpoint,
    pub opensense: Endpoint,
    pub openaq: Endpoint,
    pub iqair: Endpoint,
    /// The Aston network treats a missing base URL as a hard precondition
    /// failure, so no default is substituted here.
    pub aston_base_url: Option<String>,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self {
            aqicn: Endpoint::from_env(
                "AQICN_API_URL",
                "https://api.waqi.info",
                Some("AQICN_API_KEY"),
            ),
            opensense: Endpoint::from_env(
                "OPENSENSE_API_URL",
                "https://api.opensensemap.org",
                None,
            ),
            openaq: Endpoint::from_env(
                "OPENAQ_API_URL",
                "https://api.openaq.org",
                Some("OPENAQ_API_KEY"),
            ),
            iqair: Endpoint::from_env(
                "IQAIR_API_URL",
                "http://api.airvisual.com",
                Some("IQAIR_API_KEY"),
            ),
            aston_base_url: env::var("AIRQUALITY_API_URL").ok(),
        }
    }
}
