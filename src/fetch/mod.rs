//! HTTP transport seam shared by all provider adapters.
//!
//! Adapters talk to [`HttpClient`], never to `reqwest` directly, so tests can
//! substitute canned responses and auth wrappers can decorate requests.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::{HttpClient, HttpResponse};

use anyhow::{Result, bail};
use reqwest::{Method, Url};

/// Issues a GET and deserializes the JSON body.
///
/// # Errors
///
/// Fails on transport errors, a non-2xx status (the body text is carried in
/// the error message), or a body that is not valid JSON for `T`.
pub async fn get_json<C: HttpClient, T: serde::de::DeserializeOwned>(
    client: &C,
    url: Url,
) -> Result<T> {
    let req = reqwest::Request::new(Method::GET, url);
    let resp = client.execute(req).await?;
    if !resp.is_success() {
        bail!("server returned {}: {}", resp.status, resp.text());
    }
    resp.json()
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedClient;
    use super::*;
    use serde_json::Value;

    fn url() -> Url {
        "https://example.test/data".parse().unwrap()
    }

    #[tokio::test]
    async fn test_get_json_parses_body() {
        let client = ScriptedClient::ok(r#"{"a": 1}"#);
        let v: Value = get_json(&client, url()).await.unwrap();
        assert_eq!(v["a"], 1);
    }

    #[tokio::test]
    async fn test_get_json_fails_on_non_2xx() {
        let client = ScriptedClient::status(500, "Internal Server Error");
        let result: Result<Value> = get_json(&client, url()).await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("500"));
        assert!(err.contains("Internal Server Error"));
    }

    #[tokio::test]
    async fn test_get_json_fails_on_invalid_json() {
        let client = ScriptedClient::ok("not json");
        let result: Result<Value> = get_json(&client, url()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_url_param_appends_key() {
        let wrapped = auth::UrlParam::new(ScriptedClient::ok("{}"), "token", "secret");
        let _: Value = get_json(&wrapped, url()).await.unwrap();
        assert!(wrapped.inner.request_urls()[0].contains("token=secret"));
    }
}
