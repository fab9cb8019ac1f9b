use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::client::{HttpClient, HttpResponse};

/// Plain [`HttpClient`] over a shared [`reqwest::Client`].
///
/// Providers give no latency guarantees, so the client enforces its own
/// request and connect timeouts rather than letting a dead upstream hang a
/// refresh forever.
#[derive(Clone)]
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self(client)
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> Result<HttpResponse> {
        let resp = self.0.execute(req).await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}
