use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderName;

use crate::fetch::client::{HttpClient, HttpResponse};

/// An [`HttpClient`] wrapper that injects an API key as an HTTP header.
///
/// `header_name` is the header field to set (OpenAQ authenticates with
/// `"X-API-Key"`). `key` is the raw value written into that header.
pub struct ApiKey<C> {
    pub inner: C,
    pub header_name: String,
    pub key: String,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            inner,
            header_name: header_name.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> Result<HttpResponse> {
        let header_name = HeaderName::from_bytes(self.header_name.as_bytes())
            .map_err(|e| anyhow::anyhow!("ApiKey: invalid header name: {e}"))?;
        let value = self
            .key
            .parse()
            .map_err(|_| anyhow::anyhow!("ApiKey: key is not a valid header value"))?;
        req.headers_mut().insert(header_name, value);
        self.inner.execute(req).await
    }
}
