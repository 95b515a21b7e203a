use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;

use brewlog_core::cache::CachedResponse;
use brewlog_core::router::{FetchRequest, Fetcher};

pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!(
            "brewlog/{} (fermentation log)",
            env!("CARGO_PKG_VERSION")
        ))
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")
}

/// Network side of the cache router.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if let Some(content_type) = &request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let resp = builder
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", request.url))?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read response from {}", request.url))?
            .to_vec();

        Ok(CachedResponse {
            status,
            content_type,
            body,
        })
    }
}
