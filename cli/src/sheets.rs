use anyhow::{Context, Result, bail};

use brewlog_core::models::BrewRecord;
use brewlog_core::router::{CacheRouter, FetchRequest, Fetcher, ResponseSource};
use brewlog_core::service::{BrewStore, interpret_push_response};

use crate::fetch::HttpFetcher;

/// Google Sheets backend: reads the published CSV export and writes through
/// the Apps Script web app. Both go through the cache router, which treats
/// them as live data.
pub struct SheetsClient<F = HttpFetcher> {
    router: CacheRouter<F>,
    csv_url: String,
    script_url: String,
}

impl<F: Fetcher> SheetsClient<F> {
    pub fn new(router: CacheRouter<F>, csv_url: &str, script_url: &str) -> Self {
        Self {
            router,
            csv_url: csv_url.to_string(),
            script_url: script_url.to_string(),
        }
    }
}

impl<F: Fetcher + Sync> BrewStore for SheetsClient<F> {
    async fn fetch_csv(&self) -> Result<String> {
        let routed = self
            .router
            .handle(&FetchRequest::get(self.csv_url.as_str()))
            .await
            .context("Failed to reach the brew sheet")?;
        if routed.source == ResponseSource::Cache {
            tracing::warn!(url = %self.csv_url, "sheet unreachable, using cached copy");
        }

        let response = routed.response;
        if !response.is_success() {
            bail!("Failed to load data: {}", response.status);
        }

        String::from_utf8(response.body).context("Failed to read the brew sheet")
    }

    async fn push_brew(&self, brew: &BrewRecord) -> Result<()> {
        let body = serde_json::to_string(brew)?;
        // The script endpoint parses the raw body itself.
        let request = FetchRequest::post(self.script_url.as_str(), "text/plain;charset=utf-8", body);
        let routed = self
            .router
            .handle(&request)
            .await
            .context("Failed to reach the script endpoint")?;

        let status = routed.response.status;
        let text = String::from_utf8_lossy(&routed.response.body);
        tracing::debug!(status, id = %brew.id, "push response");
        interpret_push_response(status, &text)
    }
}
