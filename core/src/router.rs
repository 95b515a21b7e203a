//! Offline cache routing.
//!
//! Every outbound request is classified by host and served with one of three
//! strategies:
//!
//! | class               | strategy                                         |
//! |---------------------|--------------------------------------------------|
//! | live data           | network first, never cached, cache only on error |
//! | third-party assets  | network first, successful responses cached       |
//! | app shell           | cache first, filled from the network on a miss   |
//!
//! Everything else goes straight to the network.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use http::Uri;

use crate::cache::{CacheStore, CachedResponse};

/// Current cache namespace. Bumping it retires every older namespace on
/// the next [`CacheRouter::activate`].
pub const CACHE_NAME: &str = "brew-tracker-v1";

/// App-shell paths pre-cached by [`CacheRouter::install`].
pub const APP_SHELL: [&str; 6] = [
    "/",
    "/index.html",
    "/style.css",
    "/script.js",
    "/manifest.webmanifest",
    "/icons/icon.svg",
];

/// Spreadsheet export and script endpoint.
pub const LIVE_DATA_HOSTS: [&str; 2] = ["docs.google.com", "script.google.com"];

/// CDNs serving the charting and CSV libraries.
pub const ASSET_HOSTS: [&str; 2] = ["cdn.jsdelivr.net", "cdnjs.cloudflare.com"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    LiveData,
    ThirdPartyAsset,
    AppShell,
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: http::Method,
    pub url: String,
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            url: url.into(),
            content_type: None,
            body: None,
        }
    }

    #[must_use]
    pub fn post(url: impl Into<String>, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: http::Method::POST,
            url: url.into(),
            content_type: Some(content_type.to_string()),
            body: Some(body.into()),
        }
    }

    fn cacheable(&self) -> bool {
        self.method == http::Method::GET
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedResponse {
    pub response: CachedResponse,
    pub source: ResponseSource,
    pub class: RouteClass,
}

/// Performs the actual network request.
///
/// `Err` means the network could not be reached; an HTTP error status is
/// still `Ok`.
pub trait Fetcher {
    fn fetch(&self, request: &FetchRequest)
    -> impl Future<Output = Result<CachedResponse>> + Send;
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Scheme + host (+ port) the app shell is served from. Empty when there
    /// is no app shell, as for the CLI's own sheet traffic.
    pub origin: String,
    pub cache_name: String,
    pub live_data_hosts: Vec<String>,
    pub asset_hosts: Vec<String>,
}

impl RouterConfig {
    #[must_use]
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            cache_name: CACHE_NAME.to_string(),
            live_data_hosts: LIVE_DATA_HOSTS.iter().map(ToString::to_string).collect(),
            asset_hosts: ASSET_HOSTS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Router for clients that only talk to remote hosts.
    #[must_use]
    pub fn without_shell() -> Self {
        Self::new("")
    }

    /// Classify an absolute URL. Unparseable URLs pass straight through.
    #[must_use]
    pub fn classify(&self, url: &str) -> RouteClass {
        let Ok(uri) = url.parse::<Uri>() else {
            return RouteClass::Passthrough;
        };
        let Some(host) = uri.host().map(str::to_ascii_lowercase) else {
            return RouteClass::Passthrough;
        };

        if matches_any(&host, &self.live_data_hosts) {
            RouteClass::LiveData
        } else if matches_any(&host, &self.asset_hosts) {
            RouteClass::ThirdPartyAsset
        } else if !self.origin.is_empty()
            && origin_of(&uri).is_some_and(|o| o.eq_ignore_ascii_case(&self.origin))
        {
            RouteClass::AppShell
        } else {
            RouteClass::Passthrough
        }
    }

    /// Absolute URL for an app-shell path.
    #[must_use]
    pub fn shell_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.origin)
        } else {
            format!("{}/{path}", self.origin)
        }
    }
}

/// Host equal to, or a subdomain of, one of `hosts`.
fn matches_any(host: &str, hosts: &[String]) -> bool {
    hosts.iter().any(|h| {
        host == h
            || host
                .strip_suffix(h.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

fn origin_of(uri: &Uri) -> Option<String> {
    let scheme = uri.scheme_str()?;
    let authority = uri.authority()?;
    Some(format!("{scheme}://{authority}"))
}

/// Routes requests through the cache according to their [`RouteClass`].
pub struct CacheRouter<F> {
    fetcher: F,
    store: Mutex<CacheStore>,
    config: RouterConfig,
}

impl<F: Fetcher> CacheRouter<F> {
    pub fn new(fetcher: F, store: CacheStore, config: RouterConfig) -> Self {
        Self {
            fetcher,
            store: Mutex::new(store),
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    fn with_store<T>(&self, f: impl FnOnce(&CacheStore) -> Result<T>) -> Result<T> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }

    /// Pre-cache the app shell. All-or-nothing: if any asset fails to load,
    /// nothing is written.
    pub async fn install(&self) -> Result<usize> {
        let mut fetched = Vec::with_capacity(APP_SHELL.len());
        for path in APP_SHELL {
            let url = self.config.shell_url(path);
            let response = self
                .fetcher
                .fetch(&FetchRequest::get(url.clone()))
                .await
                .with_context(|| format!("Failed to pre-cache {url}"))?;
            if !response.is_success() {
                bail!("Failed to pre-cache {url}: status {}", response.status);
            }
            fetched.push((url, response));
        }

        let cache_name = &self.config.cache_name;
        self.with_store(|store| {
            for (url, response) in &fetched {
                store.put(cache_name, url, response)?;
            }
            Ok(())
        })?;
        tracing::debug!(count = fetched.len(), cache = %cache_name, "app shell pre-cached");
        Ok(fetched.len())
    }

    /// Delete every cache namespace other than the current one. Returns the
    /// names removed.
    pub fn activate(&self) -> Result<Vec<String>> {
        let current = &self.config.cache_name;
        let removed = self.with_store(|store| {
            let mut removed = Vec::new();
            for name in store.cache_names()? {
                if &name != current && store.delete_cache(&name)? {
                    removed.push(name);
                }
            }
            Ok(removed)
        })?;
        if !removed.is_empty() {
            tracing::debug!(?removed, "retired old cache namespaces");
        }
        Ok(removed)
    }

    /// Serve `request` with the strategy its URL classifies into.
    pub async fn handle(&self, request: &FetchRequest) -> Result<RoutedResponse> {
        let class = self.config.classify(&request.url);
        tracing::debug!(url = %request.url, ?class, "routing request");

        let (response, source) = match class {
            RouteClass::LiveData => self.network_first(request, false).await?,
            RouteClass::ThirdPartyAsset => self.network_first(request, true).await?,
            RouteClass::AppShell => self.cache_first(request).await?,
            RouteClass::Passthrough => (
                self.fetcher.fetch(request).await?,
                ResponseSource::Network,
            ),
        };

        Ok(RoutedResponse {
            response,
            source,
            class,
        })
    }

    async fn network_first(
        &self,
        request: &FetchRequest,
        write_back: bool,
    ) -> Result<(CachedResponse, ResponseSource)> {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if write_back {
                    self.remember(request, &response);
                }
                Ok((response, ResponseSource::Network))
            }
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "network failed, trying cache");
                match self.cached(request)? {
                    Some(hit) => Ok((hit, ResponseSource::Cache)),
                    None => Err(err.context(format!(
                        "{} is unreachable and no cached copy exists",
                        request.url
                    ))),
                }
            }
        }
    }

    async fn cache_first(
        &self,
        request: &FetchRequest,
    ) -> Result<(CachedResponse, ResponseSource)> {
        if let Some(hit) = self.cached(request)? {
            return Ok((hit, ResponseSource::Cache));
        }
        let response = self.fetcher.fetch(request).await?;
        self.remember(request, &response);
        Ok((response, ResponseSource::Network))
    }

    fn cached(&self, request: &FetchRequest) -> Result<Option<CachedResponse>> {
        if !request.cacheable() {
            return Ok(None);
        }
        self.with_store(|store| store.lookup(&self.config.cache_name, &request.url))
    }

    /// Write a GET response back. Only 2xx responses are stored; an error
    /// status is served once and never cached. A failed write is logged and
    /// the response is still served.
    fn remember(&self, request: &FetchRequest, response: &CachedResponse) {
        if !request.cacheable() || !response.is_success() {
            return;
        }
        if let Err(e) =
            self.with_store(|store| store.put(&self.config.cache_name, &request.url, response))
        {
            tracing::warn!(url = %request.url, error = %e, "failed to write cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ORIGIN: &str = "https://brew.example.com";

    /// Serves canned responses; `offline` makes every fetch fail.
    #[derive(Default)]
    struct FakeFetcher {
        responses: HashMap<String, CachedResponse>,
        offline: bool,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn with(mut self, url: &str, status: u16, body: &str) -> Self {
            self.responses.insert(
                url.to_string(),
                CachedResponse {
                    status,
                    content_type: Some("text/plain".to_string()),
                    body: body.as_bytes().to_vec(),
                },
            );
            self
        }

        fn offline() -> Self {
            Self {
                offline: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for FakeFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline {
                bail!("network unreachable");
            }
            Ok(self
                .responses
                .get(&request.url)
                .cloned()
                .unwrap_or(CachedResponse {
                    status: 404,
                    content_type: None,
                    body: Vec::new(),
                }))
        }
    }

    fn router(fetcher: FakeFetcher) -> CacheRouter<FakeFetcher> {
        CacheRouter::new(
            fetcher,
            CacheStore::open_in_memory().unwrap(),
            RouterConfig::new(ORIGIN),
        )
    }

    fn seed(router: &CacheRouter<FakeFetcher>, cache: &str, url: &str, body: &str) {
        router
            .with_store(|s| {
                s.put(
                    cache,
                    url,
                    &CachedResponse {
                        status: 200,
                        content_type: None,
                        body: body.as_bytes().to_vec(),
                    },
                )
            })
            .unwrap();
    }

    fn stored(router: &CacheRouter<FakeFetcher>, url: &str) -> Option<CachedResponse> {
        router.with_store(|s| s.lookup(CACHE_NAME, url)).unwrap()
    }

    #[test]
    fn test_classify() {
        let config = RouterConfig::new(ORIGIN);
        assert_eq!(
            config.classify("https://docs.google.com/spreadsheets/d/e/x/pub?output=csv"),
            RouteClass::LiveData
        );
        assert_eq!(
            config.classify("https://script.google.com/macros/s/abc/exec"),
            RouteClass::LiveData
        );
        assert_eq!(
            config.classify("https://cdn.jsdelivr.net/npm/chart.js"),
            RouteClass::ThirdPartyAsset
        );
        assert_eq!(
            config.classify("https://cdnjs.cloudflare.com/ajax/libs/PapaParse/5.4.1/papaparse.min.js"),
            RouteClass::ThirdPartyAsset
        );
        assert_eq!(
            config.classify("https://brew.example.com/style.css"),
            RouteClass::AppShell
        );
        assert_eq!(
            config.classify("https://elsewhere.org/x"),
            RouteClass::Passthrough
        );
        assert_eq!(config.classify("not a url"), RouteClass::Passthrough);
    }

    #[test]
    fn test_classify_host_matching_is_exact_or_subdomain() {
        let config = RouterConfig::new(ORIGIN);
        assert_eq!(
            config.classify("https://docs.google.com.evil.test/x"),
            RouteClass::Passthrough
        );
        assert_eq!(
            config.classify("https://notdocs.google.com/x"),
            RouteClass::Passthrough
        );
        assert_eq!(
            config.classify("https://eu.docs.google.com/x"),
            RouteClass::LiveData
        );
    }

    #[test]
    fn test_classify_origin_includes_scheme_and_port() {
        let config = RouterConfig::new("http://127.0.0.1:8080/");
        assert_eq!(
            config.classify("http://127.0.0.1:8080/index.html"),
            RouteClass::AppShell
        );
        assert_eq!(
            config.classify("http://127.0.0.1:9090/index.html"),
            RouteClass::Passthrough
        );
        assert_eq!(
            config.classify("https://127.0.0.1:8080/index.html"),
            RouteClass::Passthrough
        );
    }

    #[test]
    fn test_without_shell_never_classifies_app_shell() {
        let config = RouterConfig::without_shell();
        assert_eq!(config.classify("https://brew.example.com/"), RouteClass::Passthrough);
        assert_eq!(
            config.classify("https://docs.google.com/sheet.csv"),
            RouteClass::LiveData
        );
    }

    #[tokio::test]
    async fn test_live_data_offline_without_cache_fails() {
        let r = router(FakeFetcher::offline());
        let result = r
            .handle(&FetchRequest::get("https://script.google.com/macros/s/abc/exec"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_live_data_is_never_written_back() {
        let url = "https://docs.google.com/sheet.csv";
        let r = router(FakeFetcher::default().with(url, 200, "id,name\n"));
        let routed = r.handle(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(routed.source, ResponseSource::Network);
        assert_eq!(routed.class, RouteClass::LiveData);
        assert!(stored(&r, url).is_none());
    }

    #[tokio::test]
    async fn test_live_data_falls_back_to_existing_cache() {
        let url = "https://docs.google.com/sheet.csv";
        let r = router(FakeFetcher::offline());
        seed(&r, CACHE_NAME, url, "stale");
        let routed = r.handle(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(routed.source, ResponseSource::Cache);
        assert_eq!(routed.response.body, b"stale");
    }

    #[tokio::test]
    async fn test_live_data_error_status_passes_through() {
        let url = "https://docs.google.com/sheet.csv";
        let r = router(FakeFetcher::default().with(url, 500, "oops"));
        seed(&r, CACHE_NAME, url, "stale");
        let routed = r.handle(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(routed.response.status, 500);
        assert_eq!(routed.source, ResponseSource::Network);
    }

    #[tokio::test]
    async fn test_post_never_served_from_cache() {
        let url = "https://script.google.com/macros/s/abc/exec";
        let r = router(FakeFetcher::offline());
        seed(&r, CACHE_NAME, url, "cached");
        let request = FetchRequest::post(url, "text/plain", "{}");
        assert!(r.handle(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_asset_network_first_with_write_back() {
        let url = "https://cdn.jsdelivr.net/npm/chart.js";
        let r = router(FakeFetcher::default().with(url, 200, "chart v2"));
        seed(&r, CACHE_NAME, url, "chart v1");

        let routed = r.handle(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(routed.source, ResponseSource::Network);
        assert_eq!(routed.response.body, b"chart v2");
        assert_eq!(stored(&r, url).unwrap().body, b"chart v2");
    }

    #[tokio::test]
    async fn test_asset_offline_serves_cache() {
        let url = "https://cdn.jsdelivr.net/npm/chart.js";
        let r = router(FakeFetcher::offline());
        seed(&r, CACHE_NAME, url, "chart v1");
        let routed = r.handle(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(routed.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_asset_error_status_not_cached() {
        let url = "https://cdn.jsdelivr.net/npm/missing.js";
        let r = router(FakeFetcher::default());
        let routed = r.handle(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(routed.response.status, 404);
        assert!(stored(&r, url).is_none());
    }

    #[tokio::test]
    async fn test_app_shell_second_request_skips_network() {
        let url = "https://brew.example.com/style.css";
        let r = router(FakeFetcher::default().with(url, 200, "css"));

        let first = r.handle(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(r.fetcher.calls(), 1);

        let second = r.handle(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.response.body, b"css");
        assert_eq!(r.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_passthrough_never_touches_cache() {
        let url = "https://elsewhere.org/data.json";
        let r = router(FakeFetcher::default().with(url, 200, "{}"));
        r.handle(&FetchRequest::get(url)).await.unwrap();
        r.handle(&FetchRequest::get(url)).await.unwrap();
        assert_eq!(r.fetcher.calls(), 2);
        assert!(stored(&r, url).is_none());
    }

    #[tokio::test]
    async fn test_install_precaches_app_shell() {
        let mut fetcher = FakeFetcher::default();
        for path in APP_SHELL {
            fetcher = fetcher.with(&format!("{ORIGIN}{path}"), 200, path);
        }
        let r = router(fetcher);
        assert_eq!(r.install().await.unwrap(), APP_SHELL.len());
        assert!(stored(&r, "https://brew.example.com/index.html").is_some());
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let r = router(FakeFetcher::default().with(&format!("{ORIGIN}/"), 200, "index"));
        assert!(r.install().await.is_err());
        assert!(stored(&r, "https://brew.example.com/").is_none());
    }

    #[test]
    fn test_activate_removes_old_namespaces() {
        let r = router(FakeFetcher::default());
        seed(&r, "brew-tracker-v0", "https://brew.example.com/", "old");
        seed(&r, CACHE_NAME, "https://brew.example.com/", "new");

        let removed = r.activate().unwrap();
        assert_eq!(removed, vec!["brew-tracker-v0".to_string()]);
        let names = r.with_store(CacheStore::cache_names).unwrap();
        assert_eq!(names, vec![CACHE_NAME.to_string()]);
    }
}
