use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, Request, State},
    http::{HeaderValue, Method, StatusCode, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};

use brewlog_core::router::{CacheRouter, FetchRequest, Fetcher, ResponseSource, RoutedResponse};

type SharedRouter<F> = Arc<CacheRouter<F>>;

#[derive(Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

enum ApiError {
    BadRequest(String),
    MethodNotAllowed,
    Upstream(anyhow::Error),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "Only GET requests are routed".to_string(),
            ),
            Self::Upstream(err) => {
                tracing::warn!(error = %format!("{err:#}"), "upstream request failed");
                (StatusCode::BAD_GATEWAY, format!("{err:#}"))
            }
            Self::Internal(err) => {
                eprintln!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    response
}

// --- Handlers ---

async fn proxy<F>(
    State(router): State<SharedRouter<F>>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response, ApiError>
where
    F: Fetcher + Send + Sync + 'static,
{
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing 'url' query parameter".to_string()))?;

    let absolute = url
        .parse::<Uri>()
        .is_ok_and(|u| matches!(u.scheme_str(), Some("http" | "https")) && u.host().is_some());
    if !absolute {
        return Err(ApiError::BadRequest(format!(
            "Invalid url '{url}'. Use an absolute http(s) URL"
        )));
    }

    route(&router, FetchRequest::get(url)).await
}

async fn app_shell<F>(
    State(router): State<SharedRouter<F>>,
    method: Method,
    uri: Uri,
) -> Result<Response, ApiError>
where
    F: Fetcher + Send + Sync + 'static,
{
    if method != Method::GET {
        return Err(ApiError::MethodNotAllowed);
    }
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = router.config().shell_url(path);
    route(&router, FetchRequest::get(url)).await
}

async fn route<F>(router: &CacheRouter<F>, request: FetchRequest) -> Result<Response, ApiError>
where
    F: Fetcher + Send + Sync + 'static,
{
    let routed = router.handle(&request).await.map_err(ApiError::Upstream)?;
    into_http_response(routed)
}

fn into_http_response(routed: RoutedResponse) -> Result<Response, ApiError> {
    let status = StatusCode::from_u16(routed.response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let cache_header = match routed.source {
        ResponseSource::Cache => "hit",
        ResponseSource::Network => "miss",
    };

    let mut builder = Response::builder()
        .status(status)
        .header("x-cache", cache_header);
    if let Some(content_type) = routed
        .response
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }

    builder
        .body(Body::from(routed.response.body))
        .map_err(|e| ApiError::Internal(e.into()))
}

// --- Router ---

fn build_router<F>(router: SharedRouter<F>) -> Router
where
    F: Fetcher + Send + Sync + 'static,
{
    Router::new()
        .route("/proxy", get(proxy::<F>))
        .fallback(app_shell::<F>)
        .layer(middleware::from_fn(security_headers))
        .with_state(router)
}

// --- Server startup ---

pub async fn start_server<F>(router: CacheRouter<F>, port: u16, bind: &str) -> anyhow::Result<()>
where
    F: Fetcher + Send + Sync + 'static,
{
    match router.install().await {
        Ok(count) => eprintln!("Cached {count} app shell files"),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "app shell pre-cache failed");
            eprintln!("Warning: could not pre-cache the app shell: {e:#}");
        }
    }
    let removed = router.activate()?;
    if !removed.is_empty() {
        eprintln!("Removed old caches: {}", removed.join(", "));
    }

    let origin = router.config().origin.clone();
    let app = build_router(Arc::new(router));

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    eprintln!("Listening on http://{bind}:{port} (app shell: {origin})");
    axum::serve(listener, app).await?;

    Ok(())
}
