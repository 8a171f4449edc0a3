use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use domain::{ErrorBody, ProxyError, VideoRecord, bounded};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

mod provider;

pub use provider::{DEFAULT_BASE_URL, YouTubeSearchProvider, parse_results_page};

/// One entry of the provider's ordered match list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMatch {
    pub title: String,
    pub thumbnail_url: String,
    pub duration_label: String,
    pub author_name: String,
    pub view_label: String,
    pub canonical_url: String,
    /// Live streams have no fixed duration and cannot be resolved to a file
    pub is_live: bool,
}

/// External search collaborator
/// Implementations must only return items of the "video" category, best match first.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ProviderMatch>, ProxyError>;
}

/// Resolves a free-text query to the provider's single top-ranked video
pub struct SearchResolver {
    provider: Arc<dyn SearchProvider>,
    timeout: Duration,
}

impl SearchResolver {
    pub fn new(provider: Arc<dyn SearchProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn search(&self, query: &str) -> Result<VideoRecord, ProxyError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ProxyError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }

        let matches = bounded(self.timeout, self.provider.search(query, 1)).await?;
        let top = matches.into_iter().next().ok_or(ProxyError::NoResults)?;
        tracing::debug!(query, url = %top.canonical_url, "search matched");
        normalize(top)
    }
}

fn normalize(top: ProviderMatch) -> Result<VideoRecord, ProxyError> {
    if top.is_live {
        return Err(ProxyError::NotDownloadable(format!(
            "'{}' is a live stream",
            top.title
        )));
    }
    if top.canonical_url.is_empty() {
        return Err(ProxyError::UpstreamMalformed(
            "search match has no canonical url".to_string(),
        ));
    }

    Ok(VideoRecord {
        title: top.title,
        thumbnail_url: top.thumbnail_url,
        duration_label: top.duration_label,
        channel_name: top.author_name,
        view_count_label: top.view_label,
        canonical_url: top.canonical_url,
    })
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
}

/// Search failure rendered as `{error, details}`
struct SearchError(ProxyError);

impl SearchError {
    fn label(&self) -> &'static str {
        match self.0 {
            ProxyError::InvalidInput(_) => "Please provide a search query",
            ProxyError::NoResults => "No results found",
            ProxyError::NotDownloadable(_) => "Result is not downloadable",
            _ => "Search failed",
        }
    }
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = match self.0 {
            ProxyError::InvalidInput(_) | ProxyError::NoResults => None,
            ref other => other.details(),
        };
        (status, Json(ErrorBody::new(self.label(), details))).into_response()
    }
}

/// Handler for searching the best-match video
async fn search(
    State(resolver): State<Arc<SearchResolver>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = params.q.unwrap_or_default();
    match resolver.search(&query).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => {
            if err.status_code() >= 500 {
                tracing::error!(query = %query, error = %err, "search failed");
            } else {
                tracing::info!(query = %query, error = %err, "search rejected");
            }
            SearchError(err).into_response()
        }
    }
}

/// Create the router for the search API
pub fn create_router(resolver: Arc<SearchResolver>) -> Router {
    Router::new()
        .route("/api/search", get(search))
        .with_state(resolver)
}
