use axum::{
    Router,
    http::{HeaderName, Method, header},
};
use domain::STATUS_HEADER;
use download_service::DownloadState;
use locator_service::{DEFAULT_RESOLVER_BASE, MediaLocator, ResolverEndpoints};
use relay_service::StreamRelay;
use search_service::{SearchResolver, YouTubeSearchProvider};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;

pub use config::ServerConfig;

/// Where the gateway's collaborators live
#[derive(Debug, Clone)]
pub struct Upstreams {
    pub search_base: String,
    pub resolver_base: String,
}

impl Default for Upstreams {
    fn default() -> Self {
        Self {
            search_base: search_service::DEFAULT_BASE_URL.to_string(),
            resolver_base: DEFAULT_RESOLVER_BASE.to_string(),
        }
    }
}

/// Assemble the search and download routers behind CORS and request tracing.
pub fn build_app(config: &ServerConfig, upstreams: &Upstreams) -> anyhow::Result<Router> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.upstream_timeout)
        .build()?;

    let provider = YouTubeSearchProvider::with_base_url(client.clone(), &upstreams.search_base)?;
    let resolver = SearchResolver::new(Arc::new(provider), config.upstream_timeout);

    let locator = MediaLocator::new(
        client.clone(),
        ResolverEndpoints::from_base(&upstreams.resolver_base)?,
        config.upstream_timeout,
    );
    let relay = StreamRelay::new(client, config.upstream_timeout, config.stream_idle_timeout);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_DISPOSITION,
            header::CONTENT_LENGTH,
            HeaderName::from_static(STATUS_HEADER),
        ]);

    Ok(Router::new()
        .merge(search_service::create_router(Arc::new(resolver)))
        .merge(download_service::create_router(DownloadState::new(locator, relay)))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}
