use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use domain::{DownloadRequest, ErrorBody, ProxyError, STATUS_ERROR, STATUS_HEADER, STATUS_OK};
use locator_service::MediaLocator;
use relay_service::{ChannelSink, SINK_CAPACITY, StreamRelay};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared handles for the download route
#[derive(Clone)]
pub struct DownloadState {
    pub locator: Arc<MediaLocator>,
    pub relay: Arc<StreamRelay>,
}

impl DownloadState {
    pub fn new(locator: MediaLocator, relay: StreamRelay) -> Self {
        Self {
            locator: Arc::new(locator),
            relay: Arc::new(relay),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl DownloadParams {
    fn is_incomplete(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        blank(&self.url) || blank(&self.kind)
    }
}

/// Download failure rendered as `{error, details}` plus the status header
struct DownloadError {
    label: &'static str,
    err: ProxyError,
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody::new(self.label, self.err.details());
        (status, [(STATUS_HEADER, STATUS_ERROR)], Json(body)).into_response()
    }
}

/// Handler for streaming one track of a video as an attachment
async fn download(
    State(state): State<DownloadState>,
    Query(params): Query<DownloadParams>,
) -> Response {
    let request = match DownloadRequest::from_params(params.url.as_deref(), params.kind.as_deref())
    {
        Ok(request) => request,
        Err(err) => {
            let label = if params.is_incomplete() {
                "Missing parameters"
            } else {
                "Invalid parameters"
            };
            tracing::info!(url = ?params.url, kind = ?params.kind, error = %err, "download rejected");
            return DownloadError { label, err }.into_response();
        }
    };

    match start_transfer(&state, request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(url = ?params.url, kind = ?params.kind, error = %err, "download failed");
            DownloadError {
                label: "Download failed",
                err,
            }
            .into_response()
        }
    }
}

/// Resolve and classify, then hand the byte pump to a background task.
///
/// Every failure up to classification is returned as an error so that no
/// media bytes precede a JSON error body.
async fn start_transfer(state: &DownloadState, request: DownloadRequest) -> Result<Response, ProxyError> {
    let media = state
        .locator
        .locate(&request.canonical_url, request.kind)
        .await?;
    let stream = state.relay.open(&media).await?;
    let media_headers = stream.headers().clone();
    let disposition = HeaderValue::from_str(&media_headers.content_disposition)
        .map_err(|e| ProxyError::UpstreamMalformed(format!("unusable file name: {e}")))?;

    let cancel = CancellationToken::new();
    let (mut sink, body) = ChannelSink::channel(SINK_CAPACITY, cancel.clone());
    let relay = state.relay.clone();
    let canonical_url = request.canonical_url;
    let kind = request.kind;

    tokio::spawn(async move {
        match relay.forward(stream, &mut sink, &cancel).await {
            Ok(bytes) => tracing::info!(%canonical_url, %kind, bytes, "download relayed"),
            Err(ProxyError::SinkClosed) => {
                tracing::info!(%canonical_url, %kind, "client disconnected, upstream read cancelled")
            }
            Err(err) => {
                tracing::warn!(%canonical_url, %kind, error = %err, "download aborted mid-stream");
                sink.abort(&err).await;
            }
        }
    });

    let mut response = Body::from_stream(body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(media_headers.content_type),
    );
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    if let Some(len) = media_headers.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    headers.insert(STATUS_HEADER, HeaderValue::from_static(STATUS_OK));

    Ok(response)
}

/// Create the router for the download API
pub fn create_router(state: DownloadState) -> Router {
    Router::new()
        .route("/api/download", get(download))
        .with_state(state)
}
