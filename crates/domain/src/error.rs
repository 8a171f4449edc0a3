use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Failure taxonomy shared by every stage of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    /// The caller has to fix the request
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Valid request, empty result set
    #[error("no results found")]
    NoResults,

    /// The provider's top match cannot be downloaded (live streams)
    #[error("result is not downloadable: {0}")]
    NotDownloadable(String),

    /// Transport-level failure reaching a collaborator
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    /// A collaborator did not answer within the configured bound
    #[error("upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    /// A collaborator answered but the envelope violates its contract
    #[error("malformed upstream response: {0}")]
    UpstreamMalformed(String),

    /// The media host answered with an error payload instead of media
    #[error("upstream returned an error: {0}")]
    UpstreamError(String),

    /// The client went away mid-stream
    #[error("client disconnected")]
    SinkClosed,
}

impl ProxyError {
    /// HTTP status used at the gateway boundary
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::InvalidInput(_) => 400,
            ProxyError::NoResults => 404,
            ProxyError::NotDownloadable(_) => 422,
            ProxyError::UpstreamFailure(_)
            | ProxyError::UpstreamTimeout(_)
            | ProxyError::UpstreamMalformed(_)
            | ProxyError::UpstreamError(_)
            | ProxyError::SinkClosed => 500,
        }
    }

    /// Only transport-level failures are worth retrying by a caller
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProxyError::UpstreamFailure(_) | ProxyError::UpstreamTimeout(_)
        )
    }

    /// Diagnostic message carried into the `details` field of an error body
    pub fn details(&self) -> Option<String> {
        match self {
            ProxyError::NoResults | ProxyError::SinkClosed => None,
            ProxyError::UpstreamFailure(msg)
            | ProxyError::UpstreamMalformed(msg)
            | ProxyError::UpstreamError(msg)
            | ProxyError::InvalidInput(msg)
            | ProxyError::NotDownloadable(msg) => Some(msg.clone()),
            ProxyError::UpstreamTimeout(_) => Some(self.to_string()),
        }
    }
}

/// JSON body of every failed API response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            error: error.into(),
            details,
        }
    }

    /// The most specific message available
    pub fn message(&self) -> &str {
        self.details.as_deref().unwrap_or(&self.error)
    }
}

/// Run a collaborator call with an upper bound on its duration.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, ProxyError>
where
    F: Future<Output = Result<T, ProxyError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ProxyError::UpstreamTimeout(limit))?
}
