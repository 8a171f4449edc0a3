use domain::{DEFAULT_FILE_STEM, MediaKind, ProxyError, ResolvedMedia, bounded};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_RESOLVER_BASE: &str = "https://apis.davidcyriltech.my.id/download/";

/// The two kind-specific conversion endpoints of the resolver service
#[derive(Debug, Clone)]
pub struct ResolverEndpoints {
    pub audio: Url,
    pub video: Url,
}

impl ResolverEndpoints {
    /// Derive `<base>/ytmp3` and `<base>/ytmp4`.
    pub fn from_base(base: &str) -> Result<Self, ProxyError> {
        let mut base = Url::parse(base)
            .map_err(|e| ProxyError::InvalidInput(format!("bad resolver base url: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let join = |segment: &str| {
            base.join(segment)
                .map_err(|e| ProxyError::InvalidInput(format!("bad resolver base url: {e}")))
        };
        Ok(Self {
            audio: join("ytmp3")?,
            video: join("ytmp4")?,
        })
    }

    pub fn for_kind(&self, kind: MediaKind) -> &Url {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }
}

/// Response envelope of the resolver service
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    result: Option<EnvelopeResult>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeResult {
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Resolves a canonical video URL to a direct, time-limited media URL
pub struct MediaLocator {
    client: reqwest::Client,
    endpoints: ResolverEndpoints,
    timeout: Duration,
}

impl MediaLocator {
    pub fn new(client: reqwest::Client, endpoints: ResolverEndpoints, timeout: Duration) -> Self {
        Self {
            client,
            endpoints,
            timeout,
        }
    }

    pub async fn locate(
        &self,
        canonical_url: &str,
        kind: MediaKind,
    ) -> Result<ResolvedMedia, ProxyError> {
        let canonical_url = canonical_url.trim();
        if canonical_url.is_empty() {
            return Err(ProxyError::InvalidInput("url is required".to_string()));
        }

        let endpoint = self.endpoints.for_kind(kind).clone();
        tracing::debug!(%endpoint, canonical_url, %kind, "resolving media");

        let body = bounded(self.timeout, self.fetch_envelope(endpoint, canonical_url)).await?;
        let media = parse_envelope(&body, kind)?;
        tracing::info!(canonical_url, %kind, title = %media.suggested_title, "media resolved");
        Ok(media)
    }

    async fn fetch_envelope(&self, endpoint: Url, canonical_url: &str) -> Result<Vec<u8>, ProxyError> {
        let response = self
            .client
            .get(endpoint)
            .query(&[("url", canonical_url)])
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamFailure(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProxyError::UpstreamFailure(format!(
                "resolver returned HTTP {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::UpstreamFailure(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Validate a resolver envelope and turn it into a [`ResolvedMedia`].
pub fn parse_envelope(body: &[u8], kind: MediaKind) -> Result<ResolvedMedia, ProxyError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| ProxyError::UpstreamMalformed(format!("resolver envelope: {e}")))?;

    if envelope.success != Some(true) {
        let reason = envelope
            .message
            .or(envelope.error)
            .map(|m| format!(": {m}"))
            .unwrap_or_default();
        return Err(ProxyError::UpstreamMalformed(format!(
            "resolver reported success=false{reason}"
        )));
    }

    let result = envelope.result.ok_or_else(|| {
        ProxyError::UpstreamMalformed("resolver envelope has no result".to_string())
    })?;

    let direct_url = result
        .download_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            ProxyError::UpstreamMalformed("resolver result has no download_url".to_string())
        })?;

    match Url::parse(&direct_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            return Err(ProxyError::UpstreamMalformed(format!(
                "resolver download_url is not an absolute http url: {direct_url}"
            )));
        }
    }

    let suggested_title = result
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILE_STEM.to_string());

    Ok(ResolvedMedia {
        direct_url,
        suggested_title,
        kind,
    })
}
