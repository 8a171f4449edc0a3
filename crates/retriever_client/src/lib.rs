use domain::{DEFAULT_FILE_STEM, ErrorBody, MediaKind, STATUS_ERROR, STATUS_HEADER, STATUS_OK, VideoRecord};
use reqwest::{Response, StatusCode, header};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub mod cli;
mod indicator;

pub use indicator::{Indicator, Loading, Silent, StderrIndicator};

pub const DEFAULT_SERVER: &str = "http://localhost:3000";

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("no video selected, run a search first")]
    NoCurrentVideo,

    #[error("{message}")]
    Server {
        message: String,
        details: Option<String>,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not write file: {0}")]
    Io(#[from] io::Error),

    #[error("invalid server address: {0}")]
    BadUrl(#[from] url::ParseError),
}

impl RetrieverError {
    fn from_body(status: StatusCode, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(body) => RetrieverError::Server {
                message: body.error,
                details: body.details,
            },
            Err(_) => RetrieverError::Server {
                message: format!("server answered {status}"),
                details: None,
            },
        }
    }
}

/// A file written by [`Retriever::download`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Client for the search-and-download proxy
///
/// Remembers the last search result so that a follow-up download can be
/// started without repeating the query.
pub struct Retriever {
    client: reqwest::Client,
    server: Url,
    current: Option<VideoRecord>,
    indicator: Box<dyn Indicator>,
}

impl Retriever {
    /// `server` may carry a path prefix; API routes are resolved below it.
    pub fn new(server: &str) -> Result<Self, RetrieverError> {
        let mut server = Url::parse(server)?;
        if !server.path().ends_with('/') {
            let path = format!("{}/", server.path());
            server.set_path(&path);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            server,
            current: None,
            indicator: Box::new(Silent),
        })
    }

    pub fn with_indicator(mut self, indicator: impl Indicator + 'static) -> Self {
        self.indicator = Box::new(indicator);
        self
    }

    /// The record remembered from the last successful search
    pub fn current(&self) -> Option<&VideoRecord> {
        self.current.as_ref()
    }

    /// Search for the best match and remember it.
    ///
    /// A blank query never reaches the server. A failed search keeps the
    /// previously remembered record.
    pub async fn search(&mut self, query: &str) -> Result<&VideoRecord, RetrieverError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrieverError::InvalidInput(
                "Please provide a search query!".to_string(),
            ));
        }

        let mut url = self.server.join("api/search")?;
        url.query_pairs_mut().append_pair("q", query);

        let _loading = Loading::start(self.indicator.as_ref(), "Searching");
        tracing::debug!(%url, "searching");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(RetrieverError::from_body(status, &body));
        }

        let record: VideoRecord = serde_json::from_slice(&body).map_err(|e| RetrieverError::Server {
            message: "unexpected search response".to_string(),
            details: Some(e.to_string()),
        })?;
        Ok(self.current.insert(record))
    }

    /// Download one track of the remembered video into `dir`
    pub async fn download(&self, kind: MediaKind, dir: &Path) -> Result<SavedFile, RetrieverError> {
        let record = self.current.as_ref().ok_or(RetrieverError::NoCurrentVideo)?;
        self.download_url(&record.canonical_url, kind, dir).await
    }

    /// Download one track of any video page URL into `dir`.
    ///
    /// Bytes go to a temporary file next to the destination which is only
    /// persisted once the whole body has arrived. An existing file with the
    /// same name is never replaced.
    pub async fn download_url(
        &self,
        video_url: &str,
        kind: MediaKind,
        dir: &Path,
    ) -> Result<SavedFile, RetrieverError> {
        let video_url = video_url.trim();
        if video_url.is_empty() {
            return Err(RetrieverError::InvalidInput("a video URL is required".to_string()));
        }

        let mut url = self.server.join("api/download")?;
        url.query_pairs_mut()
            .append_pair("url", video_url)
            .append_pair("type", kind.as_str());

        let _loading = Loading::start(self.indicator.as_ref(), "Downloading");
        tracing::debug!(%url, "downloading");
        let mut response = self.client.get(url).send().await?;
        let status = response.status();

        let first = match status_marker(&response) {
            Some(STATUS_ERROR) => return Err(error_from(response).await),
            Some(_) => response.chunk().await?,
            None if !status.is_success() => return Err(error_from(response).await),
            None => {
                // Servers without the status header are told apart by the
                // payload: media never starts with a JSON object.
                let first = response.chunk().await?;
                if first.as_deref().and_then(first_significant_byte) == Some(b'{') {
                    let mut body = first.map(|b| b.to_vec()).unwrap_or_default();
                    while let Some(chunk) = response.chunk().await? {
                        body.extend_from_slice(&chunk);
                    }
                    return Err(RetrieverError::from_body(status, &body));
                }
                first
            }
        };

        let name = file_name_from(&response, kind);
        let mut partial = tempfile::Builder::new()
            .prefix(".tubegrab-")
            .suffix(".part")
            .tempfile_in(dir)?;

        let mut bytes = 0u64;
        let mut next = first;
        while let Some(chunk) = next {
            partial.write_all(&chunk)?;
            bytes += chunk.len() as u64;
            next = response.chunk().await?;
        }
        partial.flush()?;

        let path = dir.join(name);
        partial.persist_noclobber(&path).map_err(|e| e.error)?;
        tracing::info!(path = %path.display(), bytes, "download saved");
        Ok(SavedFile { path, bytes })
    }
}

fn status_marker(response: &Response) -> Option<&'static str> {
    let value = response.headers().get(STATUS_HEADER)?.to_str().ok()?;
    match value.trim() {
        v if v.eq_ignore_ascii_case(STATUS_OK) => Some(STATUS_OK),
        v if v.eq_ignore_ascii_case(STATUS_ERROR) => Some(STATUS_ERROR),
        _ => None,
    }
}

async fn error_from(response: Response) -> RetrieverError {
    let status = response.status();
    match response.bytes().await {
        Ok(body) => RetrieverError::from_body(status, &body),
        Err(e) => RetrieverError::Transport(e),
    }
}

fn first_significant_byte(chunk: &[u8]) -> Option<u8> {
    chunk.iter().copied().find(|b| !b.is_ascii_whitespace())
}

fn file_name_from(response: &Response, kind: MediaKind) -> String {
    response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_disposition)
        .unwrap_or_else(|| format!("{DEFAULT_FILE_STEM}.{}", kind.file_extension()))
}

/// Extract a safe file name from a `Content-Disposition` value.
///
/// `filename*` wins over `filename`. Directory components are dropped.
pub fn parse_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let raw = raw.trim();
                let encoded = raw
                    .split_once("''")
                    .map_or(raw, |(_, rest)| rest);
                extended = urlencoding::decode(encoded).ok().map(|name| name.into_owned());
            }
            "filename" => plain = Some(raw.trim().trim_matches('"').to_string()),
            _ => {}
        }
    }

    let name = extended.or(plain)?;
    let name = Path::new(&name).file_name()?.to_str()?.to_string();
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_filename_is_unquoted() {
        assert_eq!(
            parse_disposition("attachment; filename=\"Official Video 12023.mp4\"").as_deref(),
            Some("Official Video 12023.mp4")
        );
    }

    #[test]
    fn extended_filename_wins() {
        assert_eq!(
            parse_disposition("attachment; filename=\"Caf_.mp3\"; filename*=UTF-8''Caf%C3%A9.mp3")
                .as_deref(),
            Some("Café.mp3")
        );
    }

    #[test]
    fn directory_parts_are_dropped() {
        assert_eq!(
            parse_disposition("attachment; filename=\"../../etc/passwd\"").as_deref(),
            Some("passwd")
        );
        assert_eq!(parse_disposition("attachment"), None);
        assert_eq!(parse_disposition("attachment; filename=\"..\""), None);
    }

    #[test]
    fn undecodable_extended_name_falls_back_to_plain_name() {
        assert_eq!(
            parse_disposition("attachment; filename=\"a.mp3\"; filename*=UTF-8''%FF%FE.mp3").as_deref(),
            Some("a.mp3")
        );
    }

    #[tokio::test]
    async fn blank_query_is_rejected_locally() {
        // Port 9 is never contacted for a blank query.
        let mut retriever = Retriever::new("http://127.0.0.1:9").unwrap();
        let err = retriever.search("   ").await.unwrap_err();
        assert_eq!(err.to_string(), "Please provide a search query!");
        assert!(retriever.current().is_none());
    }

    #[tokio::test]
    async fn download_needs_a_search_first() {
        let retriever = Retriever::new("http://127.0.0.1:9").unwrap();
        let err = retriever
            .download(MediaKind::Audio, Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrieverError::NoCurrentVideo));
    }
}
