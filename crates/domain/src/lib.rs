use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod error;

pub use error::{ErrorBody, ProxyError, bounded};

/// Fallback file stem used when a title sanitizes down to nothing
pub const DEFAULT_FILE_STEM: &str = "download";

/// Response header telling clients whether a download succeeded
pub const STATUS_HEADER: &str = "x-download-status";
pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

/// Represents the best-match video returned by a search
///
/// Serialized with the short field names the HTTP surface exposes:
/// `{title, thumbnail, duration, channel, views, url}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub title: String,
    #[serde(rename = "thumbnail")]
    pub thumbnail_url: String,
    #[serde(rename = "duration")]
    pub duration_label: String,
    #[serde(rename = "channel")]
    pub channel_name: String,
    #[serde(rename = "views")]
    pub view_count_label: String,
    #[serde(rename = "url")]
    pub canonical_url: String,
}

/// Which track of a video is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "mp4",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio/mpeg",
            MediaKind::Video => "video/mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(ProxyError::InvalidInput(format!(
                "type must be 'audio' or 'video', got '{other}'"
            ))),
        }
    }
}

/// A validated request to download one track of a video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub canonical_url: String,
    pub kind: MediaKind,
}

impl DownloadRequest {
    /// Build a request from raw query parameters.
    /// Missing or blank values are a caller error, never an upstream one.
    pub fn from_params(url: Option<&str>, kind: Option<&str>) -> Result<Self, ProxyError> {
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        let kind = kind.map(str::trim).filter(|k| !k.is_empty());

        match (url, kind) {
            (Some(url), Some(kind)) => Ok(Self {
                canonical_url: url.to_string(),
                kind: kind.parse()?,
            }),
            (None, _) => Err(ProxyError::InvalidInput("url is required".to_string())),
            (_, None) => Err(ProxyError::InvalidInput("type is required".to_string())),
        }
    }
}

/// A direct, time-limited media location produced for one download request
///
/// Never cached: the upstream URL may expire between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub direct_url: String,
    pub suggested_title: String,
    pub kind: MediaKind,
}

impl ResolvedMedia {
    pub fn file_extension(&self) -> &'static str {
        self.kind.file_extension()
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }

    /// Sanitized title plus the extension implied by the kind
    pub fn file_name(&self) -> String {
        format!(
            "{}.{}",
            sanitize_title(&self.suggested_title),
            self.file_extension()
        )
    }

    /// Value for the `Content-Disposition` response header
    ///
    /// Always plain ASCII; non-ASCII names get an RFC 5987 `filename*`
    /// parameter next to an underscore-substituted fallback.
    pub fn content_disposition(&self) -> String {
        let name = self.file_name();
        if name.is_ascii() {
            return format!("attachment; filename=\"{name}\"");
        }
        let fallback: String = name
            .chars()
            .map(|c| if c.is_ascii() { c } else { '_' })
            .collect();
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(&name)
        )
    }
}

/// Strip every character outside letters, digits, `_` and whitespace.
///
/// The result is safe to embed in a quoted `Content-Disposition` filename.
/// Control characters count as unsafe even when they are whitespace.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || (c.is_whitespace() && !c.is_control()))
        .collect();

    if cleaned.trim().is_empty() {
        DEFAULT_FILE_STEM.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_punctuation_and_slashes() {
        assert_eq!(
            sanitize_title("Official Video! #1/2023"),
            "Official Video 12023"
        );
    }

    #[test]
    fn sanitize_keeps_unicode_letters() {
        assert_eq!(sanitize_title("Café – Ñandú"), "Café  Ñandú");
    }

    #[test]
    fn sanitize_falls_back_when_nothing_survives() {
        assert_eq!(sanitize_title("!!!"), DEFAULT_FILE_STEM);
        assert_eq!(sanitize_title(""), DEFAULT_FILE_STEM);
    }

    #[test]
    fn sanitize_drops_quotes_and_newlines() {
        assert_eq!(sanitize_title("a\"b\r\nc"), "abc");
    }

    #[test]
    fn resolved_media_derives_headers_from_kind() {
        let media = ResolvedMedia {
            direct_url: "https://cdn.example/file".to_string(),
            suggested_title: "Official Video! #1/2023".to_string(),
            kind: MediaKind::Video,
        };
        assert_eq!(media.mime_type(), "video/mp4");
        assert_eq!(
            media.content_disposition(),
            "attachment; filename=\"Official Video 12023.mp4\""
        );

        let audio = ResolvedMedia {
            kind: MediaKind::Audio,
            ..media
        };
        assert_eq!(audio.file_name(), "Official Video 12023.mp3");
        assert_eq!(audio.mime_type(), "audio/mpeg");
    }

    #[test]
    fn non_ascii_titles_get_extended_filename() {
        let media = ResolvedMedia {
            direct_url: "https://cdn.example/file".to_string(),
            suggested_title: "Café".to_string(),
            kind: MediaKind::Audio,
        };
        assert_eq!(
            media.content_disposition(),
            "attachment; filename=\"Caf_.mp3\"; filename*=UTF-8''Caf%C3%A9.mp3"
        );
        assert!(media.content_disposition().is_ascii());
    }

    #[test]
    fn download_request_requires_both_params() {
        let err = DownloadRequest::from_params(None, Some("audio")).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidInput(_)));

        let err = DownloadRequest::from_params(Some("https://youtu.be/x"), Some("  ")).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidInput(_)));

        let err = DownloadRequest::from_params(Some("https://youtu.be/x"), Some("flac")).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidInput(_)));

        let ok = DownloadRequest::from_params(Some("https://youtu.be/x"), Some("video")).unwrap();
        assert_eq!(ok.kind, MediaKind::Video);
        assert_eq!(ok.canonical_url, "https://youtu.be/x");
    }

    #[test]
    fn video_record_uses_wire_field_names() {
        let record = VideoRecord {
            title: "t".to_string(),
            thumbnail_url: "https://i.ytimg.com/t.jpg".to_string(),
            duration_label: "3:42".to_string(),
            channel_name: "c".to_string(),
            view_count_label: "1.2M views".to_string(),
            canonical_url: "https://www.youtube.com/watch?v=abc".to_string(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["thumbnail"], "https://i.ytimg.com/t.jpg");
        assert_eq!(value["duration"], "3:42");
        assert_eq!(value["channel"], "c");
        assert_eq!(value["views"], "1.2M views");
        assert_eq!(value["url"], "https://www.youtube.com/watch?v=abc");
    }
}
