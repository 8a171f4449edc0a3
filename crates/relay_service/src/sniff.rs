use serde_json::Value;

/// Longest raw-text error message carried forward
const MAX_RAW_MESSAGE: usize = 512;

/// How much of the peeked head is inspected for text
pub const SNIFF_WINDOW: usize = 512;

/// Whether an upstream body is media or an error payload
///
/// A `200 OK` from the media host may still carry a JSON error body, so the
/// decision is made on content shape rather than status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Media,
    Error,
}

/// Classify a response from the start of its body.
///
/// A body whose first non-whitespace byte is `{` is an error. A textual
/// content type only counts when the head itself reads as text, so binary
/// media mislabelled as `text/plain` still passes through.
pub fn classify(content_type: Option<&str>, head: &[u8]) -> Classification {
    let Some(start) = head.iter().position(|b| !b.is_ascii_whitespace()) else {
        return Classification::Media;
    };
    let body = &head[start..];
    if body[0] == b'{' {
        return Classification::Error;
    }

    let textual = content_type
        .map(|ct| ct.trim().to_ascii_lowercase())
        .is_some_and(|ct| ct.starts_with("application/json") || ct.starts_with("text/"));

    if textual && reads_as_text(body) {
        Classification::Error
    } else {
        Classification::Media
    }
}

/// No control bytes besides tab and line breaks in the sniff window
fn reads_as_text(body: &[u8]) -> bool {
    body.iter()
        .take(SNIFF_WINDOW)
        .all(|b| !b.is_ascii_control() || matches!(b, b'\t' | b'\n' | b'\r'))
}

pub fn first_significant_byte(chunk: &[u8]) -> Option<u8> {
    chunk.iter().copied().find(|b| !b.is_ascii_whitespace())
}

/// Best human-readable message from an error payload.
///
/// JSON objects contribute `error`, then `details`, then `message`; anything
/// else is reported as trimmed text.
pub fn error_message(body: &[u8]) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        let found = ["error", "details", "message"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|value| match value {
                Value::Null => None,
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => Some(s.trim().to_string()),
                other => Some(other.to_string()),
            });
        if let Some(message) = found {
            return message;
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return "upstream returned an error payload".to_string();
    }
    match text.char_indices().nth(MAX_RAW_MESSAGE) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_is_media() {
        let mp4 = b"\x00\x00\x00\x20ftypisom";
        assert_eq!(
            classify(Some("video/mp4"), mp4),
            Classification::Media
        );
        let mp3 = b"ID3\x04\x00";
        assert_eq!(
            classify(None, mp3),
            Classification::Media
        );
    }

    #[test]
    fn json_body_under_media_type_is_error() {
        let body = b"  \n{\"error\":\"link expired\"}";
        assert_eq!(
            classify(Some("application/octet-stream"), body),
            Classification::Error
        );
    }

    #[test]
    fn textual_content_type_is_error() {
        assert_eq!(
            classify(Some("text/html; charset=utf-8"), b"<html>Access denied</html>"),
            Classification::Error
        );
        assert_eq!(
            classify(Some("Application/JSON"), b"[\"quota\"]"),
            Classification::Error
        );
    }

    #[test]
    fn binary_head_under_textual_type_is_media() {
        assert_eq!(
            classify(Some("text/plain"), b"ID3\x04\x00\x00\x00\x00binary-frames"),
            Classification::Media
        );
        assert_eq!(
            classify(Some("application/json"), b"\x00\x00\x00\x20ftypisom"),
            Classification::Media
        );
    }

    #[test]
    fn message_prefers_error_then_details() {
        assert_eq!(
            error_message(br#"{"details":"quota","error":"limit reached"}"#),
            "limit reached"
        );
        assert_eq!(
            error_message(br#"{"error":"","details":"token expired"}"#),
            "token expired"
        );
        assert_eq!(
            error_message(br#"{"message":"not found","status":404}"#),
            "not found"
        );
        assert_eq!(
            error_message(br#"{"error":{"code":7}}"#),
            r#"{"code":7}"#
        );
    }

    #[test]
    fn message_falls_back_to_text() {
        assert_eq!(error_message(b"  Forbidden\n"), "Forbidden");
        assert_eq!(error_message(b"{broken"), "{broken");
        assert_eq!(error_message(b""), "upstream returned an error payload");
    }

    #[test]
    fn long_text_is_truncated() {
        let body = "x".repeat(2000);
        let message = error_message(body.as_bytes());
        assert_eq!(message.len(), MAX_RAW_MESSAGE + 3);
        assert!(message.ends_with("..."));
    }
}
