use crate::{ProviderMatch, SearchProvider};
use async_trait::async_trait;
use domain::ProxyError;
use serde_json::Value;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

/// Search filter restricting results to the "video" type
const VIDEO_ONLY_FILTER: &str = "EgIQAQ==";

const INITIAL_DATA_MARKERS: [&str; 3] = [
    "var ytInitialData = ",
    "window[\"ytInitialData\"] = ",
    "ytInitialData = ",
];

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Search provider backed by the public YouTube results page
pub struct YouTubeSearchProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl YouTubeSearchProvider {
    pub fn new(client: reqwest::Client) -> Result<Self, ProxyError> {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: &str) -> Result<Self, ProxyError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProxyError::InvalidInput(format!("bad search base url: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn results_url(&self, query: &str) -> Result<Url, ProxyError> {
        let mut url = self
            .base_url
            .join("results")
            .map_err(|e| ProxyError::InvalidInput(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("search_query", query)
            .append_pair("sp", VIDEO_ONLY_FILTER);
        Ok(url)
    }
}

#[async_trait]
impl SearchProvider for YouTubeSearchProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ProviderMatch>, ProxyError> {
        let url = self.results_url(query)?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::UpstreamFailure(format!(
                "search provider returned HTTP {status}"
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ProxyError::UpstreamFailure(e.to_string()))?;
        parse_results_page(&html, limit)
    }
}

/// Extract up to `limit` video matches from a results page, in page order.
pub fn parse_results_page(html: &str, limit: usize) -> Result<Vec<ProviderMatch>, ProxyError> {
    let data = extract_initial_data(html)?;

    let sections = data
        .pointer("/contents/twoColumnSearchResultsRenderer/primaryContents/sectionListRenderer/contents")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ProxyError::UpstreamMalformed("results page has no section list".to_string())
        })?;

    let matches = sections
        .iter()
        .filter_map(|section| section.pointer("/itemSectionRenderer/contents"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|item| item.get("videoRenderer"))
        .filter_map(parse_video_renderer)
        .take(limit)
        .collect();

    Ok(matches)
}

fn extract_initial_data(html: &str) -> Result<Value, ProxyError> {
    let start = INITIAL_DATA_MARKERS
        .iter()
        .find_map(|marker| html.find(marker).map(|pos| pos + marker.len()))
        .ok_or_else(|| {
            ProxyError::UpstreamMalformed("results page has no ytInitialData".to_string())
        })?;

    // The document is followed by `;</script>`; only the first JSON value is read.
    serde_json::Deserializer::from_str(&html[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| ProxyError::UpstreamMalformed("ytInitialData is empty".to_string()))?
        .map_err(|e| ProxyError::UpstreamMalformed(format!("ytInitialData: {e}")))
}

fn parse_video_renderer(renderer: &Value) -> Option<ProviderMatch> {
    let video_id = renderer.get("videoId")?.as_str()?;

    let thumbnail_url = renderer
        .pointer("/thumbnail/thumbnails")
        .and_then(Value::as_array)
        .and_then(|thumbs| {
            thumbs
                .iter()
                .max_by_key(|t| t.get("width").and_then(Value::as_u64).unwrap_or(0))
        })
        .and_then(|t| t.get("url"))
        .and_then(Value::as_str)
        .map(absolute_url)
        .unwrap_or_default();

    let duration_label = renderer.get("lengthText").and_then(text).unwrap_or_default();

    let live_badge = renderer
        .get("badges")
        .and_then(Value::as_array)
        .is_some_and(|badges| {
            badges.iter().any(|b| {
                b.pointer("/metadataBadgeRenderer/style").and_then(Value::as_str)
                    == Some("BADGE_STYLE_TYPE_LIVE_NOW")
            })
        });

    let author_name = renderer
        .get("ownerText")
        .or_else(|| renderer.get("longBylineText"))
        .and_then(text)
        .unwrap_or_default();

    let view_label = renderer
        .get("viewCountText")
        .or_else(|| renderer.get("shortViewCountText"))
        .and_then(text)
        .unwrap_or_default();

    Some(ProviderMatch {
        title: renderer.get("title").and_then(text).unwrap_or_default(),
        thumbnail_url,
        is_live: live_badge || duration_label.is_empty(),
        duration_label,
        author_name,
        view_label,
        canonical_url: format!("https://www.youtube.com/watch?v={video_id}"),
    })
}

/// Read a text node in either its `simpleText` or `runs` encoding.
fn text(node: &Value) -> Option<String> {
    if let Some(simple) = node.get("simpleText").and_then(Value::as_str) {
        return Some(simple.to_string());
    }
    let runs = node.get("runs")?.as_array()?;
    let joined: String = runs
        .iter()
        .filter_map(|run| run.get("text").and_then(Value::as_str))
        .collect();
    (!joined.is_empty()).then_some(joined)
}

fn absolute_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}
