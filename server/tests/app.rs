use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{Query, State},
    http::{Request, Response, StatusCode, header},
    response::Html,
    routing::get,
};
use serde_json::{Value, json};
use server::{ServerConfig, Upstreams, build_app};
use std::collections::HashMap;
use tower::ServiceExt;

const RESULTS_PAGE: &str = r#"<html><script>var ytInitialData = {"contents":{"twoColumnSearchResultsRenderer":{"primaryContents":{"sectionListRenderer":{"contents":[{"itemSectionRenderer":{"contents":[{"videoRenderer":{"videoId":"abc123","title":{"runs":[{"text":"Lofi Beats / Study Mix"}]},"thumbnail":{"thumbnails":[{"url":"https://i.ytimg.com/vi/abc123/hq720.jpg","width":720,"height":404}]},"lengthText":{"simpleText":"1:02:03"},"ownerText":{"runs":[{"text":"Chill Channel"}]},"viewCountText":{"simpleText":"42K views"}}}]}}]}}}}};</script></html>"#;

const TRACK: &[u8] = b"ID3\x04\x00\x00mpeg";

async fn results() -> Html<&'static str> {
    Html(RESULTS_PAGE)
}

async fn envelope(
    State(base): State<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    assert_eq!(
        params.get("url").map(String::as_str),
        Some("https://www.youtube.com/watch?v=abc123")
    );
    Json(json!({
        "success": true,
        "result": { "download_url": format!("{base}/media/track"), "title": "Lofi Beats / Study Mix" }
    }))
}

async fn spawn_upstreams() -> Upstreams {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = Router::new()
        .route("/results", get(results))
        .route("/download/ytmp3", get(envelope))
        .route("/download/ytmp4", get(envelope))
        .route("/media/track", get(|| async { TRACK }))
        .with_state(base.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Upstreams {
        search_base: base.clone(),
        resolver_base: format!("{base}/download"),
    }
}

async fn app() -> Router {
    build_app(&ServerConfig::default(), &spawn_upstreams().await).unwrap()
}

async fn send(router: Router, uri: &str) -> Response<Body> {
    router
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::ORIGIN, "http://somewhere.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn search_then_download_round_trip() {
    let router = app().await;

    let response = send(router.clone(), "/api/search?q=lofi").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let record: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(record["title"], "Lofi Beats / Study Mix");
    assert_eq!(record["channel"], "Chill Channel");
    assert_eq!(record["url"], "https://www.youtube.com/watch?v=abc123");

    let response = send(
        router,
        "/api/download?url=https%3A%2F%2Fwww.youtube.com%2Fwatch%3Fv%3Dabc123&type=audio",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-download-status"], "ok");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Lofi Beats  Study Mix.mp3\""
    );
    let exposed = response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(exposed.contains("x-download-status"));
    assert!(exposed.contains("content-disposition"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], TRACK);
}

#[tokio::test]
async fn blank_search_is_rejected() {
    let response = send(app().await, "/api/search?q=%20%20").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "error": "Please provide a search query" }));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let response = send(app().await, "/api/upload").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
