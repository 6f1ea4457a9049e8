//! Integration tests for the token, format and lookup endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;

use super::common::{FakeExtractor, TestApp};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header("x-token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn request_token_from(ip: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/request_token")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

/// Health always answers with the three documented fields
#[tokio::test]
async fn test_health_reports_state() {
    let app = TestApp::builder().build();

    let (status, body) = app.request(get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert!(body["idle_minutes"].as_f64().is_some());
    assert_eq!(body["cookies_active"], false);
}

#[tokio::test]
async fn test_request_token_shape() {
    let app = TestApp::builder().build();

    let (status, body) = app.request(request_token_from("203.0.113.10")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["expires_in"], 300);
    assert_eq!(body["token"].as_str().map(str::len), Some(43));
}

/// Ten tokens per address per hour, then 429
#[tokio::test]
async fn test_token_rate_limit() {
    let app = TestApp::builder().build();

    for _ in 0..10 {
        let (status, _) = app.request(request_token_from("203.0.113.20")).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = app.request(request_token_from("203.0.113.20")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Rate limit exceeded. Try again later.");

    // Other addresses are unaffected
    let (status, _) = app.request(request_token_from("203.0.113.21")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_fetch_formats_catalog() {
    let app = TestApp::builder().build();
    let token = app.token();

    let (status, body) = app
        .request(post_json(
            "/api/fetch_formats",
            Some(&token),
            json!({"url": "https://www.youtube.com/watch?v=abc"}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["title"], "Test Clip");

    let qualities: Vec<&str> = body["video_formats"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["quality"].as_str().unwrap())
        .collect();
    assert_eq!(qualities, vec!["1080p", "720p"]);
    // Largest file wins within a height
    assert_eq!(body["video_formats"][1]["format_id"], "136");

    assert_eq!(body["audio_formats"][0]["format_id"], "251");
    assert_eq!(body["best_audio"]["format_id"], "251");
    assert_eq!(body["all_formats"].as_array().unwrap().len(), 6);

    // Validation does not consume the token
    let (status, _) = app
        .request(post_json(
            "/api/fetch_formats",
            Some(&token),
            json!({"url": "https://www.youtube.com/watch?v=abc"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_fetch_formats_requires_token_and_url() {
    let app = TestApp::builder().build();

    let (status, body) = app
        .request(post_json(
            "/api/fetch_formats",
            None,
            json!({"url": "https://youtu.be/abc"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired token");

    let token = app.token();
    let (status, body) = app
        .request(post_json("/api/fetch_formats", Some(&token), json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "URL is required");
}

#[tokio::test]
async fn test_fetch_formats_extractor_failure() {
    let extractor = Arc::new(FakeExtractor::failing("ERROR: [youtube] abc: Video unavailable"));
    let app = TestApp::builder().extractor(extractor).build();
    let token = app.token();

    let (status, body) = app
        .request(post_json(
            "/api/fetch_formats",
            Some(&token),
            json!({"url": "https://youtu.be/abc"}),
        ))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Video unavailable"));
}

#[tokio::test]
async fn test_unknown_download_is_404() {
    let app = TestApp::builder().build();
    let token = app.token();

    let request = Request::builder()
        .uri("/api/download/does-not-exist")
        .header("x-token", &token)
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.request(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Download not found");
}
