//! Integration tests for cookie provisioning and the admin upload endpoint.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::common::{TestApp, ADMIN_SECRET, COOKIE_FILE};

const BOUNDARY: &str = "ytrelay-test-boundary";

fn upload(secret: Option<&str>, field: &str, content: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"cookies.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n{content}\r\n--{b}--\r\n",
        b = BOUNDARY,
        field = field,
        content = content,
    );
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/upload_cookies")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(secret) = secret {
        builder = builder.header("x-admin-secret", secret);
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// A base64 cookie payload at startup makes cookies active
#[tokio::test]
async fn test_base64_cookies_activate() {
    let app = TestApp::builder()
        .cookie_base64(&STANDARD.encode(COOKIE_FILE))
        .build();

    let (status, body) = app.request(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cookies_active"], true);

    let (status, body) = app.request(get("/api/cookie_status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "environment");
    assert_eq!(body["youtube_cookies"], 1);
    assert!(!body.to_string().contains("abc123"));
}

#[tokio::test]
async fn test_invalid_base64_leaves_cookies_inactive() {
    let app = TestApp::builder().cookie_base64("%%% not base64 %%%").build();

    let (_, body) = app.request(get("/health")).await;
    assert_eq!(body["cookies_active"], false);
}

#[tokio::test]
async fn test_upload_rejects_wrong_secret() {
    let app = TestApp::builder().admin_secret(ADMIN_SECRET).build();

    let (status, body) = app.request(upload(None, "cookies", COOKIE_FILE)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid admin secret");

    let (status, _) = app
        .request(upload(Some("guess"), "cookies", COOKIE_FILE))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.request(get("/health")).await;
    assert_eq!(body["cookies_active"], false);
}

#[tokio::test]
async fn test_upload_disabled_without_admin_secret() {
    let app = TestApp::builder().build();

    let (status, _) = app
        .request(upload(Some("anything"), "cookies", COOKIE_FILE))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_upload_replaces_cookie_file() {
    let app = TestApp::builder().admin_secret(ADMIN_SECRET).build();

    let (status, body) = app
        .request(upload(Some(ADMIN_SECRET), "cookies", COOKIE_FILE))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"]["cookies_active"], true);
    assert_eq!(body["status"]["source"], "upload");

    let (_, health) = app.request(get("/health")).await;
    assert_eq!(health["cookies_active"], true);
}

#[tokio::test]
async fn test_upload_validates_content() {
    let app = TestApp::builder().admin_secret(ADMIN_SECRET).build();

    let (status, _) = app
        .request(upload(Some(ADMIN_SECRET), "cookies", "this is not a cookie file"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(upload(Some(ADMIN_SECRET), "file", COOKIE_FILE))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing 'cookies' file field");
}
