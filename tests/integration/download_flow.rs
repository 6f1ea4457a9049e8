//! Integration tests for the download pipeline: extraction, upload hand-off
//! and the local fallback.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use ytrelay::downloads::{DownloadRequest, StartError};
use ytrelay::events::{DownloadStage, ProgressEvent};

use super::common::{files_in, FakeExtractor, MemoryStore, TestApp};

fn request(app: &TestApp, session_id: &str) -> DownloadRequest {
    DownloadRequest {
        token: app.token(),
        url: "https://www.youtube.com/watch?v=abc".into(),
        video_code: "137".into(),
        audio_code: "140".into(),
        session_id: session_id.into(),
    }
}

/// Collect events for `session_id` until the download finishes either way.
async fn run_to_end(app: &TestApp, request: DownloadRequest) -> (String, Vec<ProgressEvent>) {
    let session_id = request.session_id.clone();
    let mut events = app.state.bus.subscribe();
    let download_id = app.state.downloads.start(request).expect("download accepted");

    let collected = tokio::time::timeout(Duration::from_secs(10), async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.expect("bus open");
            if event.session_id() != session_id {
                continue;
            }
            let done = matches!(
                event,
                ProgressEvent::DownloadComplete(_) | ProgressEvent::DownloadError(_)
            );
            seen.push(event);
            if done {
                return seen;
            }
        }
    })
    .await
    .expect("download finished in time");

    (download_id, collected)
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-token", token)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_download_uploads_and_cleans_up() {
    let store = Arc::new(MemoryStore::default());
    let app = TestApp::builder().store(store.clone()).build();

    let (download_id, events) = run_to_end(&app, request(&app, "s-upload")).await;

    let stages: Vec<DownloadStage> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::DownloadProgress(p) => Some(p.status),
            _ => None,
        })
        .collect();
    assert_eq!(stages.first(), Some(&DownloadStage::Downloading));
    assert!(stages.contains(&DownloadStage::Processing));
    assert_eq!(stages.last(), Some(&DownloadStage::Uploading));

    let Some(ProgressEvent::DownloadComplete(complete)) = events.last() else {
        panic!("expected download_complete, got {:?}", events.last());
    };
    assert_eq!(complete.download_id, download_id);
    assert_eq!(complete.filename, "[Xenvu.tech] Test Clip.mp4");
    assert_eq!(
        complete.download_url.as_deref(),
        Some("https://files.test/download/[Xenvu.tech]_Test_Clip.mp4")
    );
    assert!(!complete.fallback);

    assert_eq!(
        store.objects.lock()["[Xenvu.tech]_Test_Clip.mp4"],
        b"not really a video".to_vec()
    );
    assert!(files_in(&app.scratch_dir()).is_empty());

    let (status, body) = app
        .request(get_with_token(
            &format!("/api/download/{}", download_id),
            &app.token(),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["download_url"],
        "https://files.test/download/[Xenvu.tech]_Test_Clip.mp4"
    );
}

#[tokio::test]
async fn test_title_ending_like_format_stream_is_delivered() {
    for reports_path in [true, false] {
        let extractor = Arc::new(FakeExtractor {
            title: "Aperture sweep.f8".into(),
            reports_path,
            ..FakeExtractor::new()
        });
        let store = Arc::new(MemoryStore::default());
        let app = TestApp::builder()
            .extractor(extractor)
            .store(store.clone())
            .build();

        let (_, events) = run_to_end(&app, request(&app, "s-f8")).await;

        let Some(ProgressEvent::DownloadComplete(complete)) = events.last() else {
            panic!("expected download_complete, got {:?}", events.last());
        };
        assert_eq!(complete.filename, "[Xenvu.tech] Aperture sweep.f8.mp4");
        assert!(store
            .objects
            .lock()
            .contains_key("[Xenvu.tech]_Aperture_sweep.f8.mp4"));
    }
}

#[tokio::test]
async fn test_download_without_storage_serves_fallback_once() {
    let app = TestApp::builder().build();

    let (download_id, events) = run_to_end(&app, request(&app, "s-fallback")).await;

    let Some(ProgressEvent::DownloadComplete(complete)) = events.last() else {
        panic!("expected download_complete, got {:?}", events.last());
    };
    assert!(complete.fallback);
    assert!(complete.download_url.is_none());
    assert_eq!(files_in(&app.scratch_dir()).len(), 1);

    let token = app.token();
    let (status, body) = app
        .request(get_with_token(&format!("/api/download/{}", download_id), &token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Download not available");

    let response = app
        .router()
        .oneshot(get_with_token(
            &format!("/api/download/{}/file", download_id),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.starts_with("attachment;"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"not really a video");

    assert!(files_in(&app.scratch_dir()).is_empty());
    let (status, body) = app
        .request(get_with_token(&format!("/api/download/{}", download_id), &token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Download not found");
}

#[tokio::test]
async fn test_failed_upload_falls_back() {
    let store = Arc::new(MemoryStore {
        fail_puts: true,
        ..MemoryStore::default()
    });
    let app = TestApp::builder().store(store).build();

    let (_, events) = run_to_end(&app, request(&app, "s-put-fails")).await;

    let Some(ProgressEvent::DownloadComplete(complete)) = events.last() else {
        panic!("expected download_complete, got {:?}", events.last());
    };
    assert!(complete.fallback);
    assert_eq!(files_in(&app.scratch_dir()).len(), 1);
}

#[tokio::test]
async fn test_extraction_failure_reports_error() {
    let extractor = Arc::new(FakeExtractor::failing(
        "ERROR: [youtube] abc: Private video. Sign in if you've been granted access",
    ));
    let app = TestApp::builder().extractor(extractor).build();

    let (_, events) = run_to_end(&app, request(&app, "s-error")).await;

    let Some(ProgressEvent::DownloadError(error)) = events.last() else {
        panic!("expected download_error, got {:?}", events.last());
    };
    assert!(error.error.contains("Private video"));
}

#[tokio::test]
async fn test_start_validation() {
    let app = TestApp::builder().build();

    let mut bad_token = request(&app, "s1");
    bad_token.token = "forged".into();
    assert_eq!(
        app.state.downloads.start(bad_token),
        Err(StartError::InvalidToken)
    );

    let mut missing = request(&app, "s2");
    missing.audio_code.clear();
    assert_eq!(
        app.state.downloads.start(missing),
        Err(StartError::MissingParameters)
    );

    // Tokens are single use
    let first = request(&app, "s3");
    let mut reused = first.clone();
    reused.session_id = "s4".into();
    assert!(app.state.downloads.start(first).is_ok());
    assert_eq!(
        app.state.downloads.start(reused),
        Err(StartError::InvalidToken)
    );
}
