//! Shared test utilities for ytrelay
//!
//! - A scripted `MediaExtractor` that writes a file instead of calling yt-dlp
//! - An in-memory `ObjectStore`
//! - Router request helpers

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

use ytrelay::config::Config;
use ytrelay::cookies::CookieStore;
use ytrelay::extractor::{DownloadSpec, ExtractorError, ExtractorProgress, MediaExtractor};
use ytrelay::storage::{CompletedPart, ObjectMetadata, ObjectStore, StorageError};
use ytrelay::web::{build_router, AppState};

pub const FRONTEND: &str = "https://theyt.pages.dev";
pub const ADMIN_SECRET: &str = "let-me-in";

/// A Netscape cookie file with one YouTube session cookie.
pub const COOKIE_FILE: &str = "# Netscape HTTP Cookie File\n\
.youtube.com\tTRUE\t/\tTRUE\t4102444800\tSID\tabc123\n";

/// Extractor that returns canned metadata and writes `content` as the download.
pub struct FakeExtractor {
    pub info: Value,
    pub content: Vec<u8>,
    /// Title the written file is named after
    pub title: String,
    /// Whether `download` returns the path, as yt-dlp's `--print` does
    pub reports_path: bool,
    pub fail_with: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self {
            info: sample_info(),
            content: b"not really a video".to_vec(),
            title: "Test Clip".to_string(),
            reports_path: true,
            fail_with: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(stderr: &str) -> Self {
        Self {
            fail_with: Some(stderr.to_string()),
            ..Self::new()
        }
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    fn is_available(&self) -> bool {
        true
    }

    async fn fetch_info(&self, url: &str) -> Result<Value, ExtractorError> {
        self.calls.lock().push(format!("info {}", url));
        match &self.fail_with {
            Some(stderr) => Err(ExtractorError::from_stderr(stderr, Some(1))),
            None => Ok(self.info.clone()),
        }
    }

    async fn download(
        &self,
        spec: &DownloadSpec,
        progress: mpsc::Sender<ExtractorProgress>,
    ) -> Result<Option<PathBuf>, ExtractorError> {
        self.calls
            .lock()
            .push(format!("download {} {}", spec.url, spec.format_selector()));
        if let Some(stderr) = &self.fail_with {
            return Err(ExtractorError::from_stderr(stderr, Some(1)));
        }

        for percent in ["10.0%", "55.0%", "100.0%"] {
            let _ = progress
                .send(ExtractorProgress::Downloading {
                    percent: percent.to_string(),
                    speed: "1.00MiB/s".to_string(),
                    eta: "00:01".to_string(),
                })
                .await;
        }
        let _ = progress.send(ExtractorProgress::Processing).await;

        let path = spec
            .output_dir
            .join(format!("{}{}.mp4", spec.file_prefix, self.title));
        tokio::fs::write(&path, &self.content).await?;
        Ok(self.reports_path.then_some(path))
    }
}

/// Object store backed by a map.
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_puts: bool,
}

fn not_expected() -> StorageError {
    StorageError::Request {
        operation: "multipart",
        message: "multipart not expected".into(),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_object_sizes(&self) -> Result<HashMap<String, u64>, StorageError> {
        Ok(self
            .objects
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.len() as u64))
            .collect())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        _metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        if self.fail_puts {
            return Err(StorageError::Request {
                operation: "PutObject",
                message: "SlowDown".into(),
            });
        }
        self.objects.lock().insert(key.to_string(), body.to_vec());
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        _key: &str,
        _metadata: &ObjectMetadata,
    ) -> Result<String, StorageError> {
        Err(not_expected())
    }

    async fn upload_part(
        &self,
        _key: &str,
        _upload_id: &str,
        _part_number: u32,
        _body: Bytes,
    ) -> Result<String, StorageError> {
        Err(not_expected())
    }

    async fn complete_multipart_upload(
        &self,
        _key: &str,
        _upload_id: &str,
        _parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        Err(not_expected())
    }

    async fn abort_multipart_upload(&self, _key: &str, _upload_id: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://files.test/download/{}", key)
    }
}

/// Everything a test needs to drive the service.
pub struct TestApp {
    pub state: AppState,
    pub dir: TempDir,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), FRONTEND)
    }

    pub fn scratch_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("downloads")
    }

    /// Issue a token directly, bypassing the rate limit of a shared address.
    pub fn token(&self) -> String {
        self.state
            .tokens
            .issue("198.51.100.1")
            .expect("token issued")
            .token
    }

    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        split_json(response).await
    }
}

#[derive(Default)]
pub struct TestAppBuilder {
    extractor: Option<Arc<dyn MediaExtractor>>,
    store: Option<Arc<dyn ObjectStore>>,
    admin_secret: Option<String>,
    cookie_base64: Option<String>,
}

impl TestAppBuilder {
    pub fn extractor(mut self, extractor: Arc<dyn MediaExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn admin_secret(mut self, secret: &str) -> Self {
        self.admin_secret = Some(secret.to_string());
        self
    }

    pub fn cookie_base64(mut self, encoded: &str) -> Self {
        self.cookie_base64 = Some(encoded.to_string());
        self
    }

    pub fn build(self) -> TestApp {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = Config {
            download_dir: dir.path().join("downloads"),
            admin_secret: self.admin_secret,
            ..Config::default()
        };
        config.cookies.cookie_file = dir.path().join("cookies.txt");
        config.cookies.cookie_base64 = self.cookie_base64;
        std::fs::create_dir_all(&config.download_dir).expect("Failed to create scratch dir");

        let cookies = Arc::new(CookieStore::provision(&config.cookies));
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(FakeExtractor::new()));
        let state = AppState::new(&config, cookies, extractor, self.store);

        TestApp { state, dir }
    }
}

pub async fn split_json(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)))
    };
    (status, body)
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Trimmed `yt-dlp -J` output with two heights and two audio tracks.
pub fn sample_info() -> Value {
    json!({
        "title": "Test Clip",
        "formats": [
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5, "filesize": 3_000_000},
            {"format_id": "251", "ext": "webm", "vcodec": "none", "acodec": "opus", "abr": 160.0, "filesize": 3_500_000},
            {"format_id": "136", "ext": "mp4", "vcodec": "avc1", "acodec": "none", "height": 720, "fps": 30.0, "filesize": 20_000_000},
            {"format_id": "247", "ext": "webm", "vcodec": "vp9", "acodec": "none", "height": 720, "fps": 30.0, "filesize": 18_000_000},
            {"format_id": "137", "ext": "mp4", "vcodec": "avc1", "acodec": "none", "height": 1080, "fps": 30.0, "filesize_approx": 40_000_000},
            {"format_id": "18", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a.40.2", "height": 360}
        ]
    })
}
