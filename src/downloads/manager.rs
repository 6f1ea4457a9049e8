//! Orchestrates a download from request to storage hand-off.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::activity::ActivityTracker;
use crate::auth::TokenStore;
use crate::events::{
    DownloadCompleteEvent, DownloadStage, EventBus, ProgressEvent, ProgressThrottle,
    UploadProgressEvent,
};
use crate::extractor::{is_valid_format_code, DownloadSpec, ExtractorProgress, MediaExtractor};
use crate::storage::{ProgressFn, StorageError, Uploader};
use crate::util::{find_by_prefix, remove_by_prefix};

use super::registry::{DownloadOutcome, DownloadRecord, DownloadRegistry};

/// Brand stamped on every file name.
pub const FILE_BRAND: &str = "[Xenvu.tech]";

const MIB: f64 = 1024.0 * 1024.0;

/// A download request as received from a client.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub token: String,
    pub url: String,
    pub video_code: String,
    pub audio_code: String,
    /// Routing key for progress events
    pub session_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Missing required parameters")]
    MissingParameters,

    #[error("Invalid format code")]
    InvalidFormatCode,
}

/// Runs downloads in the background and reports through the event bus.
pub struct DownloadManager {
    extractor: Arc<dyn MediaExtractor>,
    uploader: Option<Arc<Uploader>>,
    registry: Arc<DownloadRegistry>,
    tokens: Arc<TokenStore>,
    activity: Arc<ActivityTracker>,
    bus: EventBus,
    scratch_dir: PathBuf,
}

impl DownloadManager {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        uploader: Option<Arc<Uploader>>,
        registry: Arc<DownloadRegistry>,
        tokens: Arc<TokenStore>,
        activity: Arc<ActivityTracker>,
        bus: EventBus,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            extractor,
            uploader,
            registry,
            tokens,
            activity,
            bus,
            scratch_dir,
        }
    }

    /// Validate `request`, consume its token and start the download.
    ///
    /// Returns the new download id. Everything after this point is reported
    /// as events for `request.session_id`.
    pub fn start(self: &Arc<Self>, request: DownloadRequest) -> Result<String, StartError> {
        if !self.tokens.consume(&request.token) {
            return Err(StartError::InvalidToken);
        }
        self.activity.touch();

        let url = request.url.trim();
        if url.is_empty() || request.video_code.is_empty() || request.audio_code.is_empty() {
            return Err(StartError::MissingParameters);
        }
        if !is_valid_format_code(&request.video_code) || !is_valid_format_code(&request.audio_code)
        {
            return Err(StartError::InvalidFormatCode);
        }

        let download_id = Uuid::new_v4().to_string();
        let spec = DownloadSpec {
            url: url.to_string(),
            video_format: request.video_code,
            audio_format: request.audio_code,
            output_dir: self.scratch_dir.clone(),
            file_prefix: file_prefix(&download_id),
        };

        tracing::info!(
            download_id = %download_id,
            session_id = %request.session_id,
            format = %spec.format_selector(),
            "Starting download"
        );

        let manager = Arc::clone(self);
        let id = download_id.clone();
        let session_id = request.session_id;
        tokio::spawn(async move { manager.run(id, session_id, spec).await });

        Ok(download_id)
    }

    async fn run(self: Arc<Self>, download_id: String, session_id: String, spec: DownloadSpec) {
        let (tx, rx) = mpsc::channel(64);
        let forwarder = tokio::spawn(forward_progress(rx, self.bus.clone(), session_id.clone()));
        let result = self.extractor.download(&spec, tx).await;
        let _ = forwarder.await;

        let reported = match result {
            Ok(reported) => reported,
            Err(e) => {
                tracing::warn!(download_id = %download_id, error = %e, "Download failed");
                self.discard_partials(&spec.file_prefix);
                self.bus.publish(ProgressEvent::error(&session_id, e.to_string()));
                return;
            }
        };

        let located = match reported.filter(|path| path.is_file()) {
            Some(path) => Ok(Some(path)),
            None => find_by_prefix(&self.scratch_dir, &spec.file_prefix),
        };
        let file = match located {
            Ok(Some(file)) => file,
            Ok(None) => {
                self.fail_missing_file(&download_id, &session_id, &spec.file_prefix, None);
                return;
            }
            Err(e) => {
                self.fail_missing_file(&download_id, &session_id, &spec.file_prefix, Some(e));
                return;
            }
        };

        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let filename = display_name(&file_name, &spec.file_prefix);
        let title = title_of(&file_name, &spec.file_prefix);

        self.bus
            .publish(ProgressEvent::stage(&session_id, DownloadStage::Uploading));

        let manager = Arc::clone(&self);
        tokio::spawn(async move {
            manager
                .finish(download_id, session_id, file, filename, title)
                .await
        });
    }

    /// Upload the finished file, falling back to serving it locally.
    async fn finish(
        &self,
        download_id: String,
        session_id: String,
        file: PathBuf,
        filename: String,
        title: String,
    ) {
        let result = match &self.uploader {
            Some(uploader) => {
                uploader
                    .upload(&file, &filename, self.upload_progress(&session_id))
                    .await
            }
            None => Err(StorageError::NotConfigured),
        };

        let (outcome, download_url) = match result {
            Ok(upload) => {
                if let Err(e) = tokio::fs::remove_file(&file).await {
                    tracing::warn!(path = %file.display(), error = %e, "Failed to delete uploaded file");
                }
                tracing::info!(
                    download_id = %download_id,
                    key = %upload.filename,
                    duplicate = upload.duplicate,
                    "Upload complete"
                );
                self.activity.touch();
                (
                    DownloadOutcome::Uploaded {
                        download_url: upload.download_url.clone(),
                    },
                    Some(upload.download_url),
                )
            }
            Err(e) => {
                tracing::warn!(
                    download_id = %download_id,
                    error = %e,
                    "Upload failed; keeping file for local delivery"
                );
                (DownloadOutcome::Fallback { path: file }, None)
            }
        };

        let fallback = download_url.is_none();
        self.registry.insert(DownloadRecord {
            download_id: download_id.clone(),
            filename: filename.clone(),
            title,
            created_at: Instant::now(),
            outcome,
        });
        self.bus
            .publish(ProgressEvent::DownloadComplete(DownloadCompleteEvent {
                session_id,
                download_id,
                filename,
                download_url,
                fallback,
            }));
    }

    fn upload_progress(&self, session_id: &str) -> ProgressFn {
        let bus = self.bus.clone();
        let session_id = session_id.to_string();
        let throttle = Mutex::new(ProgressThrottle::default());

        Arc::new(move |uploaded, total| {
            let percent = if total == 0 {
                100.0
            } else {
                uploaded as f64 / total as f64 * 100.0
            };
            if !throttle.lock().should_emit(percent) {
                return;
            }
            bus.publish(ProgressEvent::UploadProgress(UploadProgressEvent {
                session_id: session_id.clone(),
                percent: format!("{:.1}%", percent),
                uploaded: format!("{:.2}", uploaded as f64 / MIB),
                total: format!("{:.2}", total as f64 / MIB),
            }));
        })
    }

    fn fail_missing_file(
        &self,
        download_id: &str,
        session_id: &str,
        prefix: &str,
        error: Option<std::io::Error>,
    ) {
        tracing::error!(
            download_id,
            error = ?error,
            "Downloaded file not found"
        );
        self.discard_partials(prefix);
        self.bus
            .publish(ProgressEvent::error(session_id, "File not found after download"));
    }

    fn discard_partials(&self, prefix: &str) {
        if let Err(e) = remove_by_prefix(&self.scratch_dir, prefix) {
            tracing::warn!(prefix, error = %e, "Failed to clean up partial download");
        }
    }
}

/// `[Xenvu.tech]_<first 8 of id>_`
pub fn file_prefix(download_id: &str) -> String {
    let short: String = download_id.chars().take(8).collect();
    format!("{}_{}_", FILE_BRAND, short)
}

/// Swap the unique prefix for the brand, e.g. `[Xenvu.tech] Title.mp4`.
pub fn display_name(file_name: &str, prefix: &str) -> String {
    match file_name.strip_prefix(prefix) {
        Some(rest) => format!("{} {}", FILE_BRAND, rest),
        None => file_name.to_string(),
    }
}

fn title_of(file_name: &str, prefix: &str) -> String {
    let rest = file_name.strip_prefix(prefix).unwrap_or(file_name);
    Path::new(rest)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| rest.to_string())
}

async fn forward_progress(
    mut rx: mpsc::Receiver<ExtractorProgress>,
    bus: EventBus,
    session_id: String,
) {
    while let Some(update) = rx.recv().await {
        match update {
            ExtractorProgress::Downloading {
                percent,
                speed,
                eta,
            } => {
                bus.publish(ProgressEvent::downloading(&session_id, &percent, &speed, &eta));
            }
            ExtractorProgress::Processing => {
                bus.publish(ProgressEvent::stage(&session_id, DownloadStage::Processing));
            }
        }
    }
}
