//! Progress events pushed to WebSocket clients.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event emitted while a download moves through extraction and upload.
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Extraction progress or stage change
    DownloadProgress(DownloadProgressEvent),

    /// Bytes sent to object storage
    UploadProgress(UploadProgressEvent),

    /// File is ready, either in object storage or as a local fallback
    DownloadComplete(DownloadCompleteEvent),

    /// Download failed
    DownloadError(DownloadErrorEvent),
}

impl ProgressEvent {
    pub fn session_id(&self) -> &str {
        match self {
            ProgressEvent::DownloadProgress(e) => &e.session_id,
            ProgressEvent::UploadProgress(e) => &e.session_id,
            ProgressEvent::DownloadComplete(e) => &e.session_id,
            ProgressEvent::DownloadError(e) => &e.session_id,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ProgressEvent::DownloadProgress(_) => "download_progress",
            ProgressEvent::UploadProgress(_) => "upload_progress",
            ProgressEvent::DownloadComplete(_) => "download_complete",
            ProgressEvent::DownloadError(_) => "download_error",
        }
    }

    pub fn downloading(session_id: &str, percent: &str, speed: &str, eta: &str) -> Self {
        ProgressEvent::DownloadProgress(DownloadProgressEvent {
            session_id: session_id.to_string(),
            status: DownloadStage::Downloading,
            percent: Some(percent.to_string()),
            speed: Some(speed.to_string()),
            eta: Some(eta.to_string()),
            message: None,
        })
    }

    pub fn stage(session_id: &str, status: DownloadStage) -> Self {
        ProgressEvent::DownloadProgress(DownloadProgressEvent {
            session_id: session_id.to_string(),
            status,
            percent: None,
            speed: None,
            eta: None,
            message: status.message().map(str::to_string),
        })
    }

    pub fn error(session_id: &str, error: impl Into<String>) -> Self {
        ProgressEvent::DownloadError(DownloadErrorEvent {
            session_id: session_id.to_string(),
            error: error.into(),
        })
    }
}

/// Stage reported in `download_progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStage {
    Downloading,
    Processing,
    Uploading,
}

impl DownloadStage {
    fn message(&self) -> Option<&'static str> {
        match self {
            DownloadStage::Downloading => None,
            DownloadStage::Processing => Some("Processing video..."),
            DownloadStage::Uploading => Some("Uploading to cloud storage..."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgressEvent {
    pub session_id: String,
    pub status: DownloadStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadProgressEvent {
    pub session_id: String,
    /// e.g. `"42.0%"`
    pub percent: String,
    /// MiB uploaded, two decimals
    pub uploaded: String,
    /// MiB total, two decimals
    pub total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadCompleteEvent {
    pub session_id: String,
    pub download_id: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadErrorEvent {
    pub session_id: String,
    pub error: String,
}

/// Fan-out of progress events to every connected socket.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ProgressEvent) {
        tracing::trace!(
            event = event.event_name(),
            session_id = event.session_id(),
            "Publishing progress event"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Limits how often a percentage is reported.
///
/// An update passes when it moved at least `min_step` points past the last
/// emitted value, when `min_interval` elapsed, or when it reaches 100.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    min_step: f64,
    min_interval: Duration,
    last: Option<(f64, Instant)>,
}

impl ProgressThrottle {
    pub fn new(min_step: f64, min_interval: Duration) -> Self {
        Self {
            min_step,
            min_interval,
            last: None,
        }
    }

    pub fn should_emit(&mut self, percent: f64) -> bool {
        self.should_emit_at(percent, Instant::now())
    }

    fn should_emit_at(&mut self, percent: f64, now: Instant) -> bool {
        let emit = match self.last {
            None => true,
            Some((last_percent, last_at)) => {
                (percent >= 100.0 && last_percent < 100.0)
                    || percent - last_percent >= self.min_step
                    || now.duration_since(last_at) >= self.min_interval
            }
        };
        if emit {
            self.last = Some((percent, now));
        }
        emit
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(1.0, Duration::from_secs(1))
    }
}
