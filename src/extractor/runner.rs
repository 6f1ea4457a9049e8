use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::error::ExtractorError;
use super::progress::ExtractorProgress;

/// What to download and where to put it.
#[derive(Debug, Clone)]
pub struct DownloadSpec {
    pub url: String,
    pub video_format: String,
    pub audio_format: String,
    pub output_dir: PathBuf,
    /// Unique filename prefix used to find the result afterwards
    pub file_prefix: String,
}

impl DownloadSpec {
    /// `<video>+<audio>` selector.
    pub fn format_selector(&self) -> String {
        format!("{}+{}", self.video_format, self.audio_format)
    }

    /// yt-dlp output template inside the scratch directory.
    pub fn output_template(&self) -> String {
        self.output_dir
            .join(format!("{}%(title)s.%(ext)s", self.file_prefix))
            .to_string_lossy()
            .into_owned()
    }
}

/// Format ids are short tokens like `137`, `251-drc` or `hls-1080p`.
pub fn is_valid_format_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 64
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Something that can list formats and download media.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Whether the backing tool can be run at all.
    fn is_available(&self) -> bool;

    /// Metadata document for `url` (the `yt-dlp -J` JSON).
    async fn fetch_info(&self, url: &str) -> Result<Value, ExtractorError>;

    /// Download and mux `spec`, reporting progress on `progress`.
    ///
    /// The finished file is left in `spec.output_dir` with a name starting
    /// with `spec.file_prefix`. Returns its path when the tool reported one.
    async fn download(
        &self,
        spec: &DownloadSpec,
        progress: mpsc::Sender<ExtractorProgress>,
    ) -> Result<Option<PathBuf>, ExtractorError>;
}
