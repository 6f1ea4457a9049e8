//! Media extraction through the yt-dlp command-line tool.
//!
//! The extractor owns everything that touches YouTube: listing formats,
//! downloading and muxing a chosen video+audio pair, and the fallback ladder
//! of client profiles used when requests get flagged as automated.

mod error;
mod evasion;
mod formats;
mod progress;
mod runner;
mod ytdlp;

pub use error::{classify_failure, summarize_stderr, ExtractorError, FailureKind};
pub use evasion::{attempt_plan, pacing_args, ClientProfile, RetryPolicy};
pub use formats::{build_catalog, AudioFormat, FormatCatalog, VideoFormat};
pub use progress::{parse_progress_line, ExtractorProgress, PROGRESS_MARKER};
pub use runner::{is_valid_format_code, DownloadSpec, MediaExtractor};
pub use ytdlp::YtDlp;
