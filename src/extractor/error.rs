use std::time::Duration;

use thiserror::Error;

/// How a failed extractor run should be treated by the retry ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// YouTube asked for a sign-in or otherwise flagged the request as a bot
    BotDetected,
    /// HTTP 429 or similar throttling
    RateLimited,
    /// Retrying cannot help (private, removed, unsupported, bad format)
    Permanent,
    /// Anything else, usually network trouble
    Transient,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureKind::Permanent)
    }
}

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("yt-dlp is not installed or not executable")]
    NotAvailable,

    #[error("failed to run yt-dlp: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to capture yt-dlp output")]
    OutputCaptureFailed,

    #[error("{message}")]
    Failed { kind: FailureKind, message: String },

    #[error("could not parse yt-dlp output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("yt-dlp did not finish within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    InvalidRequest(String),
}

impl ExtractorError {
    /// Build a failure from a non-zero exit.
    pub fn from_stderr(stderr: &str, exit_code: Option<i32>) -> Self {
        let kind = classify_failure(stderr);
        let message = summarize_stderr(stderr).unwrap_or_else(|| match exit_code {
            Some(code) => format!("yt-dlp exited with status {}", code),
            None => "yt-dlp was terminated by a signal".to_string(),
        });
        ExtractorError::Failed { kind, message }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractorError::Failed { kind, .. } => *kind,
            ExtractorError::Timeout(_) => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }
}

const BOT_MARKERS: [&str; 4] = [
    "sign in to confirm",
    "not a bot",
    "confirm your age",
    "http error 403",
];

const RATE_LIMIT_MARKERS: [&str; 3] = ["http error 429", "too many requests", "rate-limit"];

const PERMANENT_MARKERS: [&str; 9] = [
    "video unavailable",
    "private video",
    "is not a valid url",
    "unsupported url",
    "requested format is not available",
    "this video has been removed",
    "members-only content",
    "this live event will begin",
    "copyright claim",
];

/// Sort extractor stderr into a [`FailureKind`].
pub fn classify_failure(stderr: &str) -> FailureKind {
    let lower = stderr.to_lowercase();
    if PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
        FailureKind::Permanent
    } else if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        FailureKind::RateLimited
    } else if BOT_MARKERS.iter().any(|m| lower.contains(m)) {
        FailureKind::BotDetected
    } else {
        FailureKind::Transient
    }
}

/// The most useful line of stderr: the last `ERROR:` line, else the last non-empty line.
pub fn summarize_stderr(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
}
