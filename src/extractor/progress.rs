//! Parsing yt-dlp's stdout into progress updates.

use std::sync::LazyLock;

use regex::Regex;

/// Prefix of the lines produced by our `--progress-template`.
pub const PROGRESS_MARKER: &str = "[ytrelay-progress]";

/// Value passed to `--progress-template`.
pub(crate) fn progress_template() -> String {
    format!(
        "download:{} %(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s",
        PROGRESS_MARKER
    )
}

/// What yt-dlp is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorProgress {
    Downloading {
        percent: String,
        speed: String,
        eta: String,
    },
    /// Merging or fixing up the downloaded streams
    Processing,
}

static DEFAULT_PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[download\]\s+(\d+(?:\.\d+)?%)\s+of\s+~?\s*\S+(?:\s+at\s+(\S+))?(?:\s+ETA\s+(\S+))?",
    )
    .expect("progress regex is valid")
});

const POSTPROCESSOR_TAGS: [&str; 5] = [
    "[Merger]",
    "[VideoRemuxer]",
    "[VideoConvertor]",
    "[FixupM3u8]",
    "[FixupM4a]",
];

/// Parse one stdout line. Returns `None` for lines that carry no progress.
pub fn parse_progress_line(line: &str) -> Option<ExtractorProgress> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        let mut parts = rest.trim().splitn(3, '|').map(normalize_field);
        let percent = parts.next()?;
        if percent == "N/A" {
            return None;
        }
        return Some(ExtractorProgress::Downloading {
            percent,
            speed: parts.next().unwrap_or_else(|| "N/A".to_string()),
            eta: parts.next().unwrap_or_else(|| "N/A".to_string()),
        });
    }

    if POSTPROCESSOR_TAGS.iter().any(|tag| line.starts_with(tag)) {
        return Some(ExtractorProgress::Processing);
    }

    // Plain progress lines, for yt-dlp builds that ignore the template.
    let caps = DEFAULT_PROGRESS_RE.captures(line)?;
    Some(ExtractorProgress::Downloading {
        percent: caps.get(1)?.as_str().to_string(),
        speed: caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        eta: caps
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "N/A".to_string()),
    })
}

fn normalize_field(raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() || value == "NA" || value.eq_ignore_ascii_case("unknown") {
        "N/A".to_string()
    } else {
        value.to_string()
    }
}
