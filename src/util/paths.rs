//! Scratch directory helpers for in-flight downloads

use std::path::{Path, PathBuf};

/// Suffixes yt-dlp uses for files that are still being written.
const PARTIAL_SUFFIXES: [&str; 4] = [".part", ".ytdl", ".temp", ".tmp"];

/// Create the scratch directory and remove anything left over from a
/// previous run. Returns the number of entries removed.
pub fn prepare_scratch_dir(dir: &Path) -> std::io::Result<usize> {
    std::fs::create_dir_all(dir)?;

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let result = if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale download");
            }
        }
    }

    if removed > 0 {
        tracing::info!(dir = %dir.display(), removed, "Cleared stale downloads from scratch directory");
    }
    Ok(removed)
}

/// Whether `name` is a file yt-dlp is still writing.
pub fn is_partial_file(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Per-format intermediates look like `title.f137.mp4`. A finished file can
/// look the same when the title itself ends in `.f<digits>`.
fn looks_like_format_stream(name: &str) -> bool {
    name.rsplit('.').nth(1).is_some_and(|seg| {
        seg.len() > 1 && seg.starts_with('f') && seg[1..].chars().all(|c| c.is_ascii_digit())
    })
}

/// Find the finished file in `dir` whose name starts with `prefix`.
///
/// Names shaped like per-format streams are only returned when nothing else
/// matches, since yt-dlp deletes those once the merge succeeds.
pub fn find_by_prefix(dir: &Path, prefix: &str) -> std::io::Result<Option<PathBuf>> {
    let mut stream_like = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(prefix) || is_partial_file(name) || !entry.file_type()?.is_file() {
            continue;
        }
        if !looks_like_format_stream(name) {
            return Ok(Some(entry.path()));
        }
        stream_like.get_or_insert_with(|| entry.path());
    }
    Ok(stream_like)
}

/// Remove every file in `dir` whose name starts with `prefix`, finished or not.
pub fn remove_by_prefix(dir: &Path, prefix: &str) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(prefix));
        if matches && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
