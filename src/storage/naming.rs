//! Object key naming and duplicate detection.

use std::collections::HashMap;

/// Highest `_vN` suffix tried before falling back to a timestamp.
const MAX_VERSION: u32 = 10;

/// Turn a display filename into a bucket key.
///
/// Spaces become `_`, `|` becomes `-`, and everything except
/// alphanumerics and `._-[]()` is dropped.
pub fn clean_key(display_name: &str) -> String {
    display_name
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            '|' => Some('-'),
            c if c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | '[' | ']' | '(' | ')') => {
                Some(c)
            }
            _ => None,
        })
        .collect()
}

/// Outcome of checking a key against the bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChoice {
    /// An object of (nearly) the same size already exists under this key
    Existing(String),
    /// Upload under this key
    New(String),
}

/// Sizes within 1 % of the new file count as the same object.
pub fn is_same_size(existing: u64, size: u64) -> bool {
    existing.abs_diff(size) as f64 <= size as f64 * 0.01
}

/// Decide where an upload of `size` bytes named `key` should go.
pub fn resolve_key(existing: &HashMap<String, u64>, key: &str, size: u64, now_secs: i64) -> KeyChoice {
    let Some(&existing_size) = existing.get(key) else {
        return KeyChoice::New(key.to_string());
    };
    if is_same_size(existing_size, size) {
        return KeyChoice::Existing(key.to_string());
    }

    let (base, extension) = match key.rsplit_once('.') {
        Some((base, ext)) => (base, format!(".{}", ext)),
        None => (key, String::new()),
    };
    (1..=MAX_VERSION)
        .map(|version| format!("{}_v{}{}", base, version, extension))
        .find(|candidate| !existing.contains_key(candidate))
        .map(KeyChoice::New)
        .unwrap_or_else(|| KeyChoice::New(format!("{}_{}{}", base, now_secs, extension)))
}
