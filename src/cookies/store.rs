use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::config::CookieConfig;

use super::netscape::summarize;

/// Largest cookie file accepted from an upload.
pub const MAX_COOKIE_FILE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("cookie payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("cookie file is empty")]
    Empty,

    #[error("cookie file is too large ({size} bytes, limit {MAX_COOKIE_FILE_BYTES})")]
    TooLarge { size: usize },

    #[error("cookie file contains no Netscape-format cookies")]
    InvalidFormat,

    #[error("failed to write cookie file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the current cookie file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieSource {
    /// Decoded from `COOKIE_BASE64` at startup
    Environment,
    /// Uploaded through the admin endpoint
    Upload,
    /// Found on disk at `COOKIE_FILE`
    File,
}

/// Report returned by `/api/cookie_status` and the upload endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CookieStatus {
    pub cookies_active: bool,
    pub source: Option<CookieSource>,
    pub size_bytes: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub format_valid: bool,
    pub cookie_count: usize,
    pub youtube_cookies: usize,
    pub expired_cookies: usize,
    pub has_login_cookies: bool,
}

/// Owner of the on-disk cookie file handed to the extractor.
#[derive(Debug)]
pub struct CookieStore {
    path: PathBuf,
    source: Mutex<Option<CookieSource>>,
}

impl CookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: Mutex::new(None),
        }
    }

    /// Seed the cookie file from configuration.
    ///
    /// Failures are logged and leave the service running without cookies.
    pub fn provision(config: &CookieConfig) -> Self {
        let store = Self::new(&config.cookie_file);

        if let Some(encoded) = &config.cookie_base64 {
            match store.provision_from_base64(encoded) {
                Ok(bytes) => {
                    tracing::info!(
                        path = %store.path.display(),
                        bytes,
                        "Cookie file written from COOKIE_BASE64"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Could not provision cookies from COOKIE_BASE64; continuing without cookies"
                    );
                }
            }
        } else if store.is_active() {
            *store.source.lock() = Some(CookieSource::File);
            tracing::info!(path = %store.path.display(), "Using existing cookie file");
        } else {
            tracing::info!("No cookies configured; relying on client emulation fallbacks");
        }

        store
    }

    /// Decode a base64 payload and write it to the cookie path.
    pub fn provision_from_base64(&self, encoded: &str) -> Result<usize, CookieError> {
        let bytes = decode_base64(encoded)?;
        if bytes.is_empty() {
            return Err(CookieError::Empty);
        }
        write_atomically(&self.path, &bytes)?;
        *self.source.lock() = Some(CookieSource::Environment);
        Ok(bytes.len())
    }

    /// Replace the cookie file with uploaded content.
    pub fn store_upload(&self, bytes: &[u8]) -> Result<CookieStatus, CookieError> {
        if bytes.is_empty() {
            return Err(CookieError::Empty);
        }
        if bytes.len() > MAX_COOKIE_FILE_BYTES {
            return Err(CookieError::TooLarge { size: bytes.len() });
        }
        let text = String::from_utf8_lossy(bytes);
        if !summarize(&text, Utc::now().timestamp()).format_valid() {
            return Err(CookieError::InvalidFormat);
        }

        write_atomically(&self.path, bytes)?;
        *self.source.lock() = Some(CookieSource::Upload);
        tracing::info!(path = %self.path.display(), bytes = bytes.len(), "Cookie file replaced by upload");
        Ok(self.status())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A cookie file exists and is non-empty.
    pub fn is_active(&self) -> bool {
        std::fs::metadata(&self.path).is_ok_and(|m| m.is_file() && m.len() > 0)
    }

    /// Path to pass to the extractor, if cookies are usable.
    pub fn active_path(&self) -> Option<PathBuf> {
        self.is_active().then(|| self.path.clone())
    }

    pub fn status(&self) -> CookieStatus {
        let metadata = std::fs::metadata(&self.path).ok().filter(|m| m.is_file());
        let active = metadata.as_ref().is_some_and(|m| m.len() > 0);
        let summary = if active {
            std::fs::read(&self.path)
                .map(|bytes| summarize(&String::from_utf8_lossy(&bytes), Utc::now().timestamp()))
                .unwrap_or_default()
        } else {
            Default::default()
        };

        CookieStatus {
            cookies_active: active,
            source: if active { *self.source.lock() } else { None },
            size_bytes: metadata.as_ref().map(|m| m.len()),
            modified_at: metadata
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
            format_valid: summary.format_valid(),
            cookie_count: summary.entries,
            youtube_cookies: summary.youtube_entries,
            expired_cookies: summary.expired_entries,
            has_login_cookies: summary.has_login_cookies,
        }
    }
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, CookieError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    match STANDARD.decode(&compact) {
        Ok(bytes) => Ok(bytes),
        Err(standard_err) => URL_SAFE.decode(&compact).map_err(|_| standard_err.into()),
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), CookieError> {
    let io_err = |source| CookieError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(io_err)?;

    let mut file = tempfile::NamedTempFile::new_in(&parent).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.flush().map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(io_err)?;
    }

    file.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
