//! In-memory record of finished downloads.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How long a finished download can be looked up.
pub const RECORD_RETENTION: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Stored in the bucket
    Uploaded { download_url: String },
    /// Upload failed; the file is still in the scratch directory
    Fallback { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub download_id: String,
    /// Name shown to the user, e.g. `[Xenvu.tech] Title.mp4`
    pub filename: String,
    pub title: String,
    pub created_at: Instant,
    pub outcome: DownloadOutcome,
}

#[derive(Debug)]
pub struct DownloadRegistry {
    records: Mutex<HashMap<String, DownloadRecord>>,
    retention: Duration,
}

impl DownloadRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            retention,
        }
    }

    pub fn insert(&self, record: DownloadRecord) {
        self.records
            .lock()
            .insert(record.download_id.clone(), record);
    }

    pub fn get(&self, download_id: &str) -> Option<DownloadRecord> {
        self.records.lock().get(download_id).cloned()
    }

    /// Remove and return a fallback record so its file is served once.
    pub fn take_fallback(&self, download_id: &str) -> Option<DownloadRecord> {
        let mut records = self.records.lock();
        match records.get(download_id)?.outcome {
            DownloadOutcome::Fallback { .. } => records.remove(download_id),
            DownloadOutcome::Uploaded { .. } => None,
        }
    }

    /// Drop records past retention and delete the fallback files they own.
    pub fn purge_expired(&self) -> usize {
        self.purge_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_at(&self, now: Instant) -> usize {
        let expired: Vec<DownloadRecord> = {
            let mut records = self.records.lock();
            let ids: Vec<String> = records
                .values()
                .filter(|r| now.saturating_duration_since(r.created_at) >= self.retention)
                .map(|r| r.download_id.clone())
                .collect();
            ids.iter().filter_map(|id| records.remove(id)).collect()
        };

        for record in &expired {
            if let DownloadOutcome::Fallback { path } = &record.outcome {
                match std::fs::remove_file(path) {
                    Ok(()) => {
                        tracing::debug!(path = %path.display(), "Deleted expired fallback file")
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to delete expired fallback file")
                    }
                }
            }
        }

        if !expired.is_empty() {
            tracing::info!(removed = expired.len(), "Purged expired download records");
        }
        expired.len()
    }
}

impl Default for DownloadRegistry {
    fn default() -> Self {
        Self::new(RECORD_RETENTION)
    }
}
