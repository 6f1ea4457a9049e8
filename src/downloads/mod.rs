//! Download orchestration and the registry of finished downloads.

mod manager;
mod registry;
mod sweeper;

pub use manager::{
    display_name, file_prefix, DownloadManager, DownloadRequest, StartError, FILE_BRAND,
};
pub use registry::{DownloadOutcome, DownloadRecord, DownloadRegistry, RECORD_RETENTION};
pub use sweeper::{spawn_sweeper, SWEEP_INTERVAL};
