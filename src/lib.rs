pub mod activity;
pub mod auth;
pub mod config;
pub mod cookies;
pub mod downloads;
pub mod events;
pub mod extractor;
pub mod storage;
pub mod util;
pub mod web;

pub use activity::ActivityTracker;
pub use auth::{TokenError, TokenStore};
pub use config::{Config, ConfigError};
pub use cookies::{CookieError, CookieStatus, CookieStore};
pub use downloads::{DownloadManager, DownloadRegistry};
pub use events::{EventBus, ProgressEvent};
pub use extractor::{ExtractorError, MediaExtractor, YtDlp};
pub use storage::{ObjectStore, R2Client, StorageError, Uploader};
pub use util::ToolAvailability;
pub use web::{build_router, run_server, AppState, WebError};
