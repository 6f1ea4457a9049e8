//! Shared state handed to every handler.

use std::sync::Arc;

use crate::activity::ActivityTracker;
use crate::auth::TokenStore;
use crate::config::Config;
use crate::cookies::CookieStore;
use crate::downloads::{DownloadManager, DownloadRegistry};
use crate::events::EventBus;
use crate::extractor::MediaExtractor;
use crate::storage::{ObjectStore, Uploader};

/// Cheap to clone; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenStore>,
    pub cookies: Arc<CookieStore>,
    pub activity: Arc<ActivityTracker>,
    pub registry: Arc<DownloadRegistry>,
    pub downloads: Arc<DownloadManager>,
    pub extractor: Arc<dyn MediaExtractor>,
    pub bus: EventBus,
    pub admin_secret: Option<Arc<str>>,
}

impl AppState {
    /// Wire up the services. Without an object store, finished downloads
    /// are only served from the scratch directory.
    pub fn new(
        config: &Config,
        cookies: Arc<CookieStore>,
        extractor: Arc<dyn MediaExtractor>,
        object_store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let tokens = Arc::new(TokenStore::new(&config.secret_key));
        let activity = Arc::new(ActivityTracker::new());
        let registry = Arc::new(DownloadRegistry::default());
        let bus = EventBus::default();
        let uploader = object_store.map(|store| Arc::new(Uploader::new(store)));

        let downloads = Arc::new(DownloadManager::new(
            extractor.clone(),
            uploader,
            registry.clone(),
            tokens.clone(),
            activity.clone(),
            bus.clone(),
            config.download_dir.clone(),
        ));

        Self {
            tokens,
            cookies,
            activity,
            registry,
            downloads,
            extractor,
            bus,
            admin_secret: config.admin_secret.as_deref().map(Arc::from),
        }
    }
}
