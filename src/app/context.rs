use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::app::error::{Result, TidingsError};
use crate::blob::{BlobStore, ImagePrefetcher};
use crate::bookmarks::BookmarkIndex;
use crate::cache::ArticleCache;
use crate::config::Config;
use crate::connectivity::ConnectivityGate;
use crate::feed::{FeedClient, NewsApiClient};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::store::{SqliteStore, Store};
use crate::sync::{spawn_coordinator, SyncHandle};

const DB_FILE: &str = "tidings.db";
const IMAGES_DIR: &str = "images";

/// Wires together store, caches, network clients and connectivity.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn Store + Send + Sync>,
    pub blobs: Arc<BlobStore>,
    pub cache: Arc<ArticleCache>,
    pub bookmarks: Arc<BookmarkIndex>,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
    pub feed: Arc<dyn FeedClient + Send + Sync>,
    pub connectivity: Arc<ConnectivityGate>,
    pub prefetcher: Option<ImagePrefetcher>,
}

impl AppContext {
    /// Open the on-disk cache. `db_path` overrides the configured data
    /// directory; images go next to the database.
    pub fn new(config: Config, db_path: Option<PathBuf>, online: bool) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => {
                let data_dir = match &config.storage.data_dir {
                    Some(dir) => dir.clone(),
                    None => Self::default_data_dir()?,
                };
                std::fs::create_dir_all(&data_dir)?;
                data_dir.join(DB_FILE)
            }
        };

        let images_dir = db_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(IMAGES_DIR);

        debug!("Opening cache at {}", db_path.display());
        let store: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::new(&db_path)?);
        Self::assemble(config, store, images_dir, online)
    }

    /// Throwaway context backed by an in-memory database and the given image
    /// directory.
    pub fn in_memory(config: Config, images_dir: &Path, online: bool) -> Result<Self> {
        let store: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::in_memory()?);
        Self::assemble(config, store, images_dir.to_path_buf(), online)
    }

    fn assemble(
        config: Config,
        store: Arc<dyn Store + Send + Sync>,
        images_dir: PathBuf,
        online: bool,
    ) -> Result<Self> {
        let blobs = Arc::new(BlobStore::new(images_dir)?);
        let cache = Arc::new(ArticleCache::new(store.clone(), blobs.clone()));
        let bookmarks = Arc::new(BookmarkIndex::new(store.clone()));

        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::with_timeout(
            Duration::from_secs(config.feed.timeout_secs),
        )?);
        let feed: Arc<dyn FeedClient + Send + Sync> =
            Arc::new(NewsApiClient::new(fetcher.clone(), config.feed.clone()));

        let prefetcher = config.images.prefetch.then(|| {
            ImagePrefetcher::with_concurrency(
                fetcher.clone(),
                blobs.clone(),
                config.images.max_concurrency,
            )
        });

        Ok(Self {
            connectivity: Arc::new(ConnectivityGate::new(online)),
            config,
            store,
            blobs,
            cache,
            bookmarks,
            fetcher,
            feed,
            prefetcher,
        })
    }

    /// Start a sync coordinator over this context's components.
    pub fn spawn_sync(&self) -> SyncHandle {
        self.spawn_sync_with(self.prefetcher.clone())
    }

    pub fn spawn_sync_with(&self, prefetcher: Option<ImagePrefetcher>) -> SyncHandle {
        spawn_coordinator(
            self.cache.clone(),
            self.bookmarks.clone(),
            self.feed.clone(),
            self.connectivity.clone(),
            prefetcher,
        )
    }

    pub fn default_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| TidingsError::Config("Could not find data directory".into()))?;
        Ok(data_dir.join("tidings"))
    }
}
