use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::blob::BlobStore;
use crate::fetcher::Fetcher;

pub const DEFAULT_PREFETCH_CONCURRENCY: usize = 4;

/// Best-effort background download of article images into the blob store.
///
/// Nothing here is surfaced to callers: failures are logged and the image is
/// simply fetched again on a later load.
#[derive(Clone)]
pub struct ImagePrefetcher {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    blobs: Arc<BlobStore>,
    semaphore: Arc<Semaphore>,
}

impl ImagePrefetcher {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>, blobs: Arc<BlobStore>) -> Self {
        Self::with_concurrency(fetcher, blobs, DEFAULT_PREFETCH_CONCURRENCY)
    }

    pub fn with_concurrency(
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        blobs: Arc<BlobStore>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            blobs,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Spawn one download per distinct, not-yet-cached URL.
    ///
    /// The handles are returned for callers that want to wait; dropping them
    /// leaves the downloads running.
    pub fn prefetch<I>(&self, urls: I) -> Vec<JoinHandle<()>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let mut handles = Vec::new();

        for url in urls {
            if !seen.insert(url.clone()) || self.blobs.contains(&url) {
                continue;
            }
            if Url::parse(&url).is_err() {
                debug!("Skipping image with invalid URL: {}", url);
                continue;
            }

            let fetcher = self.fetcher.clone();
            let blobs = self.blobs.clone();
            let semaphore = self.semaphore.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                match fetcher.fetch(&url).await {
                    Ok(bytes) => match blobs.put(&url, &bytes) {
                        Ok(true) => debug!("Cached image {} ({} bytes)", url, bytes.len()),
                        Ok(false) => {}
                        Err(e) => warn!("Failed to store image {}: {}", url, e),
                    },
                    Err(e) => warn!("Failed to fetch image {}: {}", url, e),
                }
            }));
        }

        handles
    }
}
