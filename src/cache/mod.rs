//! The offline article cache: persisted article records plus their images.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::app::{Result, TidingsError};
use crate::blob::BlobStore;
use crate::domain::{Article, CachedArticle};
use crate::store::{Store, UpsertOutcome};

pub const DEFAULT_EVICTION_DAYS: i64 = 30;

/// Rough text footprint of one cached record, used by [`ArticleCache::size_estimate`].
pub const ESTIMATED_RECORD_BYTES: u64 = 2 * 1024;

/// Per-batch tally of an upsert. Individual failures never abort a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    /// Rejected by validation before reaching the store.
    pub rejected: usize,
    /// Valid but failed to persist.
    pub failed: usize,
}

impl UpsertReport {
    pub fn persisted(&self) -> usize {
        self.inserted + self.updated
    }
}

pub struct ArticleCache {
    store: Arc<dyn Store + Send + Sync>,
    blobs: Arc<BlobStore>,
}

impl ArticleCache {
    pub fn new(store: Arc<dyn Store + Send + Sync>, blobs: Arc<BlobStore>) -> Self {
        Self { store, blobs }
    }

    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }

    pub fn upsert(&self, articles: &[Article]) -> UpsertReport {
        self.upsert_at(articles, Utc::now())
    }

    /// Insert or update every article, stamping new records with `now`.
    pub fn upsert_at(&self, articles: &[Article], now: DateTime<Utc>) -> UpsertReport {
        let mut report = UpsertReport::default();

        for article in articles {
            if let Err(e) = article.validate() {
                warn!("Rejected article {:?} ({}): {}", article.title, article.url, e);
                report.rejected += 1;
                continue;
            }

            match self.store.upsert_article(article, now) {
                Ok(UpsertOutcome::Inserted) => report.inserted += 1,
                Ok(UpsertOutcome::Updated) => report.updated += 1,
                Err(e) => {
                    warn!("Failed to cache article {}: {}", article.id, e);
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Cached {} articles ({} new, {} updated, {} rejected, {} failed)",
            report.persisted(),
            report.inserted,
            report.updated,
            report.rejected,
            report.failed
        );
        report
    }

    /// All cached articles, most recently cached first.
    pub fn get_all(&self) -> Result<Vec<Article>> {
        let records = self.store.get_cached_articles()?;
        Ok(records.into_iter().map(CachedArticle::into_article).collect())
    }

    /// Articles whose cache flag says bookmarked, most recently bookmarked first.
    pub fn get_bookmarked(&self) -> Result<Vec<Article>> {
        let records = self.store.get_flagged_articles()?;
        Ok(records.into_iter().map(CachedArticle::into_article).collect())
    }

    pub fn get(&self, id: &str) -> Result<Option<CachedArticle>> {
        self.store.get_cached_article(id)
    }

    pub fn is_cached(&self, id: &str) -> Result<bool> {
        self.store.cached_article_exists(id)
    }

    pub fn count(&self) -> Result<i64> {
        self.store.count_cached()
    }

    /// Update the derived bookmark flag. Unknown ids are ignored.
    pub fn set_bookmark_flag(&self, id: &str, flag: bool) -> Result<()> {
        if !self.store.set_bookmark_flag(id, flag, Utc::now())? {
            debug!("Bookmark flag for uncached article {} not stored", id);
        }
        Ok(())
    }

    pub fn clear_bookmark_flags(&self) -> Result<usize> {
        self.store.clear_bookmark_flags()
    }

    /// Delete one article and its image. Unknown ids are ignored.
    pub fn remove(&self, id: &str) -> Result<()> {
        if let Some(record) = self.store.delete_cached_article(id)? {
            self.drop_image(record.article.image_url.as_deref());
        }
        Ok(())
    }

    pub fn evict_older_than(&self, days: i64, exclude_bookmarked: bool) -> Result<usize> {
        self.evict_older_than_at(days, exclude_bookmarked, Utc::now())
    }

    /// Delete records cached before `now - days`, with their images.
    pub fn evict_older_than_at(
        &self,
        days: i64,
        exclude_bookmarked: bool,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        Ok(self.evict_ids_older_than_at(days, exclude_bookmarked, now)?.len())
    }

    /// Like [`evict_older_than`](Self::evict_older_than), returning the ids of
    /// the evicted records.
    pub fn evict_ids_older_than(
        &self,
        days: i64,
        exclude_bookmarked: bool,
    ) -> Result<Vec<String>> {
        self.evict_ids_older_than_at(days, exclude_bookmarked, Utc::now())
    }

    fn evict_ids_older_than_at(
        &self,
        days: i64,
        exclude_bookmarked: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let cutoff = eviction_cutoff(days, now)?;
        let evicted = self.store.delete_cached_before(cutoff, exclude_bookmarked)?;

        for record in &evicted {
            self.drop_image(record.article.image_url.as_deref());
        }

        if !evicted.is_empty() {
            info!("Evicted {} articles cached before {}", evicted.len(), cutoff);
        }
        Ok(evicted.into_iter().map(|r| r.article.id).collect())
    }

    /// Drop every cached article and every stored image.
    pub fn clear(&self) -> Result<usize> {
        let deleted = self.store.delete_all_cached()?;
        if let Err(e) = self.blobs.clear() {
            warn!("Failed to clear image cache: {}", e);
        }
        info!("Cleared {} cached articles", deleted);
        Ok(deleted)
    }

    /// Estimated on-disk footprint: a fixed per-record allowance plus image bytes.
    pub fn size_estimate(&self) -> Result<u64> {
        let records = self.store.count_cached()?.max(0) as u64;
        let images = self.blobs.size_bytes().unwrap_or_else(|e| {
            warn!("Failed to measure image cache: {}", e);
            0
        });
        Ok(records * ESTIMATED_RECORD_BYTES + images)
    }

    fn drop_image(&self, image_url: Option<&str>) {
        if let Some(url) = image_url.filter(|u| !u.is_empty()) {
            if let Err(e) = self.blobs.remove(url) {
                warn!("Failed to remove cached image {}: {}", url, e);
            }
        }
    }
}

/// `now - days`, rejecting negative ages and ages outside the calendar range.
fn eviction_cutoff(days: i64, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if days < 0 {
        return Err(TidingsError::Config(format!(
            "Eviction age must not be negative (got {} days)",
            days
        )));
    }

    Duration::try_days(days)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| {
            TidingsError::Config(format!("Eviction age of {} days is out of range", days))
        })
}

/// Human-readable byte count using decimal units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1000 {
        return format!("{} bytes", bytes);
    }

    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
