//! Store wrapper whose calls can be made to fail on demand.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::app::{Result, TidingsError};
use crate::domain::{Article, BookmarkRecord, CachedArticle};
use crate::store::{SqliteStore, Store, UpsertOutcome};

pub struct FlakyStore {
    inner: SqliteStore,
    failing: AtomicBool,
    /// Article ids whose upsert always fails.
    poisoned_ids: HashSet<String>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::with_poisoned_ids(HashSet::new())
    }

    pub fn with_poisoned_ids(poisoned_ids: HashSet<String>) -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            failing: AtomicBool::new(false),
            poisoned_ids,
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TidingsError::Persistence("disk I/O error".into()))
        } else {
            Ok(())
        }
    }
}

impl Store for FlakyStore {
    fn upsert_article(&self, article: &Article, now: DateTime<Utc>) -> Result<UpsertOutcome> {
        self.check()?;
        if self.poisoned_ids.contains(&article.id) {
            return Err(TidingsError::Persistence("constraint failed".into()));
        }
        self.inner.upsert_article(article, now)
    }

    fn get_cached_article(&self, id: &str) -> Result<Option<CachedArticle>> {
        self.check()?;
        self.inner.get_cached_article(id)
    }

    fn get_cached_articles(&self) -> Result<Vec<CachedArticle>> {
        self.check()?;
        self.inner.get_cached_articles()
    }

    fn get_flagged_articles(&self) -> Result<Vec<CachedArticle>> {
        self.check()?;
        self.inner.get_flagged_articles()
    }

    fn cached_article_exists(&self, id: &str) -> Result<bool> {
        self.check()?;
        self.inner.cached_article_exists(id)
    }

    fn set_bookmark_flag(&self, id: &str, flag: bool, now: DateTime<Utc>) -> Result<bool> {
        self.check()?;
        self.inner.set_bookmark_flag(id, flag, now)
    }

    fn clear_bookmark_flags(&self) -> Result<usize> {
        self.check()?;
        self.inner.clear_bookmark_flags()
    }

    fn delete_cached_article(&self, id: &str) -> Result<Option<CachedArticle>> {
        self.check()?;
        self.inner.delete_cached_article(id)
    }

    fn delete_cached_before(
        &self,
        cutoff: DateTime<Utc>,
        exclude_bookmarked: bool,
    ) -> Result<Vec<CachedArticle>> {
        self.check()?;
        self.inner.delete_cached_before(cutoff, exclude_bookmarked)
    }

    fn delete_all_cached(&self) -> Result<usize> {
        self.check()?;
        self.inner.delete_all_cached()
    }

    fn count_cached(&self) -> Result<i64> {
        self.check()?;
        self.inner.count_cached()
    }

    fn insert_bookmark(&self, record: &BookmarkRecord) -> Result<bool> {
        self.check()?;
        self.inner.insert_bookmark(record)
    }

    fn delete_bookmark(&self, id: &str) -> Result<bool> {
        self.check()?;
        self.inner.delete_bookmark(id)
    }

    fn bookmark_exists(&self, id: &str) -> Result<bool> {
        self.check()?;
        self.inner.bookmark_exists(id)
    }

    fn get_bookmarks(&self) -> Result<Vec<BookmarkRecord>> {
        self.check()?;
        self.inner.get_bookmarks()
    }

    fn bookmark_ids(&self) -> Result<HashSet<String>> {
        self.check()?;
        self.inner.bookmark_ids()
    }

    fn count_bookmarks(&self) -> Result<i64> {
        self.check()?;
        self.inner.count_bookmarks()
    }

    fn delete_all_bookmarks(&self) -> Result<usize> {
        self.check()?;
        self.inner.delete_all_bookmarks()
    }
}
