pub mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{Article, BookmarkRecord, CachedArticle};

pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Persistence substrate for the article cache and the bookmark list.
///
/// The two collections describe overlapping facts about the same article ids
/// and are deliberately not linked by a foreign key; keeping them consistent is
/// the sync coordinator's job.
pub trait Store {
    // Cached article operations
    fn upsert_article(&self, article: &Article, now: DateTime<Utc>) -> Result<UpsertOutcome>;
    fn get_cached_article(&self, id: &str) -> Result<Option<CachedArticle>>;
    fn get_cached_articles(&self) -> Result<Vec<CachedArticle>>;
    fn get_flagged_articles(&self) -> Result<Vec<CachedArticle>>;
    fn cached_article_exists(&self, id: &str) -> Result<bool>;
    fn set_bookmark_flag(&self, id: &str, flag: bool, now: DateTime<Utc>) -> Result<bool>;
    fn clear_bookmark_flags(&self) -> Result<usize>;
    fn delete_cached_article(&self, id: &str) -> Result<Option<CachedArticle>>;
    fn delete_cached_before(
        &self,
        cutoff: DateTime<Utc>,
        exclude_bookmarked: bool,
    ) -> Result<Vec<CachedArticle>>;
    fn delete_all_cached(&self) -> Result<usize>;
    fn count_cached(&self) -> Result<i64>;

    // Bookmark operations
    fn insert_bookmark(&self, record: &BookmarkRecord) -> Result<bool>;
    fn delete_bookmark(&self, id: &str) -> Result<bool>;
    fn bookmark_exists(&self, id: &str) -> Result<bool>;
    fn get_bookmarks(&self) -> Result<Vec<BookmarkRecord>>;
    fn bookmark_ids(&self) -> Result<HashSet<String>>;
    fn count_bookmarks(&self) -> Result<i64>;
    fn delete_all_bookmarks(&self) -> Result<usize>;
}
