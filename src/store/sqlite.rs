use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};
use tracing::warn;

use crate::app::{Result, TidingsError};
use crate::domain::{Article, BookmarkRecord, CachedArticle};
use crate::store::{Store, UpsertOutcome};

const CACHED_COLUMNS: &str = "id, title, author, published_at, content, image_url, url, \
                              is_bookmarked, is_cached, cached_at, bookmarked_at";

const BOOKMARK_COLUMNS: &str =
    "id, title, author, content, url, image_url, published_at, bookmarked_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn migrations() -> Migrations<'static> {
        Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))])
    }

    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.conn()?;
        Self::migrations().to_latest(&mut conn)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TidingsError::Persistence(format!("connection lock poisoned: {}", e)))
    }

    /// Fixed-width UTC timestamps so text comparison in SQL matches time order.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    /// An unreadable `cached_at` is treated as the epoch so the record is the
    /// first to go on the next eviction.
    fn parse_cached_at(row: &Row<'_>) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = row.get(9)?;
        Ok(Self::parse_datetime(&raw).unwrap_or_else(|| {
            let id: String = row.get(0).unwrap_or_default();
            warn!("Unreadable cached_at {:?} for article {}", raw, id);
            DateTime::<Utc>::UNIX_EPOCH
        }))
    }

    fn cached_from_row(row: &Row<'_>) -> rusqlite::Result<CachedArticle> {
        Ok(CachedArticle {
            article: Article {
                id: row.get(0)?,
                title: row.get(1)?,
                author: row.get(2)?,
                published_at: row
                    .get::<_, String>(3)
                    .ok()
                    .and_then(|s| Self::parse_datetime(&s))
                    .unwrap_or_else(Utc::now),
                content: row.get(4)?,
                image_url: row.get(5)?,
                url: row.get(6)?,
                is_bookmarked: row.get(7)?,
                is_cached: row.get(8)?,
            },
            cached_at: Self::parse_cached_at(row)?,
            bookmarked_at: row
                .get::<_, Option<String>>(10)?
                .and_then(|s| Self::parse_datetime(&s)),
        })
    }

    fn bookmark_from_row(row: &Row<'_>) -> rusqlite::Result<BookmarkRecord> {
        Ok(BookmarkRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            content: row.get(3)?,
            url: row.get(4)?,
            image_url: row.get(5)?,
            published_at: row
                .get::<_, String>(6)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
            bookmarked_at: row
                .get::<_, String>(7)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }
}

impl Store for SqliteStore {
    fn upsert_article(&self, article: &Article, now: DateTime<Utc>) -> Result<UpsertOutcome> {
        let conn = self.conn()?;

        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM cached_articles WHERE id = ?1",
                params![article.id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        let now = Self::format_datetime(&now);
        let bookmarked_at = article.is_bookmarked().then(|| now.clone());

        // cached_at is only written by the INSERT arm.
        conn.execute(
            "INSERT INTO cached_articles (id, title, author, published_at, content, image_url, url,
                                          is_bookmarked, is_cached, cached_at, bookmarked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                published_at = excluded.published_at,
                content = excluded.content,
                image_url = excluded.image_url,
                url = excluded.url,
                is_bookmarked = excluded.is_bookmarked,
                is_cached = 1,
                bookmarked_at = CASE
                    WHEN excluded.is_bookmarked = 1 AND COALESCE(cached_articles.is_bookmarked, 0) = 0
                    THEN excluded.bookmarked_at
                    ELSE cached_articles.bookmarked_at
                END",
            params![
                article.id,
                article.title,
                article.author,
                Self::format_datetime(&article.published_at),
                article.content,
                article.image_url,
                article.url,
                article.is_bookmarked,
                now,
                bookmarked_at,
            ],
        )?;

        Ok(if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn get_cached_article(&self, id: &str) -> Result<Option<CachedArticle>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {} FROM cached_articles WHERE id = ?1", CACHED_COLUMNS),
                params![id],
                Self::cached_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_cached_articles(&self) -> Result<Vec<CachedArticle>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM cached_articles ORDER BY cached_at DESC, published_at DESC",
            CACHED_COLUMNS
        ))?;

        let articles = stmt
            .query_map([], Self::cached_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(articles)
    }

    fn get_flagged_articles(&self) -> Result<Vec<CachedArticle>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM cached_articles WHERE is_bookmarked = 1
             ORDER BY bookmarked_at DESC, cached_at DESC",
            CACHED_COLUMNS
        ))?;

        let articles = stmt
            .query_map([], Self::cached_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(articles)
    }

    fn cached_article_exists(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cached_articles WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn set_bookmark_flag(&self, id: &str, flag: bool, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;

        let changed = if flag {
            conn.execute(
                "UPDATE cached_articles SET is_bookmarked = 1, bookmarked_at = ?1 WHERE id = ?2",
                params![Self::format_datetime(&now), id],
            )?
        } else {
            conn.execute(
                "UPDATE cached_articles SET is_bookmarked = 0 WHERE id = ?1",
                params![id],
            )?
        };

        Ok(changed > 0)
    }

    fn clear_bookmark_flags(&self) -> Result<usize> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE cached_articles SET is_bookmarked = 0 WHERE is_bookmarked = 1",
            [],
        )?;

        Ok(changed)
    }

    fn delete_cached_article(&self, id: &str) -> Result<Option<CachedArticle>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                &format!("SELECT {} FROM cached_articles WHERE id = ?1", CACHED_COLUMNS),
                params![id],
                Self::cached_from_row,
            )
            .optional()?;

        if existing.is_some() {
            tx.execute("DELETE FROM cached_articles WHERE id = ?1", params![id])?;
        }

        tx.commit()?;
        Ok(existing)
    }

    fn delete_cached_before(
        &self,
        cutoff: DateTime<Utc>,
        exclude_bookmarked: bool,
    ) -> Result<Vec<CachedArticle>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let stale = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM cached_articles
                 WHERE (cached_at < ?1 OR julianday(cached_at) IS NULL)
                   AND (?2 = 0 OR is_bookmarked IS NULL OR is_bookmarked = 0)",
                CACHED_COLUMNS
            ))?;

            let rows = stmt
                .query_map(
                    params![Self::format_datetime(&cutoff), exclude_bookmarked],
                    Self::cached_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        for record in &stale {
            tx.execute(
                "DELETE FROM cached_articles WHERE id = ?1",
                params![record.article.id],
            )?;
        }

        tx.commit()?;
        Ok(stale)
    }

    fn delete_all_cached(&self) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM cached_articles", [])?;
        Ok(deleted)
    }

    fn count_cached(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM cached_articles", [], |row| row.get(0))?;
        Ok(count)
    }

    fn insert_bookmark(&self, record: &BookmarkRecord) -> Result<bool> {
        let conn = self.conn()?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO bookmarks (id, title, author, content, url, image_url,
                                              published_at, bookmarked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.title,
                record.author,
                record.content,
                record.url,
                record.image_url,
                Self::format_datetime(&record.published_at),
                Self::format_datetime(&record.bookmarked_at),
            ],
        )?;

        Ok(inserted > 0)
    }

    fn delete_bookmark(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM bookmarks WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn bookmark_exists(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bookmarks WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn get_bookmarks(&self) -> Result<Vec<BookmarkRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bookmarks ORDER BY bookmarked_at DESC, id",
            BOOKMARK_COLUMNS
        ))?;

        let records = stmt
            .query_map([], Self::bookmark_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn bookmark_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT id FROM bookmarks")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;

        Ok(ids)
    }

    fn count_bookmarks(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM bookmarks", [], |row| row.get(0))?;
        Ok(count)
    }

    fn delete_all_bookmarks(&self) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM bookmarks", [])?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn article(n: u32) -> Article {
        Article::new(
            &format!("https://example.com/news/{}", n),
            &format!("Headline {}", n),
            Utc::now(),
        )
    }

    #[test]
    fn test_upsert_and_get_article() {
        let store = SqliteStore::in_memory().unwrap();
        let a = article(1);

        let outcome = store.upsert_article(&a, Utc::now()).unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let cached = store.get_cached_article(&a.id).unwrap().unwrap();
        assert_eq!(cached.article.title, "Headline 1");
        assert!(cached.article.is_cached);
        assert_eq!(cached.article.is_bookmarked, Some(false));
    }

    #[test]
    fn test_upsert_preserves_cached_at() {
        let store = SqliteStore::in_memory().unwrap();
        let mut a = article(1);
        let first = Utc::now() - Duration::days(3);

        store.upsert_article(&a, first).unwrap();
        a.title = "Updated headline".into();
        let outcome = store.upsert_article(&a, Utc::now()).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let cached = store.get_cached_article(&a.id).unwrap().unwrap();
        assert_eq!(cached.article.title, "Updated headline");
        assert_eq!(
            SqliteStore::format_datetime(&cached.cached_at),
            SqliteStore::format_datetime(&first)
        );
        assert_eq!(store.count_cached().unwrap(), 1);
    }

    #[test]
    fn test_upsert_keeps_tri_state_flag() {
        let store = SqliteStore::in_memory().unwrap();
        let mut a = article(1);
        a.is_bookmarked = None;
        store.upsert_article(&a, Utc::now()).unwrap();

        let cached = store.get_cached_article(&a.id).unwrap().unwrap();
        assert_eq!(cached.article.is_bookmarked, None);
        assert!(cached.bookmarked_at.is_none());
    }

    #[test]
    fn test_cached_articles_order_by_cached_at_desc() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        store.upsert_article(&article(1), now - Duration::hours(2)).unwrap();
        store.upsert_article(&article(2), now).unwrap();
        store.upsert_article(&article(3), now - Duration::hours(1)).unwrap();

        let titles: Vec<String> = store
            .get_cached_articles()
            .unwrap()
            .into_iter()
            .map(|c| c.article.title)
            .collect();
        assert_eq!(titles, vec!["Headline 2", "Headline 3", "Headline 1"]);
    }

    #[test]
    fn test_set_bookmark_flag_sets_timestamp_once() {
        let store = SqliteStore::in_memory().unwrap();
        let a = article(1);
        store.upsert_article(&a, Utc::now()).unwrap();

        assert!(store.set_bookmark_flag(&a.id, true, Utc::now()).unwrap());
        let cached = store.get_cached_article(&a.id).unwrap().unwrap();
        assert_eq!(cached.article.is_bookmarked, Some(true));
        let marked_at = cached.bookmarked_at.unwrap();

        assert!(store.set_bookmark_flag(&a.id, false, Utc::now()).unwrap());
        let cached = store.get_cached_article(&a.id).unwrap().unwrap();
        assert_eq!(cached.article.is_bookmarked, Some(false));
        // bookmarked_at is left behind once the flag is cleared
        assert_eq!(cached.bookmarked_at, Some(marked_at));
    }

    #[test]
    fn test_set_bookmark_flag_missing_is_noop() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store.set_bookmark_flag("missing", true, Utc::now()).unwrap());
    }

    #[test]
    fn test_flagged_articles_order_by_bookmarked_at_desc() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        for n in 1..=3 {
            store.upsert_article(&article(n), now).unwrap();
        }

        store.set_bookmark_flag(&article(1).id, true, now - Duration::minutes(10)).unwrap();
        store.set_bookmark_flag(&article(3).id, true, now).unwrap();

        let flagged = store.get_flagged_articles().unwrap();
        assert_eq!(flagged.len(), 2);
        assert_eq!(flagged[0].article.title, "Headline 3");
        assert_eq!(flagged[1].article.title, "Headline 1");
    }

    #[test]
    fn test_delete_cached_article() {
        let store = SqliteStore::in_memory().unwrap();
        let a = article(1);
        store.upsert_article(&a, Utc::now()).unwrap();

        let removed = store.delete_cached_article(&a.id).unwrap();
        assert_eq!(removed.map(|c| c.article.id), Some(a.id.clone()));
        assert!(!store.cached_article_exists(&a.id).unwrap());

        // Second delete is a no-op
        assert!(store.delete_cached_article(&a.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_cached_before_skips_bookmarked() {
        let store = SqliteStore::in_memory().unwrap();
        let old = Utc::now() - Duration::days(40);

        store.upsert_article(&article(1), old).unwrap();
        store.upsert_article(&article(2), old).unwrap();
        store.upsert_article(&article(3), Utc::now()).unwrap();
        store.set_bookmark_flag(&article(1).id, true, Utc::now()).unwrap();

        let cutoff = Utc::now() - Duration::days(30);
        let removed = store.delete_cached_before(cutoff, true).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].article.id, article(2).id);
        assert_eq!(store.count_cached().unwrap(), 2);
    }

    #[test]
    fn test_delete_cached_before_including_bookmarked() {
        let store = SqliteStore::in_memory().unwrap();
        let old = Utc::now() - Duration::days(40);

        store.upsert_article(&article(1), old).unwrap();
        store.set_bookmark_flag(&article(1).id, true, Utc::now()).unwrap();

        let cutoff = Utc::now() - Duration::days(30);
        let removed = store.delete_cached_before(cutoff, false).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(store.count_cached().unwrap(), 0);
    }

    #[test]
    fn test_unreadable_cached_at_is_evictable() {
        let store = SqliteStore::in_memory().unwrap();
        let a = article(1);
        store.upsert_article(&a, Utc::now()).unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE cached_articles SET cached_at = 'garbage' WHERE id = ?1",
                params![a.id],
            )
            .unwrap();

        let record = store.get_cached_article(&a.id).unwrap().unwrap();
        assert_eq!(record.cached_at, DateTime::<Utc>::UNIX_EPOCH);

        let cutoff = Utc::now() - Duration::days(30);
        let removed = store.delete_cached_before(cutoff, true).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(store.count_cached().unwrap(), 0);
    }

    #[test]
    fn test_clear_bookmark_flags() {
        let store = SqliteStore::in_memory().unwrap();
        for n in 1..=2 {
            store.upsert_article(&article(n), Utc::now()).unwrap();
            store.set_bookmark_flag(&article(n).id, true, Utc::now()).unwrap();
        }

        assert_eq!(store.clear_bookmark_flags().unwrap(), 2);
        assert!(store.get_flagged_articles().unwrap().is_empty());
    }

    #[test]
    fn test_insert_bookmark_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let record = BookmarkRecord::from_article(&article(1), Utc::now());

        assert!(store.insert_bookmark(&record).unwrap());
        assert!(!store.insert_bookmark(&record).unwrap());
        assert_eq!(store.count_bookmarks().unwrap(), 1);
        assert!(store.bookmark_exists(&record.id).unwrap());
    }

    #[test]
    fn test_delete_bookmark() {
        let store = SqliteStore::in_memory().unwrap();
        let record = BookmarkRecord::from_article(&article(1), Utc::now());
        store.insert_bookmark(&record).unwrap();

        assert!(store.delete_bookmark(&record.id).unwrap());
        assert!(!store.delete_bookmark(&record.id).unwrap());
        assert!(!store.bookmark_exists(&record.id).unwrap());
    }

    #[test]
    fn test_bookmarks_are_independent_of_cache() {
        let store = SqliteStore::in_memory().unwrap();
        let a = article(1);
        store.upsert_article(&a, Utc::now()).unwrap();
        store
            .insert_bookmark(&BookmarkRecord::from_article(&a, Utc::now()))
            .unwrap();

        store.delete_all_cached().unwrap();
        assert!(store.bookmark_exists(&a.id).unwrap());
        assert_eq!(store.bookmark_ids().unwrap().len(), 1);
    }

    #[test]
    fn test_get_bookmarks_order() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .insert_bookmark(&BookmarkRecord::from_article(&article(1), now - Duration::hours(1)))
            .unwrap();
        store
            .insert_bookmark(&BookmarkRecord::from_article(&article(2), now))
            .unwrap();

        let records = store.get_bookmarks().unwrap();
        assert_eq!(records[0].title, "Headline 2");
        assert_eq!(records[1].title, "Headline 1");

        assert_eq!(store.delete_all_bookmarks().unwrap(), 2);
        assert_eq!(store.count_bookmarks().unwrap(), 0);
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidings.db");
        let a = article(1);

        {
            let store = SqliteStore::new(&path).unwrap();
            store.upsert_article(&a, Utc::now()).unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert!(store.cached_article_exists(&a.id).unwrap());
    }

    #[test]
    fn test_get_cached_article_nonexistent() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_cached_article("nonexistent-id").unwrap().is_none());
    }
}
