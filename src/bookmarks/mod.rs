//! The explicit bookmark list and its change notifications.
//!
//! This is the authoritative answer to "is this article bookmarked?". The
//! cache keeps a derived flag that the sync coordinator refreshes from here.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::app::Result;
use crate::domain::{Article, BookmarkRecord};
use crate::store::Store;

const EVENT_CAPACITY: usize = 64;

/// Sent once per mutating call.
#[derive(Debug, Clone, PartialEq)]
pub enum BookmarkEvent {
    /// The complete bookmark list after the mutation, newest first.
    Updated(Vec<Article>),
    Failed(String),
}

pub struct BookmarkIndex {
    store: Arc<dyn Store + Send + Sync>,
    events: broadcast::Sender<BookmarkEvent>,
}

impl BookmarkIndex {
    pub fn new(store: Arc<dyn Store + Send + Sync>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { store, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookmarkEvent> {
        self.events.subscribe()
    }

    /// Bookmark `article`. Already-bookmarked articles keep their original timestamp.
    pub fn add(&self, article: &Article) -> Result<()> {
        let outcome = self.insert(article).map(|_| ());
        self.notify(outcome)
    }

    /// Remove the bookmark for `id`. Absent bookmarks are not an error.
    pub fn remove(&self, id: &str) -> Result<()> {
        let outcome = self.delete(id).map(|_| ());
        self.notify(outcome)
    }

    /// Flip membership and return whether the article is now bookmarked.
    pub fn toggle(&self, article: &Article) -> Result<bool> {
        let outcome = self.store.bookmark_exists(&article.id).and_then(|present| {
            if present {
                self.delete(&article.id).map(|_| false)
            } else {
                self.insert(article).map(|_| true)
            }
        });
        self.notify(outcome)
    }

    /// Force membership to `bookmarked`, notifying once.
    pub fn set(&self, article: &Article, bookmarked: bool) -> Result<()> {
        let outcome = if bookmarked {
            self.insert(article).map(|_| ())
        } else {
            self.delete(&article.id).map(|_| ())
        };
        self.notify(outcome)
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        self.store.bookmark_exists(id)
    }

    pub fn list_all(&self) -> Result<Vec<Article>> {
        let records = self.store.get_bookmarks()?;
        Ok(records.into_iter().map(BookmarkRecord::into_article).collect())
    }

    pub fn count(&self) -> Result<i64> {
        self.store.count_bookmarks()
    }

    pub fn ids(&self) -> Result<HashSet<String>> {
        self.store.bookmark_ids()
    }

    pub fn clear(&self) -> Result<()> {
        let outcome = self.store.delete_all_bookmarks().map(|n| {
            debug!("Cleared {} bookmarks", n);
        });
        self.notify(outcome)
    }

    fn insert(&self, article: &Article) -> Result<bool> {
        let record = BookmarkRecord::from_article(article, Utc::now());
        let inserted = self.store.insert_bookmark(&record)?;
        if inserted {
            debug!("Bookmark saved: {}", article.title);
        }
        Ok(inserted)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_bookmark(id)?;
        if deleted {
            debug!("Bookmark removed for article {}", id);
        }
        Ok(deleted)
    }

    fn notify<T>(&self, outcome: Result<T>) -> Result<T> {
        let event = match &outcome {
            Ok(_) => match self.list_all() {
                Ok(list) => BookmarkEvent::Updated(list),
                Err(e) => BookmarkEvent::Failed(e.to_string()),
            },
            Err(e) => {
                warn!("Bookmark update failed: {}", e);
                BookmarkEvent::Failed(e.to_string())
            }
        };

        // No subscribers is fine.
        let _ = self.events.send(event);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::store::testing::FlakyStore;
    use crate::store::SqliteStore;

    fn index() -> BookmarkIndex {
        BookmarkIndex::new(Arc::new(SqliteStore::in_memory().unwrap()))
    }

    fn article(n: u32) -> Article {
        Article::new(
            &format!("https://example.com/news/{}", n),
            &format!("Headline {}", n),
            Utc::now(),
        )
    }

    fn next_list(rx: &mut broadcast::Receiver<BookmarkEvent>) -> Vec<Article> {
        match rx.try_recv().unwrap() {
            BookmarkEvent::Updated(list) => list,
            BookmarkEvent::Failed(e) => panic!("unexpected failure event: {}", e),
        }
    }

    #[test]
    fn test_add_is_idempotent() {
        let index = index();
        let a = article(1);

        index.add(&a).unwrap();
        index.add(&a).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        assert!(index.contains(&a.id).unwrap());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let index = index();
        index.remove("never-bookmarked").unwrap();
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let index = index();
        let a = article(1);

        assert!(index.toggle(&a).unwrap());
        assert!(index.contains(&a.id).unwrap());
        assert!(!index.toggle(&a).unwrap());
        assert!(!index.contains(&a.id).unwrap());

        index.add(&a).unwrap();
        index.toggle(&a).unwrap();
        index.toggle(&a).unwrap();
        assert!(index.contains(&a.id).unwrap());
    }

    #[test]
    fn test_list_all_marks_bookmarked() {
        let index = index();
        index.add(&article(1)).unwrap();
        index.add(&article(2)).unwrap();

        let list = index.list_all().unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|a| a.is_bookmarked() && a.is_cached));
        assert_eq!(index.ids().unwrap().len(), 2);
    }

    #[test]
    fn test_each_mutation_notifies_once_with_full_list() {
        let index = index();
        let mut rx = index.subscribe();

        index.add(&article(1)).unwrap();
        assert_eq!(next_list(&mut rx).len(), 1);

        index.toggle(&article(2)).unwrap();
        assert_eq!(next_list(&mut rx).len(), 2);

        index.remove(&article(1).id).unwrap();
        let list = next_list(&mut rx);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "Headline 2");

        index.clear().unwrap();
        assert!(next_list(&mut rx).is_empty());

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_failure_notifies_with_error() {
        let store = Arc::new(FlakyStore::new());
        let index = BookmarkIndex::new(store.clone());
        let mut rx = index.subscribe();

        store.set_failing(true);
        assert!(index.toggle(&article(1)).is_err());

        match rx.try_recv().unwrap() {
            BookmarkEvent::Failed(message) => assert!(message.contains("disk I/O error")),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
