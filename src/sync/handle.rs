use tokio::sync::{broadcast, mpsc, oneshot};

use crate::app::{Result, TidingsError};
use crate::domain::Article;
use crate::sync::{LoadOutcome, SyncEvent, SyncState};

pub(super) type Reply<T> = oneshot::Sender<T>;

/// Requests processed by the coordinator task, in arrival order.
#[derive(Debug)]
pub(super) enum Command {
    Load {
        announce: bool,
        reply: Reply<Result<LoadOutcome>>,
    },
    ToggleBookmark {
        article: Article,
        reply: Reply<Result<bool>>,
    },
    ClearBookmarks {
        reply: Reply<Result<()>>,
    },
    Search {
        query: String,
        reply: Reply<Vec<Article>>,
    },
    Articles {
        reply: Reply<Vec<Article>>,
    },
    Bookmarked {
        reply: Reply<Result<Vec<Article>>>,
    },
    Cached {
        reply: Reply<Result<Vec<Article>>>,
    },
    State {
        reply: Reply<SyncState>,
    },
    Evict {
        days: i64,
        reply: Reply<Result<usize>>,
    },
    ClearCache {
        reply: Reply<Result<usize>>,
    },
    Shutdown,
}

/// Cloneable front door to a running [`SyncCoordinator`](super::SyncCoordinator).
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncHandle {
    pub(super) fn new(tx: mpsc::Sender<Command>, events: broadcast::Sender<SyncEvent>) -> Self {
        Self { tx, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Announce `Loading`, then serve fresh data when online or cached data
    /// when offline. Overlapping calls share one network fetch.
    pub async fn load_articles(&self) -> Result<LoadOutcome> {
        self.request(|reply| Command::Load {
            announce: true,
            reply,
        })
        .await?
    }

    /// Like [`load_articles`](Self::load_articles) without the `Loading` announcement.
    pub async fn refresh_articles(&self) -> Result<LoadOutcome> {
        self.request(|reply| Command::Load {
            announce: false,
            reply,
        })
        .await?
    }

    /// Flip the bookmark for `article` and return the new state.
    pub async fn toggle_bookmark(&self, article: Article) -> Result<bool> {
        self.request(|reply| Command::ToggleBookmark { article, reply })
            .await?
    }

    pub async fn clear_bookmarks(&self) -> Result<()> {
        self.request(|reply| Command::ClearBookmarks { reply }).await?
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Article>> {
        let query = query.to_string();
        self.request(|reply| Command::Search { query, reply }).await
    }

    /// The effective article collection.
    pub async fn articles(&self) -> Result<Vec<Article>> {
        self.request(|reply| Command::Articles { reply }).await
    }

    pub async fn bookmarked(&self) -> Result<Vec<Article>> {
        self.request(|reply| Command::Bookmarked { reply }).await?
    }

    pub async fn cached(&self) -> Result<Vec<Article>> {
        self.request(|reply| Command::Cached { reply }).await?
    }

    pub async fn state(&self) -> Result<SyncState> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Evict unbookmarked articles cached more than `days` ago.
    pub async fn evict_older_than(&self, days: i64) -> Result<usize> {
        self.request(|reply| Command::Evict { days, reply }).await?
    }

    pub async fn clear_cache(&self) -> Result<usize> {
        self.request(|reply| Command::ClearCache { reply }).await?
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| TidingsError::CoordinatorClosed)?;
        rx.await.map_err(|_| TidingsError::CoordinatorClosed)
    }
}
