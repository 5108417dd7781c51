use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::{Result, TidingsError};
use crate::blob::ImagePrefetcher;
use crate::bookmarks::BookmarkIndex;
use crate::cache::ArticleCache;
use crate::connectivity::ConnectivityMonitor;
use crate::domain::Article;
use crate::feed::FeedClient;
use crate::sync::handle::{Command, Reply};
use crate::sync::{
    dedup_by_id, DataSource, FailureKind, LoadFailure, LoadOutcome, SyncEvent, SyncHandle,
    SyncState, WorkingSet,
};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

type FetchResult = Result<Vec<Article>>;

enum Next {
    Command(Command),
    Fetched(FetchResult),
    Connectivity(bool),
}

/// The single writer for the article cache and the bookmark index.
///
/// Network fetches and image downloads run on their own tasks; fetch results
/// come back through an internal channel and are applied here, so store
/// writes never race each other.
pub struct SyncCoordinator {
    cache: Arc<ArticleCache>,
    bookmarks: Arc<BookmarkIndex>,
    feed: Arc<dyn FeedClient + Send + Sync>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    prefetcher: Option<ImagePrefetcher>,
    events: broadcast::Sender<SyncEvent>,
    commands: mpsc::Receiver<Command>,
    fetched_tx: mpsc::Sender<FetchResult>,
    fetched_rx: mpsc::Receiver<FetchResult>,
    connectivity_rx: Option<watch::Receiver<bool>>,
    online: bool,
    state: SyncState,
    working: WorkingSet,
    fetch_in_flight: bool,
    waiters: Vec<Reply<Result<LoadOutcome>>>,
}

impl SyncCoordinator {
    pub fn new(
        cache: Arc<ArticleCache>,
        bookmarks: Arc<BookmarkIndex>,
        feed: Arc<dyn FeedClient + Send + Sync>,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> (Self, SyncHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (fetched_tx, fetched_rx) = mpsc::channel(1);
        let handle = SyncHandle::new(tx, events.clone());

        let coordinator = Self {
            online: connectivity.is_connected(),
            connectivity_rx: Some(connectivity.subscribe()),
            cache,
            bookmarks,
            feed,
            connectivity,
            prefetcher: None,
            events,
            commands,
            fetched_tx,
            fetched_rx,
            state: SyncState::Idle,
            working: WorkingSet::new(),
            fetch_in_flight: false,
            waiters: Vec::new(),
        };

        (coordinator, handle)
    }

    /// Download article images into the blob store after each fresh load.
    pub fn with_prefetcher(mut self, prefetcher: ImagePrefetcher) -> Self {
        self.prefetcher = Some(prefetcher);
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!(
            "Sync coordinator started ({})",
            if self.online { "online" } else { "offline" }
        );

        loop {
            let next = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => Next::Command(command),
                },
                Some(result) = self.fetched_rx.recv() => Next::Fetched(result),
                online = next_connectivity(&mut self.connectivity_rx) => Next::Connectivity(online),
            };

            match next {
                Next::Command(command) => self.handle(command),
                Next::Fetched(result) => self.finish_fetch(result),
                Next::Connectivity(online) => self.connectivity_changed(online),
            }
        }

        // Pending loads get an error instead of hanging.
        self.waiters.clear();
        info!("Sync coordinator stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Load { announce, reply } => self.begin_load(announce, reply),
            Command::ToggleBookmark { article, reply } => {
                let _ = reply.send(self.toggle_bookmark(article));
            }
            Command::ClearBookmarks { reply } => {
                let _ = reply.send(self.clear_bookmarks());
            }
            Command::Search { query, reply } => {
                let results = self.working.search(&query).to_vec();
                self.emit(SyncEvent::ArticlesUpdated(results.clone()));
                let _ = reply.send(results);
            }
            Command::Articles { reply } => {
                let _ = reply.send(self.working.effective().to_vec());
            }
            Command::Bookmarked { reply } => {
                let _ = reply.send(self.bookmarks.list_all());
            }
            Command::Cached { reply } => {
                let _ = reply.send(self.cache.get_all());
            }
            Command::State { reply } => {
                let _ = reply.send(self.state);
            }
            Command::Evict { days, reply } => {
                let _ = reply.send(self.evict(days));
            }
            Command::ClearCache { reply } => {
                let _ = reply.send(self.clear_cache());
            }
            Command::Shutdown => {}
        }
    }

    fn begin_load(&mut self, announce: bool, reply: oneshot::Sender<Result<LoadOutcome>>) {
        if announce {
            self.set_state(SyncState::Loading);
        }

        if !self.connectivity.is_connected() {
            debug!("Offline, serving cached articles");
            let _ = reply.send(self.serve_cached(None));
            return;
        }

        self.waiters.push(reply);
        if self.fetch_in_flight {
            debug!("Fetch already in flight, joining it");
            return;
        }

        self.fetch_in_flight = true;
        let feed = self.feed.clone();
        let done = self.fetched_tx.clone();
        tokio::spawn(async move {
            // The inner task turns a panicking client into an ordinary failure.
            let fetch = tokio::spawn(async move { feed.fetch_articles().await });
            let result = match fetch.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Feed task failed: {}", e);
                    Err(TidingsError::Network("feed task panicked".into()))
                }
            };
            let _ = done.send(result).await;
        });
    }

    fn finish_fetch(&mut self, result: FetchResult) {
        self.fetch_in_flight = false;
        let waiters = std::mem::take(&mut self.waiters);

        let outcome = match result {
            Ok(articles) => Ok(self.ingest(articles)),
            Err(e) => {
                warn!("Feed fetch failed, falling back to cache: {}", e);
                self.serve_cached(Some(e.to_string()))
            }
        };

        // Errors are not Clone; every waiter but the last gets a same-class copy.
        let mut waiters = waiters.into_iter();
        let last = waiters.next_back();
        for waiter in waiters {
            let reply = match &outcome {
                Ok(outcome) => Ok(outcome.clone()),
                Err(e) => Err(e.duplicate()),
            };
            let _ = waiter.send(reply);
        }
        if let Some(last) = last {
            let _ = last.send(outcome);
        }
    }

    /// Validate, deduplicate, merge bookmark state, persist and publish a
    /// fresh batch from the feed.
    fn ingest(&mut self, articles: Vec<Article>) -> LoadOutcome {
        let received = articles.len();
        let valid: Vec<Article> = articles
            .into_iter()
            .filter(|article| match article.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Rejected article {:?} ({}): {}", article.title, article.url, e);
                    false
                }
            })
            .collect();

        let mut articles = dedup_by_id(valid);
        let bookmarked = self.bookmarked_ids();
        for article in &mut articles {
            article.is_bookmarked = Some(bookmarked.contains(&article.id));
        }

        let report = self.cache.upsert(&articles);
        for article in &mut articles {
            article.is_cached = report.failed == 0
                || self.cache.is_cached(&article.id).unwrap_or(false);
        }
        info!(
            "Loaded {} articles from feed ({} received, {} cached)",
            articles.len(),
            received,
            report.persisted()
        );

        if let Some(prefetcher) = &self.prefetcher {
            prefetcher.prefetch(articles.iter().filter_map(|a| a.image_url.clone()));
        }

        if !self.working.query().is_empty() {
            debug!("Re-applying search {:?} to fresh articles", self.working.query());
        }
        self.working.replace(articles);
        self.set_state(SyncState::Loaded { online: true });
        self.emit(SyncEvent::ArticlesUpdated(self.working.effective().to_vec()));

        LoadOutcome {
            source: DataSource::Network,
            articles: self.working.all().to_vec(),
            network_error: None,
        }
    }

    fn serve_cached(&mut self, network_error: Option<String>) -> Result<LoadOutcome> {
        match self.cache.get_all() {
            Ok(mut articles) => {
                let bookmarked = self.bookmarked_ids();
                for article in &mut articles {
                    article.is_bookmarked = Some(bookmarked.contains(&article.id));
                }

                self.working.replace(articles);
                let served = self.working.all().len();
                self.set_state(SyncState::Loaded { online: false });
                self.emit(SyncEvent::ArticlesUpdated(self.working.effective().to_vec()));

                if let Some(message) = &network_error {
                    self.emit(SyncEvent::LoadFailed(LoadFailure {
                        kind: FailureKind::Network,
                        message: message.clone(),
                        served_from_cache: Some(served),
                    }));
                }

                Ok(LoadOutcome {
                    source: DataSource::Cache,
                    articles: self.working.all().to_vec(),
                    network_error,
                })
            }
            Err(e) => {
                error!("Failed to read cached articles: {}", e);
                if let Some(message) = network_error {
                    self.emit(SyncEvent::LoadFailed(LoadFailure {
                        kind: FailureKind::Network,
                        message,
                        served_from_cache: None,
                    }));
                }
                self.emit(SyncEvent::LoadFailed(LoadFailure {
                    kind: FailureKind::Persistence,
                    message: e.to_string(),
                    served_from_cache: None,
                }));
                self.set_state(SyncState::Failed);
                Err(e)
            }
        }
    }

    fn toggle_bookmark(&mut self, article: Article) -> Result<bool> {
        let currently = match self.working.find(&article.id) {
            Some(existing) => existing.is_bookmarked(),
            None => self.bookmarks.contains(&article.id)?,
        };
        let bookmarked = !currently;
        let article = self.working.find(&article.id).cloned().unwrap_or(article);

        // The index is authoritative; the cache flag follows it.
        self.bookmarks.set(&article, bookmarked)?;
        if let Err(e) = self.cache.set_bookmark_flag(&article.id, bookmarked) {
            warn!("Failed to update cached bookmark flag for {}: {}", article.id, e);
        }

        self.working.set_bookmarked(&article.id, bookmarked);
        self.emit(SyncEvent::ArticlesUpdated(self.working.effective().to_vec()));
        self.publish_bookmarks();

        Ok(bookmarked)
    }

    fn clear_bookmarks(&mut self) -> Result<()> {
        self.bookmarks.clear()?;
        if let Err(e) = self.cache.clear_bookmark_flags() {
            warn!("Failed to clear cached bookmark flags: {}", e);
        }

        self.working.sync_bookmarks(&HashSet::new());
        self.emit(SyncEvent::ArticlesUpdated(self.working.effective().to_vec()));
        self.emit(SyncEvent::BookmarksChanged(Vec::new()));
        Ok(())
    }

    fn evict(&mut self, days: i64) -> Result<usize> {
        let evicted = self.cache.evict_ids_older_than(days, true)?;
        let ids: HashSet<String> = evicted.into_iter().collect();

        if self.working.uncache(&ids) > 0 {
            self.emit(SyncEvent::ArticlesUpdated(self.working.effective().to_vec()));
        }
        Ok(ids.len())
    }

    fn clear_cache(&mut self) -> Result<usize> {
        let cleared = self.cache.clear()?;
        self.working.set_cached(false);
        self.emit(SyncEvent::ArticlesUpdated(self.working.effective().to_vec()));
        Ok(cleared)
    }

    fn connectivity_changed(&mut self, online: bool) {
        if online == self.online {
            return;
        }
        self.online = online;
        info!("Now {}", if online { "online" } else { "offline" });
        self.emit(SyncEvent::OfflineStatusChanged { offline: !online });
    }

    fn bookmarked_ids(&self) -> HashSet<String> {
        match self.bookmarks.ids() {
            Ok(ids) => ids,
            Err(e) => {
                // Fall back to the cache's own flags rather than clearing them.
                warn!("Failed to read bookmark ids, using cached flags: {}", e);
                self.cache
                    .get_bookmarked()
                    .map(|articles| articles.into_iter().map(|a| a.id).collect())
                    .unwrap_or_default()
            }
        }
    }

    fn publish_bookmarks(&self) {
        match self.bookmarks.list_all() {
            Ok(list) => self.emit(SyncEvent::BookmarksChanged(list)),
            Err(e) => warn!("Failed to list bookmarks: {}", e),
        }
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            debug!("Sync state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.emit(SyncEvent::StateChanged(state));
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Resolves on the next connectivity transition; never resolves once the
/// monitor has gone away.
async fn next_connectivity(rx: &mut Option<watch::Receiver<bool>>) -> bool {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    if receiver.changed().await.is_ok() {
        return *receiver.borrow_and_update();
    }
    *rx = None;
    std::future::pending().await
}

/// Build a coordinator, start it on the runtime and return its handle.
pub fn spawn_coordinator(
    cache: Arc<ArticleCache>,
    bookmarks: Arc<BookmarkIndex>,
    feed: Arc<dyn FeedClient + Send + Sync>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    prefetcher: Option<ImagePrefetcher>,
) -> SyncHandle {
    let (mut coordinator, handle) = SyncCoordinator::new(cache, bookmarks, feed, connectivity);
    if let Some(prefetcher) = prefetcher {
        coordinator = coordinator.with_prefetcher(prefetcher);
    }
    coordinator.spawn();
    handle
}
