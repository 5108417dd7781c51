//! # Tidings
//!
//! An offline-aware news reader: fetches headlines when the network is up,
//! serves them from a local cache when it is not, and keeps bookmarks that
//! outlive cache eviction.
//!
//! ## Architecture
//!
//! ```text
//! FeedClient → SyncCoordinator → ArticleCache / BookmarkIndex → SyncEvent
//!                     ↑                  ↓
//!              ConnectivityGate     BlobStore (images)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Fetch headlines (or fall back to the cache)
//! tidings load
//!
//! # Read from the cache only
//! tidings --offline list
//!
//! # Bookmark by id prefix
//! tidings bookmark 3fa9c2e1
//!
//! # Drop unbookmarked articles older than a week
//! tidings evict --days 7
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// store, caches, feed client, connectivity.
pub mod app;

/// Content-addressed file storage for article images.
///
/// - [`BlobStore`](blob::BlobStore): SHA-256 keyed files, first write wins
/// - [`ImagePrefetcher`](blob::ImagePrefetcher): bounded background downloads
pub mod blob;

/// The authoritative bookmark list, with change notifications.
pub mod bookmarks;

/// The offline article cache: upsert, queries, age-based eviction.
pub mod cache;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/tidings/config.toml`.
pub mod config;

/// Connectivity state for the sync layer.
///
/// - [`ConnectivityMonitor`](connectivity::ConnectivityMonitor): observation trait
/// - [`ConnectivityGate`](connectivity::ConnectivityGate): host-driven implementation
/// - [`spawn_probe`](connectivity::spawn_probe): periodic TCP reachability probe
pub mod connectivity;

/// Core domain models.
///
/// - [`Article`](domain::Article): a news article with a URL-derived SHA256 id
/// - [`CachedArticle`](domain::CachedArticle): an article plus cache bookkeeping
/// - [`BookmarkRecord`](domain::BookmarkRecord): a bookmarked article snapshot
pub mod domain;

/// Remote article feed: [`FeedClient`](feed::FeedClient) and the NewsAPI client.
pub mod feed;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for raw byte fetches
/// - [`HttpFetcher`](fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// The sync coordinator task and its handle.
pub mod sync;
