//! Reconciles the remote feed with the offline cache and the bookmark list.
//!
//! A single [`SyncCoordinator`] task owns every write to the cache and the
//! bookmark index. Callers talk to it through a cloneable [`SyncHandle`] and
//! observe it through [`SyncEvent`]s.

mod coordinator;
mod handle;
mod working_set;

pub use coordinator::{spawn_coordinator, SyncCoordinator};
pub use handle::SyncHandle;
pub use working_set::{dedup_by_id, WorkingSet};

use crate::domain::Article;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Loading,
    Loaded { online: bool },
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Persistence,
}

/// Why a load did not produce fresh data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Number of cached articles served instead, or `None` when nothing could
    /// be served at all.
    pub served_from_cache: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StateChanged(SyncState),
    /// The effective (filtered or full) article collection.
    ArticlesUpdated(Vec<Article>),
    /// The complete bookmark list.
    BookmarksChanged(Vec<Article>),
    OfflineStatusChanged { offline: bool },
    LoadFailed(LoadFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Network,
    Cache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub source: DataSource,
    /// The full, unfiltered working set after the load.
    pub articles: Vec<Article>,
    /// Set when the network was tried and failed before falling back.
    pub network_error: Option<String>,
}
