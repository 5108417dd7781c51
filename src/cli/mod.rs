pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tidings")]
#[command(about = "An offline-aware news reader", long_about = None)]
pub struct Cli {
    /// Never touch the network; serve everything from the local cache
    #[arg(long, global = true)]
    pub offline: bool,

    /// Path to the cache database (default: <data dir>/tidings.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load articles, announcing progress, from the feed or the cache
    Load,
    /// Reload articles quietly
    Refresh,
    /// List cached articles
    List {
        /// Only articles flagged as bookmarked in the cache
        #[arg(long)]
        bookmarked: bool,
    },
    /// Search loaded articles by title or author
    Search {
        /// Case-insensitive text; empty shows everything
        query: String,
    },
    /// Toggle the bookmark on an article
    Bookmark {
        /// Article id as shown by `list`
        id: String,
    },
    /// List bookmarks, newest first
    Bookmarks,
    /// Evict unbookmarked articles cached more than N days ago
    Evict {
        /// Age limit in days (default: from config)
        #[arg(short, long)]
        days: Option<i64>,
    },
    /// Show cache statistics
    Stats,
    /// Clear the article cache, or the bookmarks with --bookmarks
    Clear {
        #[arg(long)]
        bookmarks: bool,
    },
}
