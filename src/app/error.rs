use thiserror::Error;

use crate::domain::ValidationError;

#[derive(Error, Debug)]
pub enum TidingsError {
    #[error("Invalid article: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Feed decode error: {0}")]
    FeedDecode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    #[error("Sync coordinator is not running")]
    CoordinatorClosed,

    #[error("{0}")]
    Other(String),
}

impl TidingsError {
    /// True for failures of the remote side: transport, status or payload.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            TidingsError::Http(_) | TidingsError::Network(_) | TidingsError::FeedDecode(_)
        )
    }

    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            TidingsError::Database(_) | TidingsError::Migration(_) | TidingsError::Persistence(_)
        )
    }

    /// A copy with the same classification, for handing one failure to
    /// several callers.
    pub fn duplicate(&self) -> TidingsError {
        match self {
            TidingsError::Network(m) => TidingsError::Network(m.clone()),
            TidingsError::Persistence(m) => TidingsError::Persistence(m.clone()),
            TidingsError::Other(m) => TidingsError::Other(m.clone()),
            e if e.is_network() => TidingsError::Network(e.to_string()),
            e if e.is_persistence() => TidingsError::Persistence(e.to_string()),
            e => TidingsError::Other(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TidingsError>;
